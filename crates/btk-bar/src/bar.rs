//! Canonical OHLVC bar and bar series.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::micros::Micros;

/// Supported bar intervals.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    M1,
    M5,
    M15,
    M30,
    M60,
}

impl Interval {
    pub fn minutes(self) -> i64 {
        match self {
            Interval::M1 => 1,
            Interval::M5 => 5,
            Interval::M15 => 15,
            Interval::M30 => 30,
            Interval::M60 => 60,
        }
    }

    pub fn seconds(self) -> i64 {
        self.minutes() * 60
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Interval::M1 => "1m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::M60 => "60m",
        }
    }

    pub fn parse(s: &str) -> Option<Interval> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1m" | "1min" => Some(Interval::M1),
            "5m" | "5min" => Some(Interval::M5),
            "15m" | "15min" => Some(Interval::M15),
            "30m" | "30min" => Some(Interval::M30),
            "60m" | "60min" | "1h" => Some(Interval::M60),
            _ => None,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One interval's market activity. Immutable once constructed — `Bar::new`
/// is the only constructor and it enforces the OHLC invariant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub interval: Interval,
    /// Bar end timestamp, epoch seconds UTC, interval-aligned.
    pub timestamp: i64,
    pub open: Micros,
    pub high: Micros,
    pub low: Micros,
    pub close: Micros,
    pub volume: i64,
    /// `true` for bars synthesized by gap-filling rather than observed.
    pub synthetic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarValidationError {
    NonPositivePrice { field: &'static str, value: i64 },
    LowAboveHigh { low: i64, high: i64 },
    OpenOutsideRange { open: i64, low: i64, high: i64 },
    CloseOutsideRange { close: i64, low: i64, high: i64 },
    NegativeVolume(i64),
}

impl fmt::Display for BarValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BarValidationError::NonPositivePrice { field, value } => {
                write!(f, "{field} must be > 0, got {value}")
            }
            BarValidationError::LowAboveHigh { low, high } => {
                write!(f, "low ({low}) must be <= high ({high})")
            }
            BarValidationError::OpenOutsideRange { open, low, high } => {
                write!(f, "open ({open}) must be within [{low}, {high}]")
            }
            BarValidationError::CloseOutsideRange { close, low, high } => {
                write!(f, "close ({close}) must be within [{low}, {high}]")
            }
            BarValidationError::NegativeVolume(v) => write!(f, "volume must be >= 0, got {v}"),
        }
    }
}

impl std::error::Error for BarValidationError {}

impl Bar {
    /// Construct a bar, enforcing the OHLC invariant of the data model:
    /// `low <= min(open, close) <= max(open, close) <= high`, all prices
    /// positive, volume non-negative.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        interval: Interval,
        timestamp: i64,
        open: Micros,
        high: Micros,
        low: Micros,
        close: Micros,
        volume: i64,
    ) -> Result<Bar, BarValidationError> {
        validate_ohlcv(open, high, low, close, volume)?;
        Ok(Bar {
            symbol: symbol.into(),
            interval,
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            synthetic: false,
        })
    }

    /// Construct a synthetic gap-fill bar: flat at `prev_close`, zero volume.
    /// Always valid by construction (a degenerate flat bar trivially
    /// satisfies the OHLC invariant).
    pub fn synthetic_fill(
        symbol: impl Into<String>,
        interval: Interval,
        timestamp: i64,
        prev_close: Micros,
    ) -> Bar {
        Bar {
            symbol: symbol.into(),
            interval,
            timestamp,
            open: prev_close,
            high: prev_close,
            low: prev_close,
            close: prev_close,
            volume: 0,
            synthetic: true,
        }
    }

    pub fn typical_price(&self) -> Micros {
        Micros::new((self.high.raw() + self.low.raw() + self.close.raw()) / 3)
    }
}

pub fn validate_ohlcv(
    open: Micros,
    high: Micros,
    low: Micros,
    close: Micros,
    volume: i64,
) -> Result<(), BarValidationError> {
    for (field, v) in [("open", open), ("high", high), ("low", low), ("close", close)] {
        if !v.is_positive() {
            return Err(BarValidationError::NonPositivePrice { field, value: v.raw() });
        }
    }
    if low > high {
        return Err(BarValidationError::LowAboveHigh { low: low.raw(), high: high.raw() });
    }
    if open < low || open > high {
        return Err(BarValidationError::OpenOutsideRange {
            open: open.raw(),
            low: low.raw(),
            high: high.raw(),
        });
    }
    if close < low || close > high {
        return Err(BarValidationError::CloseOutsideRange {
            close: close.raw(),
            low: low.raw(),
            high: high.raw(),
        });
    }
    if volume < 0 {
        return Err(BarValidationError::NegativeVolume(volume));
    }
    Ok(())
}

/// An ordered, deduplicated sequence of bars for one `(symbol, interval)`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarSeries {
    bars: Vec<Bar>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeriesError {
    NonAscendingTimestamp { prev: i64, next: i64 },
    DuplicateTimestamp(i64),
}

impl fmt::Display for SeriesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeriesError::NonAscendingTimestamp { prev, next } => {
                write!(f, "timestamps not strictly ascending: {prev} then {next}")
            }
            SeriesError::DuplicateTimestamp(ts) => write!(f, "duplicate timestamp: {ts}"),
        }
    }
}

impl std::error::Error for SeriesError {}

impl BarSeries {
    pub fn empty() -> Self {
        BarSeries { bars: Vec::new() }
    }

    /// Build a series from already-sorted, deduplicated bars, verifying the
    /// strict-ascending-timestamp invariant.
    pub fn from_sorted(bars: Vec<Bar>) -> Result<BarSeries, SeriesError> {
        for w in bars.windows(2) {
            if w[0].timestamp == w[1].timestamp {
                return Err(SeriesError::DuplicateTimestamp(w[0].timestamp));
            }
            if w[0].timestamp > w[1].timestamp {
                return Err(SeriesError::NonAscendingTimestamp {
                    prev: w[0].timestamp,
                    next: w[1].timestamp,
                });
            }
        }
        Ok(BarSeries { bars })
    }

    /// Sort + dedup (last-write-wins on timestamp collision) then build.
    /// Used by the cache store, where "last write wins" is the documented
    /// tie-break for re-fetched bars.
    pub fn from_unsorted_dedup(mut bars: Vec<Bar>) -> BarSeries {
        bars.sort_by_key(|b| b.timestamp);
        let mut out: Vec<Bar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match out.last_mut() {
                Some(last) if last.timestamp == bar.timestamp => *last = bar,
                _ => out.push(bar),
            }
        }
        BarSeries { bars: out }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn into_vec(self) -> Vec<Bar> {
        self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first(&self) -> Option<&Bar> {
        self.bars.first()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// Bars within `[start, end]` inclusive, ascending.
    pub fn slice_range(&self, start: i64, end: i64) -> BarSeries {
        let filtered: Vec<Bar> = self
            .bars
            .iter()
            .filter(|b| b.timestamp >= start && b.timestamp <= end)
            .cloned()
            .collect();
        BarSeries { bars: filtered }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(v: i64) -> Micros {
        Micros::new(v * Micros::SCALE)
    }

    #[test]
    fn bar_new_rejects_low_above_high() {
        let err = Bar::new("AAPL", Interval::M5, 0, m(100), m(99), m(101), m(100), 10).unwrap_err();
        assert!(matches!(err, BarValidationError::LowAboveHigh { .. }));
    }

    #[test]
    fn bar_new_rejects_open_outside_range() {
        let err = Bar::new("AAPL", Interval::M5, 0, m(105), m(102), m(99), m(100), 10).unwrap_err();
        assert!(matches!(err, BarValidationError::OpenOutsideRange { .. }));
    }

    #[test]
    fn bar_new_accepts_valid_bar() {
        let b = Bar::new("AAPL", Interval::M5, 0, m(100), m(102), m(99), m(101), 10).unwrap();
        assert_eq!(b.close, m(101));
        assert!(!b.synthetic);
    }

    #[test]
    fn synthetic_fill_is_flat_and_zero_volume() {
        let b = Bar::synthetic_fill("AAPL", Interval::M5, 100, m(50));
        assert_eq!(b.open, m(50));
        assert_eq!(b.high, m(50));
        assert_eq!(b.low, m(50));
        assert_eq!(b.close, m(50));
        assert_eq!(b.volume, 0);
        assert!(b.synthetic);
    }

    #[test]
    fn series_from_sorted_rejects_duplicates() {
        let b1 = Bar::new("X", Interval::M1, 10, m(1), m(1), m(1), m(1), 0).unwrap();
        let b2 = Bar::new("X", Interval::M1, 10, m(1), m(1), m(1), m(1), 0).unwrap();
        let err = BarSeries::from_sorted(vec![b1, b2]).unwrap_err();
        assert!(matches!(err, SeriesError::DuplicateTimestamp(10)));
    }

    #[test]
    fn from_unsorted_dedup_keeps_last_write() {
        let early = Bar::new("X", Interval::M1, 10, m(1), m(1), m(1), m(1), 5).unwrap();
        let later_same_ts = Bar::new("X", Interval::M1, 10, m(2), m(2), m(2), m(2), 9).unwrap();
        let series = BarSeries::from_unsorted_dedup(vec![early, later_same_ts]);
        assert_eq!(series.len(), 1);
        assert_eq!(series.bars()[0].volume, 9);
    }

    #[test]
    fn slice_range_is_inclusive() {
        let bars = vec![
            Bar::new("X", Interval::M1, 0, m(1), m(1), m(1), m(1), 0).unwrap(),
            Bar::new("X", Interval::M1, 60, m(1), m(1), m(1), m(1), 0).unwrap(),
            Bar::new("X", Interval::M1, 120, m(1), m(1), m(1), m(1), 0).unwrap(),
        ];
        let series = BarSeries::from_sorted(bars).unwrap();
        let sliced = series.slice_range(0, 60);
        assert_eq!(sliced.len(), 2);
    }
}
