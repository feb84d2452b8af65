//! Pure date-time helpers: session open/close, weekend skip, extended-hours
//! classification, and gap-aware missing-bar counting.
//!
//! Deterministic, pure logic. No IO, no wall-clock, no randomness — every
//! predicate here is a function of its inputs alone, the same discipline
//! the source organization's trading-session calendar module uses.

use serde::{Deserialize, Serialize};

/// Minutes-since-midnight-UTC-offset session boundaries plus a fixed UTC
/// offset standing in for a timezone. A real IANA timezone (DST-aware)
/// is a documented simplification left for a future patch — see
/// `MarketHours::fixed_offset_minutes` doc comment.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketHours {
    pub pre_market_start_secs: i64,
    pub market_open_secs: i64,
    pub market_close_secs: i64,
    pub after_hours_end_secs: i64,
    /// Fixed offset from UTC, in seconds (e.g. `-5 * 3600` for US/Eastern
    /// standard time). DST transitions are not modeled; this mirrors the
    /// source calendar module's existing fixed-offset approximation.
    pub utc_offset_secs: i64,
}

impl MarketHours {
    /// NYSE-style regular session: 09:30–16:00, pre-market from 04:00,
    /// after-hours until 20:00, US/Eastern standard time (UTC-5).
    pub fn nyse_default() -> MarketHours {
        MarketHours {
            pre_market_start_secs: 4 * 3600,
            market_open_secs: 9 * 3600 + 30 * 60,
            market_close_secs: 16 * 3600,
            after_hours_end_secs: 20 * 3600,
            utc_offset_secs: -5 * 3600,
        }
    }

    /// 24/7 session (crypto-style): every timestamp is market hours, no
    /// extended-hours distinction, offset is irrelevant.
    pub fn always_on() -> MarketHours {
        MarketHours {
            pre_market_start_secs: 0,
            market_open_secs: 0,
            market_close_secs: 24 * 3600,
            after_hours_end_secs: 24 * 3600,
            utc_offset_secs: 0,
        }
    }

    fn local_time_of_day(&self, ts: i64) -> i64 {
        (ts + self.utc_offset_secs).rem_euclid(86_400)
    }

    fn local_epoch_day(&self, ts: i64) -> i64 {
        (ts + self.utc_offset_secs).div_euclid(86_400)
    }

    fn is_weekday(&self, ts: i64) -> bool {
        // Epoch day 0 (1970-01-01 UTC) was a Thursday.
        let dow = self.local_epoch_day(ts).rem_euclid(7);
        dow != 2 && dow != 3 // not Saturday, not Sunday
    }

    /// `true` if `ts` falls within the regular trading session on a
    /// trading day (not a holiday from `holidays`, not a weekend).
    pub fn is_market_hours(&self, ts: i64, holidays: &HolidayCalendar) -> bool {
        if *self == MarketHours::always_on() {
            return true;
        }
        if !self.is_weekday(ts) {
            return false;
        }
        let (y, m, d) = epoch_secs_to_ymd(ts + self.utc_offset_secs);
        if holidays.is_holiday(y, m, d) {
            return false;
        }
        let tod = self.local_time_of_day(ts);
        tod > self.market_open_secs && tod <= self.market_close_secs
    }

    /// `true` if `ts` falls in pre-market or after-hours (and not in the
    /// regular session, and not outside the extended window entirely).
    pub fn is_extended_hours(&self, ts: i64, holidays: &HolidayCalendar) -> bool {
        if !self.is_weekday(ts) {
            return false;
        }
        let (y, m, d) = epoch_secs_to_ymd(ts + self.utc_offset_secs);
        if holidays.is_holiday(y, m, d) {
            return false;
        }
        let tod = self.local_time_of_day(ts);
        let pre = tod >= self.pre_market_start_secs && tod <= self.market_open_secs;
        let post = tod > self.market_close_secs && tod <= self.after_hours_end_secs;
        pre || post
    }

    /// Minutes remaining in the regular session from `ts`, or `None` if
    /// `ts` is not currently in market hours.
    pub fn minutes_to_close(&self, ts: i64, holidays: &HolidayCalendar) -> Option<i64> {
        if !self.is_market_hours(ts, holidays) {
            return None;
        }
        let tod = self.local_time_of_day(ts);
        Some((self.market_close_secs - tod) / 60)
    }

    /// Next session-open timestamp strictly after `ts`, skipping weekends
    /// and holidays.
    pub fn next_market_open(&self, ts: i64, holidays: &HolidayCalendar) -> i64 {
        // day_start is the UTC instant of local midnight for ts's local day;
        // adding market_open_secs (a local offset-into-day) yields the UTC
        // instant of that day's local market open.
        let mut day_start = self.local_epoch_day(ts) * 86_400 - self.utc_offset_secs;
        loop {
            let candidate_utc = day_start + self.market_open_secs;
            if candidate_utc > ts && self.is_weekday(candidate_utc) {
                let (y, m, d) = epoch_secs_to_ymd(candidate_utc + self.utc_offset_secs);
                if !holidays.is_holiday(y, m, d) {
                    return candidate_utc;
                }
            }
            day_start += 86_400;
        }
    }

    /// Next session-close timestamp strictly after `ts`.
    pub fn next_market_close(&self, ts: i64, holidays: &HolidayCalendar) -> i64 {
        let mut day_start = self.local_epoch_day(ts) * 86_400 - self.utc_offset_secs;
        loop {
            let candidate_utc = day_start + self.market_close_secs;
            if candidate_utc > ts && self.is_weekday(candidate_utc) {
                let (y, m, d) = epoch_secs_to_ymd(candidate_utc + self.utc_offset_secs);
                if !holidays.is_holiday(y, m, d) {
                    return candidate_utc;
                }
            }
            day_start += 86_400;
        }
    }
}

/// A calendar of holiday dates, consulted by `MarketHours`. Defaults to a
/// hardcoded US-market holiday table; callers may supply their own.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolidayCalendar {
    dates: Vec<(i64, i64, i64)>,
}

impl HolidayCalendar {
    pub fn empty() -> HolidayCalendar {
        HolidayCalendar { dates: Vec::new() }
    }

    pub fn us_market_default() -> HolidayCalendar {
        const HOLIDAYS: &[(i64, i64, i64)] = &[
            (2023, 1, 2), (2023, 1, 16), (2023, 2, 20), (2023, 4, 7), (2023, 5, 29),
            (2023, 6, 19), (2023, 7, 4), (2023, 9, 4), (2023, 11, 23), (2023, 12, 25),
            (2024, 1, 1), (2024, 1, 15), (2024, 2, 19), (2024, 3, 29), (2024, 5, 27),
            (2024, 6, 19), (2024, 7, 4), (2024, 9, 2), (2024, 11, 28), (2024, 12, 25),
            (2025, 1, 1), (2025, 1, 20), (2025, 2, 17), (2025, 4, 18), (2025, 5, 26),
            (2025, 6, 19), (2025, 7, 4), (2025, 9, 1), (2025, 11, 27), (2025, 12, 25),
            (2026, 1, 1), (2026, 1, 19), (2026, 2, 16), (2026, 4, 3), (2026, 5, 25),
            (2026, 6, 19), (2026, 7, 3), (2026, 9, 7), (2026, 11, 26), (2026, 12, 25),
            (2027, 1, 1), (2027, 1, 18), (2027, 2, 15), (2027, 3, 26), (2027, 5, 31),
            (2027, 6, 18), (2027, 7, 5), (2027, 9, 6), (2027, 11, 25), (2027, 12, 24),
        ];
        HolidayCalendar { dates: HOLIDAYS.to_vec() }
    }

    pub fn is_holiday(&self, year: i64, month: i64, day: i64) -> bool {
        self.dates.contains(&(year, month, day))
    }
}

/// Counts bar-sized slots in the open interval `(prev_end_ts, next_end_ts)`
/// that fall within market hours — i.e. bars that should have arrived but
/// didn't. Used by the Data Manager's gap-fill step.
pub fn missing_bars_between(
    market_hours: &MarketHours,
    holidays: &HolidayCalendar,
    prev_end_ts: i64,
    next_end_ts: i64,
    interval_secs: i64,
) -> u32 {
    debug_assert!(interval_secs > 0);
    let mut count = 0u32;
    let mut ts = prev_end_ts + interval_secs;
    while ts < next_end_ts {
        if market_hours.is_market_hours(ts, holidays) {
            count += 1;
        }
        ts += interval_secs;
    }
    count
}

/// Convert epoch seconds to (year, month, day) using Howard Hinnant's civil
/// calendar algorithm — pure integer arithmetic, no external date library.
pub fn epoch_secs_to_ymd(epoch_secs: i64) -> (i64, i64, i64) {
    let days = epoch_secs.div_euclid(86_400);
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    let d = doy - (153 * mp + 2) / 5 + 1;
    (y, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monday_mid_session_is_trading() {
        let ts = 1_704_726_000_i64; // 2024-01-08 Mon 10:00 ET
        assert!(MarketHours::nyse_default().is_market_hours(ts, &HolidayCalendar::us_market_default()));
    }

    #[test]
    fn saturday_is_not_trading() {
        let ts = 1_704_510_000_i64;
        assert!(!MarketHours::nyse_default().is_market_hours(ts, &HolidayCalendar::us_market_default()));
    }

    #[test]
    fn new_years_day_2024_is_holiday() {
        let ts = 1_704_114_000_i64;
        assert!(!MarketHours::nyse_default().is_market_hours(ts, &HolidayCalendar::us_market_default()));
    }

    #[test]
    fn always_on_includes_weekend() {
        let saturday = 1_704_510_000_i64;
        assert!(MarketHours::always_on().is_market_hours(saturday, &HolidayCalendar::empty()));
    }

    #[test]
    fn missing_bars_between_skips_overnight_gap() {
        let mh = MarketHours::nyse_default();
        let hols = HolidayCalendar::us_market_default();
        // 2024-01-08 16:00 ET close to 2024-01-09 09:35 ET (first bar next day)
        let close = 1_704_751_200_i64; // 2024-01-08 16:00 ET
        let next_open_bar = 1_704_810_300_i64; // 2024-01-09 09:35 ET
        let missing = missing_bars_between(&mh, &hols, close, next_open_bar, 300);
        assert_eq!(missing, 0, "overnight gap has no missing intraday bars");
    }

    #[test]
    fn minutes_to_close_counts_down() {
        let mh = MarketHours::nyse_default();
        let hols = HolidayCalendar::us_market_default();
        let ts = 1_704_726_000_i64; // 10:00 ET, close at 16:00 ET => 360 min
        assert_eq!(mh.minutes_to_close(ts, &hols), Some(360));
    }
}
