//! `YYYY-MM` parsing shared by the `run` and `data fetch` commands.

use anyhow::{Context, Result};
use btk_fetcher::YearMonth;
use chrono::NaiveDate;

/// Parses `YYYY-MM` into a [`YearMonth`].
pub fn parse_year_month(s: &str) -> Result<YearMonth> {
    let (y, m) = s.split_once('-').with_context(|| format!("expected YYYY-MM, got '{s}'"))?;
    let year: i32 = y.parse().with_context(|| format!("invalid year in '{s}'"))?;
    let month: u32 = m.parse().with_context(|| format!("invalid month in '{s}'"))?;
    if !(1..=12).contains(&month) {
        anyhow::bail!("month out of range in '{s}'");
    }
    Ok(YearMonth::new(year, month))
}

/// Epoch seconds (UTC midnight) for the first day of `YYYY-MM`.
pub fn month_start_epoch(s: &str) -> Result<i64> {
    let ym = parse_year_month(s)?;
    let date = NaiveDate::from_ymd_opt(ym.year, ym.month, 1).with_context(|| format!("invalid calendar month '{s}'"))?;
    Ok(date.and_hms_opt(0, 0, 0).expect("midnight is always valid").and_utc().timestamp())
}

/// Epoch seconds (UTC, last second) of the last day of `YYYY-MM`.
pub fn month_end_epoch(s: &str) -> Result<i64> {
    let ym = parse_year_month(s)?;
    let next = ym.next();
    let next_start = NaiveDate::from_ymd_opt(next.year, next.month, 1).with_context(|| format!("invalid calendar month '{s}'"))?;
    Ok(next_start.and_hms_opt(0, 0, 0).expect("midnight is always valid").and_utc().timestamp() - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_year_and_month() {
        let ym = parse_year_month("2024-03").unwrap();
        assert_eq!(ym.year, 2024);
        assert_eq!(ym.month, 3);
    }

    #[test]
    fn december_end_epoch_is_before_next_january_start() {
        let dec_end = month_end_epoch("2023-12").unwrap();
        let jan_start = month_start_epoch("2024-01").unwrap();
        assert_eq!(dec_end + 1, jan_start);
    }
}
