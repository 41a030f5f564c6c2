//! Whole-file queries over the daily logs: history replay and the point query.

use super::paths::{log_file_for_ticker_and_date, log_files_for_date, parse_date};
use super::reader::read_log_file;
use crate::analysis::{aggregate_premiums, period_ms};
use crate::models::{PeriodSummary, Tick};
use anyhow::Result;
use chrono::{NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;
use rayon::prelude::*;
use std::path::Path;
use tracing::warn;

/// Rejected client input for a query. Never a storage failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    InvalidDate(String),
    InvalidTime(String),
    InvalidPeriod(u32),
    NonexistentLocalTime(String),
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::InvalidDate(d) => {
                write!(f, "invalid date format {:?}, expected YYYY-MM-DD", d)
            }
            QueryError::InvalidTime(t) => write!(f, "invalid time format {:?}, expected HH:MM", t),
            QueryError::InvalidPeriod(p) => write!(f, "invalid period {}, must be 1-1440", p),
            QueryError::NonexistentLocalTime(t) => {
                write!(f, "{} does not exist in the reference timezone", t)
            }
        }
    }
}

impl std::error::Error for QueryError {}

/// `YYYY-MM-DD`, or today when absent or blank.
pub fn parse_date_or_today(date: Option<&str>, today: NaiveDate) -> Result<NaiveDate, QueryError> {
    match date.map(str::trim).filter(|d| !d.is_empty()) {
        None => Ok(today),
        Some(d) => parse_date(d).ok_or_else(|| QueryError::InvalidDate(d.to_string())),
    }
}

/// `HH:MM` with hour 0-23 and minute 0-59; single-digit fields are accepted.
pub fn parse_time_of_day(time: &str) -> Result<NaiveTime, QueryError> {
    let invalid = || QueryError::InvalidTime(time.to_string());
    let (hour, minute) = time.trim().split_once(':').ok_or_else(invalid)?;
    let field = |s: &str| -> Result<u32, QueryError> {
        if s.is_empty() || s.len() > 2 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        s.parse().map_err(|_| invalid())
    };
    NaiveTime::from_hms_opt(field(hour)?, field(minute)?, 0).ok_or_else(invalid)
}

/// Summaries for one ticker's file; a missing file has none.
pub fn analyze_ticker_and_date(
    log_dir: &Path,
    ticker: &str,
    date: NaiveDate,
    period_minutes: u32,
    tz: &Tz,
) -> Result<Vec<PeriodSummary>> {
    let path = log_file_for_ticker_and_date(log_dir, ticker, date);
    let ticks = read_log_file(&path)?;
    Ok(aggregate_premiums(&ticks, period_minutes, tz))
}

/// Summaries across every ticker logged on `date`.
///
/// Files are read in parallel; a file that fails to read is logged and left out.
pub fn analyze_date(
    log_dir: &Path,
    date: NaiveDate,
    period_minutes: u32,
    tz: &Tz,
) -> Result<Vec<PeriodSummary>> {
    let files = log_files_for_date(log_dir, date)?;
    let ticks: Vec<Tick> = files
        .par_iter()
        .flat_map_iter(|path| match read_log_file(path) {
            Ok(ticks) => ticks,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable log file");
                Vec::new()
            }
        })
        .collect();
    Ok(aggregate_premiums(&ticks, period_minutes, tz))
}

/// Raw ticks whose start falls in `[date time, date time + period)` in the reference timezone.
pub fn transactions_for_period(
    log_dir: &Path,
    ticker: &str,
    date: NaiveDate,
    time: NaiveTime,
    period_minutes: u32,
    tz: &Tz,
) -> Result<Vec<Tick>> {
    let start = window_start_ms(date, time, tz)?;
    let end = start + period_ms(period_minutes);

    let path = log_file_for_ticker_and_date(log_dir, ticker, date);
    Ok(read_log_file(&path)?
        .into_iter()
        .filter(|t| t.start_timestamp >= start && t.start_timestamp < end)
        .collect())
}

fn window_start_ms(date: NaiveDate, time: NaiveTime, tz: &Tz) -> Result<i64, QueryError> {
    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|dt| dt.timestamp_millis())
        .ok_or_else(|| QueryError::NonexistentLocalTime(format!("{} {}", date, time)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::Los_Angeles;
    use std::fs;

    // 2023-06-16 09:30:00 America/Los_Angeles
    const T0: i64 = 1_686_933_000_000;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 6, 16).unwrap()
    }

    fn line(symbol: &str, volume: i64, vwap: f64, start: i64) -> String {
        format!(
            "{{\"sym\":\"{}\",\"v\":{},\"vw\":{},\"s\":{},\"e\":{}}}\n",
            symbol,
            volume,
            vwap,
            start,
            start + 1000
        )
    }

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!(
            parse_time_of_day("09:30").unwrap(),
            NaiveTime::from_hms_opt(9, 30, 0).unwrap()
        );
        assert_eq!(
            parse_time_of_day("7:05").unwrap(),
            NaiveTime::from_hms_opt(7, 5, 0).unwrap()
        );
        for bad in ["24:00", "12:60", "noon", "12", "12:3:00", ":30", "-1:30", "123:00"] {
            assert!(parse_time_of_day(bad).is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_parse_date_or_today() {
        let today = date();
        assert_eq!(parse_date_or_today(None, today).unwrap(), today);
        assert_eq!(parse_date_or_today(Some(""), today).unwrap(), today);
        assert_eq!(
            parse_date_or_today(Some("2024-02-29"), today).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert!(matches!(
            parse_date_or_today(Some("06/16/2023"), today),
            Err(QueryError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_transactions_window_is_half_open() {
        let dir = tempfile::tempdir().unwrap();
        let sym = "O:AAPL230616C00150000";
        let body = [
            line(sym, 1, 1.0, T0 - 1),
            line(sym, 2, 1.0, T0),
            line(sym, 3, 1.0, T0 + 59_999),
            line(sym, 4, 1.0, T0 + 60_000),
        ]
        .concat();
        fs::write(dir.path().join("AAPL_2023-06-16.jsonl"), body).unwrap();

        let time = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        let ticks =
            transactions_for_period(dir.path(), "AAPL", date(), time, 1, &Los_Angeles).unwrap();
        let volumes: Vec<i64> = ticks.iter().map(|t| t.volume).collect();
        assert_eq!(volumes, vec![2, 3]);
    }

    #[test]
    fn test_transactions_for_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let time = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        let ticks =
            transactions_for_period(dir.path(), "NONE", date(), time, 5, &Los_Angeles).unwrap();
        assert!(ticks.is_empty());
    }

    #[test]
    fn test_analyze_date_combines_tickers() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("AAPL_2023-06-16.jsonl"),
            line("O:AAPL230616C00150000", 100, 1.0, T0),
        )
        .unwrap();
        fs::write(
            dir.path().join("MSFT_2023-06-16.jsonl"),
            line("O:MSFT230616P00300000", 100, 2.0, T0 + 1000),
        )
        .unwrap();

        let summaries = analyze_date(dir.path(), date(), 5, &Los_Angeles).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].call_premium, 10_000.0);
        assert_eq!(summaries[0].put_premium, 20_000.0);
        assert_eq!(summaries[0].call_put_ratio, 0.5);

        let aapl = analyze_ticker_and_date(dir.path(), "aapl", date(), 5, &Los_Angeles).unwrap();
        assert_eq!(aapl.len(), 1);
        assert_eq!(aapl[0].put_premium, 0.0);
    }
}
