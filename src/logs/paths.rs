//! Daily per-instrument log file naming: `<TICKER>_<YYYY-MM-DD>.jsonl`.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use std::fs;
use std::path::{Path, PathBuf};

pub const LOG_EXTENSION: &str = "jsonl";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Current calendar date in the reference timezone.
pub fn today(tz: &Tz) -> NaiveDate {
    Utc::now().with_timezone(tz).date_naive()
}

pub fn parse_date(date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date, DATE_FORMAT).ok()
}

pub fn log_file_name(ticker: &str, date: NaiveDate) -> String {
    format!(
        "{}_{}.{}",
        ticker.to_ascii_uppercase(),
        date.format(DATE_FORMAT),
        LOG_EXTENSION
    )
}

pub fn log_file_for_ticker_and_date(log_dir: &Path, ticker: &str, date: NaiveDate) -> PathBuf {
    log_dir.join(log_file_name(ticker, date))
}

/// Recover `(TICKER, date)` from a log file path; `None` for anything else.
pub fn parse_log_file_name(path: &Path) -> Option<(String, NaiveDate)> {
    if path.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let (ticker, date) = stem.rsplit_once('_')?;
    if ticker.is_empty() {
        return None;
    }
    Some((ticker.to_ascii_uppercase(), parse_date(date)?))
}

/// All per-ticker log files for `date`, sorted by name. A missing directory has no files.
pub fn log_files_for_date(log_dir: &Path, date: NaiveDate) -> Result<Vec<PathBuf>> {
    if !log_dir.exists() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(log_dir)
        .with_context(|| format!("Failed to read log directory: {}", log_dir.display()))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| matches!(parse_log_file_name(path), Some((_, d)) if d == date))
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 8).unwrap()
    }

    #[test]
    fn test_file_name_round_trip() {
        let path = log_file_for_ticker_and_date(Path::new("/logs"), "aapl", date());
        assert_eq!(path, PathBuf::from("/logs/AAPL_2024-03-08.jsonl"));
        assert_eq!(
            parse_log_file_name(&path),
            Some(("AAPL".to_string(), date()))
        );
    }

    #[test]
    fn test_parse_rejects_foreign_files() {
        assert_eq!(parse_log_file_name(Path::new("/logs/AAPL_2024-03-08.json")), None);
        assert_eq!(parse_log_file_name(Path::new("/logs/AAPL.jsonl")), None);
        assert_eq!(parse_log_file_name(Path::new("/logs/AAPL_yesterday.jsonl")), None);
        assert_eq!(parse_log_file_name(Path::new("/logs/_2024-03-08.jsonl")), None);
    }

    #[test]
    fn test_ticker_with_underscore_uses_last_separator() {
        assert_eq!(
            parse_log_file_name(Path::new("BRK_B_2024-03-08.jsonl")),
            Some(("BRK_B".to_string(), date()))
        );
    }

    #[test]
    fn test_files_for_date_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "MSFT_2024-03-08.jsonl",
            "AAPL_2024-03-08.jsonl",
            "AAPL_2024-03-07.jsonl",
            "notes.txt",
        ] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let files = log_files_for_date(dir.path(), date()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["AAPL_2024-03-08.jsonl", "MSFT_2024-03-08.jsonl"]);
    }

    #[test]
    fn test_missing_directory_has_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = log_files_for_date(&dir.path().join("nope"), date()).unwrap();
        assert!(files.is_empty());
    }
}
