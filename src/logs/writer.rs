//! Append-only daily tick log writer.

use super::paths::{log_file_for_ticker_and_date, today};
use crate::analysis::underlying_symbol;
use crate::models::Tick;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use chrono_tz::Tz;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writes each tick as one JSON line into `<TICKER>_<date>.jsonl` for its underlying.
pub struct DailyLogWriter {
    log_dir: PathBuf,
    tz: Tz,
}

impl DailyLogWriter {
    pub fn new(log_dir: impl Into<PathBuf>, tz: Tz) -> Self {
        Self {
            log_dir: log_dir.into(),
            tz,
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Append to today's file in the reference timezone.
    pub fn write(&self, tick: &Tick) -> Result<PathBuf> {
        self.write_for_date(tick, today(&self.tz))
    }

    pub fn write_for_date(&self, tick: &Tick, date: NaiveDate) -> Result<PathBuf> {
        let ticker = underlying_symbol(&tick.symbol)
            .with_context(|| format!("Cannot route tick for symbol {}", tick.symbol))?;
        let path = log_file_for_ticker_and_date(&self.log_dir, &ticker, date);

        fs::create_dir_all(&self.log_dir).with_context(|| {
            format!("Failed to create log directory: {}", self.log_dir.display())
        })?;

        // One write per record so readers never see an interleaved line.
        let mut line = serde_json::to_vec(tick).context("Failed to encode tick")?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        file.write_all(&line)
            .with_context(|| format!("Failed to append to {}", path.display()))?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::reader::read_log_file;

    #[test]
    fn test_writes_one_line_per_tick_into_underlying_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DailyLogWriter::new(dir.path().join("logs"), chrono_tz::America::Los_Angeles);
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        let tick = Tick {
            symbol: "O:SPY240501C00500000".to_string(),
            volume: 3,
            vwap: 1.25,
            ..Default::default()
        };
        let path = writer.write_for_date(&tick, date).unwrap();
        writer.write_for_date(&tick, date).unwrap();

        assert!(path.ends_with("SPY_2024-05-01.jsonl"));
        let ticks = read_log_file(&path).unwrap();
        assert_eq!(ticks, vec![tick.clone(), tick]);
    }

    #[test]
    fn test_unroutable_symbol_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DailyLogWriter::new(dir.path(), chrono_tz::America::Los_Angeles);
        let tick = Tick {
            symbol: "???".to_string(),
            ..Default::default()
        };
        assert!(writer.write(&tick).is_err());
    }
}
