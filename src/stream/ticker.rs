//! Per-instrument streaming state.
//!
//! A [`TickerStream`] follows one ticker's daily log. It owns the byte offset of
//! the last complete record consumed and the buckets still inside the retention
//! window, and turns each batch of newly appended ticks into bucket snapshots.

use crate::analysis::{accumulate, bucket_bounds, period_ms};
use crate::logs::{log_file_for_ticker_and_date, read_incremental};
use crate::models::{BucketStatus, PeriodSummary, Tick};
use anyhow::Result;
use chrono::NaiveDate;
use chrono_tz::Tz;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Bucketing parameters shared by every stream in a process.
#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    pub period_minutes: u32,
    pub retention_periods: u32,
    pub tz: Tz,
}

impl StreamSettings {
    pub fn period_ms(&self) -> i64 {
        period_ms(self.period_minutes)
    }

    /// How long a completed bucket is kept after its end.
    pub fn retention_ms(&self) -> i64 {
        self.period_ms() * self.retention_periods.max(1) as i64
    }
}

#[derive(Debug)]
pub struct TickerStream {
    ticker: String,
    date: NaiveDate,
    path: PathBuf,
    settings: StreamSettings,
    offset: u64,
    buckets: BTreeMap<i64, PeriodSummary>,
    latest_completed_end: Option<i64>,
    seeded: Vec<PeriodSummary>,
}

impl TickerStream {
    pub fn new(log_dir: &Path, ticker: &str, date: NaiveDate, settings: StreamSettings) -> Self {
        let ticker = ticker.to_ascii_uppercase();
        Self {
            path: log_file_for_ticker_and_date(log_dir, &ticker, date),
            ticker,
            date,
            settings,
            offset: 0,
            buckets: BTreeMap::new(),
            latest_completed_end: None,
            seeded: Vec::new(),
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn latest_completed_end(&self) -> Option<i64> {
        self.latest_completed_end
    }

    /// Establish the starting offset from what is already on disk.
    ///
    /// When some bucket ended at least one full period ago, the consumed prefix of
    /// the file is skipped and the buckets still inside retention are seeded from
    /// it. Otherwise the offset stays at 0 and the first poll rebuilds everything.
    ///
    /// Seeded buckets that have not settled yet are held for [`take_seeded`] since
    /// the records behind them will never come out of a poll.
    ///
    /// [`take_seeded`]: TickerStream::take_seeded
    pub fn bootstrap(&mut self, now_ms: i64) -> Result<()> {
        let read = read_incremental(&self.path, 0)?;

        let mut all = BTreeMap::new();
        for tick in &read.ticks {
            accumulate(&mut all, tick, self.settings.period_minutes, &self.settings.tz);
        }

        let period = self.settings.period_ms();
        let has_settled_bucket = all.values().any(|s| now_ms - s.end_ms() >= period);
        if !has_settled_bucket {
            debug!(ticker = %self.ticker, "no settled bucket yet; streaming from start of file");
            return Ok(());
        }

        self.offset = read.offset;
        let retention = self.settings.retention_ms();
        self.buckets = all
            .into_iter()
            .filter(|(_, s)| s.end_ms() + retention > now_ms)
            .collect();
        self.refresh(now_ms);
        self.seeded = self
            .buckets
            .values()
            .filter(|s| now_ms - s.end_ms() < period)
            .cloned()
            .collect();

        info!(
            ticker = %self.ticker,
            offset = self.offset,
            seeded = self.buckets.len(),
            unsettled = self.seeded.len(),
            "stream bootstrapped from existing log"
        );
        Ok(())
    }

    /// Snapshots of the unsettled buckets bootstrap consumed, handed out once.
    pub fn take_seeded(&mut self) -> Vec<PeriodSummary> {
        std::mem::take(&mut self.seeded)
    }

    /// Read whatever complete records were appended since the last poll.
    pub fn poll(&mut self, now_ms: i64) -> Result<Vec<PeriodSummary>> {
        let read = read_incremental(&self.path, self.offset)?;
        self.offset = self.offset.max(read.offset);
        if read.skipped > 0 {
            debug!(ticker = %self.ticker, skipped = read.skipped, "malformed records skipped");
        }
        Ok(self.apply(&read.ticks, now_ms))
    }

    /// Fold ticks into their buckets in order and return one snapshot per tick.
    ///
    /// Ticks that land in a bucket already past retention and not tracked are dropped.
    pub fn apply(&mut self, ticks: &[Tick], now_ms: i64) -> Vec<PeriodSummary> {
        let retention = self.settings.retention_ms();
        let mut changed = Vec::with_capacity(ticks.len());

        for tick in ticks {
            let (start, end) = bucket_bounds(
                tick.start_timestamp,
                self.settings.period_minutes,
                &self.settings.tz,
            );
            if end + retention <= now_ms && !self.buckets.contains_key(&start) {
                debug!(ticker = %self.ticker, bucket_start = start, "tick for expired bucket dropped");
                continue;
            }
            let Some(key) = accumulate(
                &mut self.buckets,
                tick,
                self.settings.period_minutes,
                &self.settings.tz,
            ) else {
                continue;
            };
            if let Some(snapshot) = self.buckets.get(&key) {
                changed.push(snapshot.clone());
            }
        }

        self.refresh(now_ms);
        changed
    }

    /// Retained buckets, oldest first, paired with their status at `now_ms`.
    pub fn retained_with_status(&self, now_ms: i64) -> Vec<(PeriodSummary, BucketStatus)> {
        self.buckets
            .values()
            .map(|s| (s.clone(), s.status_at(now_ms)))
            .collect()
    }

    /// Update the completed boundary and drop buckets past retention.
    pub fn refresh(&mut self, now_ms: i64) {
        let completed = self
            .buckets
            .values()
            .map(|s| s.end_ms())
            .filter(|end| *end <= now_ms)
            .max();
        self.latest_completed_end = self.latest_completed_end.max(completed);

        let retention = self.settings.retention_ms();
        self.buckets.retain(|_, s| s.end_ms() + retention > now_ms);
    }
}
