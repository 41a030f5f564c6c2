//! Tracked tickers.
//!
//! Lock order: the registry map lock is only held for lookups, inserts and
//! evictions and never while waiting on a ticker's own mutex. Work on one ticker
//! happens under that ticker's mutex alone, so tickers never contend.

use super::ticker::{StreamSettings, TickerStream};
use crate::logs::today;
use crate::notifications::{build_payload, NotificationLedger, NotificationRule, PushPayload};
use anyhow::Result;
use chrono::NaiveDate;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Streaming state plus alert bookkeeping for one ticker and day.
#[derive(Debug)]
pub struct TickerState {
    pub stream: TickerStream,
    pub ledger: NotificationLedger,
}

pub type SharedTickerState = Arc<Mutex<TickerState>>;

/// An alert that passed evaluation and dedup and is ready to send.
#[derive(Debug, Clone)]
pub struct PendingAlert {
    pub user_id: String,
    pub payload: PushPayload,
}

impl TickerState {
    pub fn bootstrap(
        log_dir: &std::path::Path,
        ticker: &str,
        date: NaiveDate,
        settings: StreamSettings,
        dedup_window_ms: i64,
        now_ms: i64,
    ) -> Result<Self> {
        let mut stream = TickerStream::new(log_dir, ticker, date, settings);
        stream.bootstrap(now_ms)?;
        Ok(Self {
            stream,
            ledger: NotificationLedger::new(now_ms, dedup_window_ms),
        })
    }

    /// Evaluate every retained bucket against every rule for this ticker.
    pub fn pending_alerts(
        &mut self,
        rules: &[(String, NotificationRule)],
        now_ms: i64,
    ) -> Vec<PendingAlert> {
        if rules.is_empty() {
            return Vec::new();
        }
        let buckets = self.stream.retained_with_status(now_ms);
        let ticker = self.stream.ticker().to_string();

        let mut alerts = Vec::new();
        for (summary, status) in &buckets {
            for (user_id, rule) in rules {
                if self.ledger.check(user_id, summary, rule, now_ms).is_some() {
                    alerts.push(PendingAlert {
                        user_id: user_id.clone(),
                        payload: build_payload(&ticker, summary, *status),
                    });
                }
            }
        }
        alerts
    }

    /// Advance completion, drop expired buckets and forget their dedup keys.
    pub fn maintain(&mut self, now_ms: i64, retention_ms: i64) {
        self.stream.refresh(now_ms);
        self.ledger.prune(now_ms - retention_ms);
    }
}

struct Entry {
    date: NaiveDate,
    state: SharedTickerState,
}

pub struct TickerRegistry {
    log_dir: PathBuf,
    settings: StreamSettings,
    dedup_window_ms: i64,
    entries: RwLock<HashMap<String, Entry>>,
}

impl TickerRegistry {
    pub fn new(log_dir: impl Into<PathBuf>, settings: StreamSettings, dedup_window_ms: i64) -> Self {
        Self {
            log_dir: log_dir.into(),
            settings,
            dedup_window_ms,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> StreamSettings {
        self.settings
    }

    pub fn get(&self, ticker: &str) -> Option<SharedTickerState> {
        self.entries
            .read()
            .get(&ticker.to_ascii_uppercase())
            .map(|e| e.state.clone())
    }

    /// The tracked state for `ticker` on `date`, bootstrapping it on first use.
    ///
    /// A later date replaces the entry (day rollover). Returns `None` for a date
    /// older than the one already tracked. Bootstrap I/O runs without the map lock.
    pub fn get_or_bootstrap(
        &self,
        ticker: &str,
        date: NaiveDate,
        now_ms: i64,
    ) -> Result<Option<SharedTickerState>> {
        let ticker = ticker.to_ascii_uppercase();
        if let Some(entry) = self.entries.read().get(&ticker) {
            if entry.date == date {
                return Ok(Some(entry.state.clone()));
            }
            if entry.date > date {
                debug!(ticker = %ticker, %date, tracked = %entry.date, "ignoring change for an older day");
                return Ok(None);
            }
        }

        let fresh = TickerState::bootstrap(
            &self.log_dir,
            &ticker,
            date,
            self.settings,
            self.dedup_window_ms,
            now_ms,
        )?;

        let mut entries = self.entries.write();
        let existing = entries
            .get(&ticker)
            .map(|e| (e.date, e.state.clone()));
        match existing {
            // Someone else won the race for the same day.
            Some((tracked, state)) if tracked == date => Ok(Some(state)),
            Some((tracked, _)) if tracked > date => Ok(None),
            previous => {
                match previous {
                    Some((tracked, _)) => {
                        info!(ticker = %ticker, from = %tracked, to = %date, "ticker rolled over to a new day")
                    }
                    None => info!(ticker = %ticker, %date, "tracking ticker"),
                }
                let state = Arc::new(Mutex::new(fresh));
                entries.insert(
                    ticker,
                    Entry {
                        date,
                        state: state.clone(),
                    },
                );
                Ok(Some(state))
            }
        }
    }

    /// Start following `ticker` for the current day in the reference timezone.
    pub fn track_today(&self, ticker: &str, now_ms: i64) -> Result<Option<SharedTickerState>> {
        self.get_or_bootstrap(ticker, today(&self.settings.tz), now_ms)
    }

    /// Keep only tickers for which `keep` holds; returns the evicted ones.
    pub fn retain(&self, keep: impl Fn(&str) -> bool) -> Vec<String> {
        let mut evicted = Vec::new();
        self.entries.write().retain(|ticker, _| {
            let kept = keep(ticker);
            if !kept {
                evicted.push(ticker.clone());
            }
            kept
        });
        for ticker in &evicted {
            info!(ticker = %ticker, "stopped tracking ticker");
        }
        evicted
    }

    /// Snapshot of tracked states, for maintenance outside the map lock.
    pub fn states(&self) -> Vec<SharedTickerState> {
        self.entries
            .read()
            .values()
            .map(|e| e.state.clone())
            .collect()
    }

    pub fn tickers(&self) -> Vec<String> {
        let mut tickers: Vec<String> = self.entries.read().keys().cloned().collect();
        tickers.sort();
        tickers
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
