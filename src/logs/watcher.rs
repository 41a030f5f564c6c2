//! Log directory change detection.
//!
//! [`LogWatcher`] polls the directory and reports files that appeared or changed
//! size. [`Debouncer`] coalesces bursts per file and releases one event once the
//! file has been quiet for the configured window.

use super::paths::{parse_log_file_name, LOG_EXTENSION};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub ticker: String,
    pub date: NaiveDate,
}

pub struct LogWatcher {
    log_dir: PathBuf,
    poll_interval: Duration,
    sizes: HashMap<PathBuf, u64>,
}

impl LogWatcher {
    pub fn new(log_dir: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            log_dir: log_dir.into(),
            poll_interval,
            sizes: HashMap::new(),
        }
    }

    /// One pass over the directory. Files seen for the first time count as changed.
    pub fn scan(&mut self) -> Vec<FileChange> {
        let entries = match fs::read_dir(&self.log_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %self.log_dir.display(), error = %e, "log directory not readable yet");
                return Vec::new();
            }
        };

        let mut changes = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION) {
                continue;
            }
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let size = meta.len();
            if self.sizes.get(&path) == Some(&size) {
                continue;
            }
            self.sizes.insert(path.clone(), size);

            if let Some(change) = file_change(&path) {
                changes.push(change);
            }
        }

        // Forget files that were removed so a recreated file is reported again.
        self.sizes.retain(|path, _| path.exists());
        changes
    }

    /// Poll until the receiving side goes away.
    pub async fn run(mut self, tx: mpsc::Sender<FileChange>) {
        info!(
            dir = %self.log_dir.display(),
            interval_ms = self.poll_interval.as_millis() as u64,
            "watching log directory"
        );
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            for change in self.scan() {
                if tx.send(change).await.is_err() {
                    warn!("file change receiver dropped; stopping watcher");
                    return;
                }
            }
        }
    }
}

fn file_change(path: &Path) -> Option<FileChange> {
    let (ticker, date) = parse_log_file_name(path)?;
    Some(FileChange {
        path: path.to_path_buf(),
        ticker,
        date,
    })
}

/// Per-path trailing-edge debounce.
pub struct Debouncer {
    quiet: Duration,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self { quiet }
    }

    /// Forward each path once it has seen no new event for the quiet window.
    /// Pending events are flushed when the input closes.
    pub async fn run(self, mut rx: mpsc::Receiver<FileChange>, tx: mpsc::Sender<FileChange>) {
        let mut pending: HashMap<PathBuf, (FileChange, Instant)> = HashMap::new();

        loop {
            let next_due = pending.values().map(|(_, due)| *due).min();

            tokio::select! {
                received = rx.recv() => match received {
                    Some(change) => {
                        let due = Instant::now() + self.quiet;
                        pending.insert(change.path.clone(), (change, due));
                    }
                    None => {
                        for (change, _) in pending.into_values() {
                            let _ = tx.send(change).await;
                        }
                        return;
                    }
                },
                _ = sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {
                    let now = Instant::now();
                    let ready: Vec<PathBuf> = pending
                        .iter()
                        .filter(|(_, (_, due))| *due <= now)
                        .map(|(path, _)| path.clone())
                        .collect();
                    for path in ready {
                        if let Some((change, _)) = pending.remove(&path) {
                            if tx.send(change).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        }
    }
}
