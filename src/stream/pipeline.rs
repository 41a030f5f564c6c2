//! Debounced file changes in, bucket updates and alerts out.

use super::registry::{PendingAlert, TickerRegistry};
use crate::logs::FileChange;
use crate::models::PeriodSummary;
use crate::notifications::{Notifier, RuleStore};
use crate::ws::ConnectionHub;
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// What one change event produced.
#[derive(Debug, Default)]
pub struct ChangeOutcome {
    pub updates: Vec<PeriodSummary>,
    pub alerts: Vec<PendingAlert>,
}

#[derive(Clone)]
pub struct Pipeline {
    registry: Arc<TickerRegistry>,
    hub: Arc<ConnectionHub>,
    rules: Arc<RuleStore>,
    notifier: Arc<Notifier>,
}

impl Pipeline {
    pub fn new(
        registry: Arc<TickerRegistry>,
        hub: Arc<ConnectionHub>,
        rules: Arc<RuleStore>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            registry,
            hub,
            rules,
            notifier,
        }
    }

    pub fn registry(&self) -> &Arc<TickerRegistry> {
        &self.registry
    }

    /// A ticker is worth tracking while someone is subscribed or a rule watches it.
    pub fn is_interesting(&self, ticker: &str) -> bool {
        self.hub.is_subscribed(ticker) || self.rules.has_rules(ticker)
    }

    /// Read the new records for one file, fan out every changed bucket and
    /// dispatch any alerts that fired.
    pub async fn handle_change(&self, change: FileChange) -> Result<ChangeOutcome> {
        if !self.is_interesting(&change.ticker) {
            debug!(ticker = %change.ticker, "change ignored; nobody interested");
            return Ok(ChangeOutcome::default());
        }

        let outcome = self.process_blocking(change.clone()).await?;

        for summary in &outcome.updates {
            self.hub.broadcast(&change.ticker, summary);
        }
        for alert in &outcome.alerts {
            self.dispatch(&change.ticker, alert.clone());
        }
        if !outcome.updates.is_empty() {
            debug!(
                ticker = %change.ticker,
                updates = outcome.updates.len(),
                alerts = outcome.alerts.len(),
                "processed log change"
            );
        }
        Ok(outcome)
    }

    async fn process_blocking(&self, change: FileChange) -> Result<ChangeOutcome> {
        let registry = self.registry.clone();
        let rules = self.rules.rules_for(&change.ticker);

        tokio::task::spawn_blocking(move || -> Result<ChangeOutcome> {
            let now_ms = Utc::now().timestamp_millis();
            let Some(shared) = registry.get_or_bootstrap(&change.ticker, change.date, now_ms)?
            else {
                return Ok(ChangeOutcome::default());
            };

            let mut state = shared.lock();
            // Records bootstrap swallowed go out ahead of anything new.
            let mut updates = state.stream.take_seeded();
            updates.extend(state.stream.poll(now_ms)?);
            let alerts = state.pending_alerts(&rules, now_ms);
            Ok(ChangeOutcome { updates, alerts })
        })
        .await
        .context("change processing task panicked")?
    }

    /// One delivery attempt on its own task. Failures are logged; the dedup key stays claimed.
    fn dispatch(&self, ticker: &str, alert: PendingAlert) {
        let notifier = self.notifier.clone();
        let ticker = ticker.to_string();
        tokio::spawn(async move {
            match notifier.deliver(&alert.user_id, &alert.payload).await {
                Ok(accepted) => info!(
                    user = %alert.user_id,
                    ticker = %ticker,
                    status = %alert.payload.period_status,
                    accepted,
                    "alert sent"
                ),
                Err(e) => warn!(user = %alert.user_id, ticker = %ticker, error = %e, "alert dropped"),
            }
        });
    }

    /// Bootstrap today's stream for every rule ticker not tracked yet, so the
    /// first change after a rule appears is polled rather than swallowed.
    pub fn track_rule_tickers(&self) -> Vec<String> {
        let now_ms = Utc::now().timestamp_millis();
        let mut tracked = Vec::new();
        for ticker in self.rules.tickers() {
            if self.registry.get(&ticker).is_some() {
                continue;
            }
            match self.registry.track_today(&ticker, now_ms) {
                Ok(Some(_)) => tracked.push(ticker),
                Ok(None) => {}
                Err(e) => warn!(ticker = %ticker, error = %e, "failed to bootstrap rule ticker"),
            }
        }
        tracked
    }

    /// Evict tickers nobody cares about and age out the rest.
    pub fn sweep(&self) -> Vec<String> {
        let subscribed = self.hub.subscribed_tickers();
        let evicted = self
            .registry
            .retain(|ticker| subscribed.contains(ticker) || self.rules.has_rules(ticker));

        let now_ms = Utc::now().timestamp_millis();
        let retention_ms = self.registry.settings().retention_ms();
        for state in self.registry.states() {
            state.lock().maintain(now_ms, retention_ms);
        }
        evicted
    }

    pub async fn run(self, mut changes: mpsc::Receiver<FileChange>) {
        info!("streaming pipeline started");
        while let Some(change) = changes.recv().await {
            let path = change.path.clone();
            if let Err(e) = self.handle_change(change).await {
                error!(path = %path.display(), error = %e, "failed to process log change");
            }
        }
        info!("streaming pipeline stopped");
    }

    pub async fn run_sweeper(self, every: Duration) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = self.sweep();
            if !evicted.is_empty() {
                debug!(evicted = ?evicted, "sweep finished");
            }
        }
    }

    /// Pick up rule files edited outside the API. A bad file keeps the last good index.
    pub async fn run_rule_reloader(self, every: Duration) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let pipeline = self.clone();
            let reloaded = tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
                pipeline.rules.reload()?;
                Ok(pipeline.track_rule_tickers())
            })
            .await;
            match reloaded {
                Ok(Ok(tracked)) if !tracked.is_empty() => {
                    info!(tickers = ?tracked, "tracking tickers from reloaded rules")
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(error = %e, "rule reload failed; keeping previous rules"),
                Err(e) => error!(error = %e, "rule reload task panicked"),
            }
        }
    }

    /// Bootstrap rule tickers once at startup, off the async workers.
    pub async fn track_initial_rules(self) {
        match tokio::task::spawn_blocking(move || self.track_rule_tickers()).await {
            Ok(tracked) => info!(tickers = tracked.len(), "rule tickers bootstrapped"),
            Err(e) => error!(error = %e, "rule ticker bootstrap panicked"),
        }
    }
}
