//! Wiring for the long-running service: stores, streaming pipeline, background
//! tasks and the HTTP server.

use crate::api::{router, AppState};
use crate::auth::JwtHandler;
use crate::config::Config;
use crate::logs::{Debouncer, LogWatcher};
use crate::notifications::{
    DeviceStore, LogPushGateway, Notifier, PushGateway, RuleStore, WebhookPushGateway,
};
use crate::stream::{Pipeline, StreamSettings, TickerRegistry};
use crate::ws::ConnectionHub;
use anyhow::{Context, Result};
use std::fs;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

const CHANGE_QUEUE: usize = 1024;

pub struct Service {
    pub state: AppState,
    pub pipeline: Pipeline,
}

impl Service {
    /// Open every store. Fails when the log directory is unusable or a rule file is malformed.
    pub fn build(config: Config) -> Result<Self> {
        ensure_usable_dir(&config.log_dir)?;
        ensure_usable_dir(&config.devices_dir)?;
        let rules = Arc::new(RuleStore::open(&config.notifications_dir)?);
        let devices = Arc::new(DeviceStore::new(&config.devices_dir));

        let gateway: Arc<dyn PushGateway> = match &config.push_gateway_url {
            Some(url) => {
                info!(url = %url, "push notifications via webhook gateway");
                Arc::new(WebhookPushGateway::new(url.clone())?)
            }
            None => {
                info!("no push gateway configured; alerts will only be logged");
                Arc::new(LogPushGateway)
            }
        };
        let notifier = Arc::new(Notifier::new(devices.clone(), gateway));

        let settings = StreamSettings {
            period_minutes: config.period_minutes,
            retention_periods: config.retention_periods,
            tz: config.timezone,
        };
        let registry = Arc::new(TickerRegistry::new(
            &config.log_dir,
            settings,
            config.dedup_window.as_millis() as i64,
        ));
        let hub = Arc::new(ConnectionHub::default());
        let jwt = Arc::new(JwtHandler::new(
            config.jwt_secret.clone(),
            config.jwt_expiry_hours,
        ));

        let pipeline = Pipeline::new(registry.clone(), hub.clone(), rules.clone(), notifier);
        let state = AppState {
            config: Arc::new(config),
            hub,
            registry,
            rules,
            devices,
            jwt,
        };
        Ok(Self { state, pipeline })
    }

    /// Start the background tasks: watcher, debouncer, pipeline, sweeper, rule
    /// reloader and a one-off bootstrap of rule tickers.
    pub fn spawn_background(&self) -> Vec<JoinHandle<()>> {
        let config = &self.state.config;
        let (raw_tx, raw_rx) = mpsc::channel(CHANGE_QUEUE);
        let (debounced_tx, debounced_rx) = mpsc::channel(CHANGE_QUEUE);

        vec![
            tokio::spawn(LogWatcher::new(&config.log_dir, config.poll_interval).run(raw_tx)),
            tokio::spawn(Debouncer::new(config.debounce).run(raw_rx, debounced_tx)),
            tokio::spawn(self.pipeline.clone().track_initial_rules()),
            tokio::spawn(self.pipeline.clone().run(debounced_rx)),
            tokio::spawn(self.pipeline.clone().run_sweeper(config.sweep_interval)),
            tokio::spawn(
                self.pipeline
                    .clone()
                    .run_rule_reloader(config.rules_reload_interval),
            ),
        ]
    }

    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let addr = listener.local_addr().context("listener has no address")?;
        info!(%addr, "API server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await
            .context("Server error")
    }
}

/// Create `dir` if needed and prove it can be listed and written.
fn ensure_usable_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    fs::read_dir(dir).with_context(|| format!("Cannot read directory: {}", dir.display()))?;

    let marker = dir.join(".optflow-write-check");
    fs::write(&marker, b"")
        .with_context(|| format!("Cannot write to directory: {}", dir.display()))?;
    fs::remove_file(&marker)
        .with_context(|| format!("Cannot clean up in directory: {}", dir.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::rooted_at(dir.path(), "secret");
        let service = Service::build(config).unwrap();
        assert!(service.state.config.log_dir.is_dir());
        assert!(service.state.config.notifications_dir.is_dir());
        assert!(!service.state.config.log_dir.join(".optflow-write-check").exists());
    }

    #[test]
    fn test_build_with_webhook_gateway() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::rooted_at(dir.path(), "secret");
        config.push_gateway_url = Some("http://127.0.0.1:9/push".to_string());
        assert!(Service::build(config).is_ok());
    }

    #[test]
    fn test_build_fails_on_malformed_rules() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::rooted_at(dir.path(), "secret");
        fs::create_dir_all(&config.notifications_dir).unwrap();
        fs::write(config.notifications_dir.join("u.json"), b"[oops").unwrap();
        assert!(Service::build(config).is_err());
    }

    #[test]
    fn test_build_fails_when_log_dir_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::rooted_at(dir.path(), "secret");
        let file = dir.path().join("not-a-dir");
        fs::write(&file, b"x").unwrap();
        config.log_dir = file;
        assert!(Service::build(config).is_err());
    }
}
