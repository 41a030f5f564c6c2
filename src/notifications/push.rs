//! Push delivery.
//!
//! The gateway is an outside service; [`PushGateway`] is the seam. Delivery is a
//! single attempt per device with no retry.

use super::devices::DeviceStore;
use crate::models::{BucketStatus, PeriodSummary};
use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[async_trait::async_trait]
pub trait PushGateway: Send + Sync {
    async fn push(&self, device_token: &str, payload: &PushPayload) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aps {
    pub alert: Alert,
    pub sound: String,
    pub badge: u32,
}

/// APNS-style alert plus the bucket that triggered it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushPayload {
    pub aps: Aps,
    pub ticker: String,
    pub period_status: String,
    pub period_end: String,
    pub call_premium: f64,
    pub put_premium: f64,
    pub total_premium: f64,
    pub call_put_ratio: f64,
    pub call_volume: i64,
    pub put_volume: i64,
}

pub fn build_payload(ticker: &str, summary: &PeriodSummary, status: BucketStatus) -> PushPayload {
    PushPayload {
        aps: Aps {
            alert: Alert {
                title: format!("Options Alert: {}", ticker),
                body: format!(
                    "{} period - Call: ${:.2}, Put: ${:.2}, Ratio: {:.2}",
                    status.as_str(),
                    summary.call_premium,
                    summary.put_premium,
                    summary.call_put_ratio
                ),
            },
            sound: "default".to_string(),
            badge: 1,
        },
        ticker: ticker.to_string(),
        period_status: status.as_str().to_string(),
        period_end: summary.period_end.to_rfc3339(),
        call_premium: summary.call_premium,
        put_premium: summary.put_premium,
        total_premium: summary.total_premium,
        call_put_ratio: summary.call_put_ratio,
        call_volume: summary.call_volume,
        put_volume: summary.put_volume,
    }
}

/// POSTs `{ "device_token", "payload" }` to a relay that speaks to the platform service.
pub struct WebhookPushGateway {
    client: Client,
    url: String,
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    device_token: &'a str,
    payload: &'a PushPayload,
}

impl WebhookPushGateway {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build push HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait::async_trait]
impl PushGateway for WebhookPushGateway {
    async fn push(&self, device_token: &str, payload: &PushPayload) -> Result<()> {
        self.client
            .post(&self.url)
            .json(&WebhookBody {
                device_token,
                payload,
            })
            .send()
            .await
            .context("Push gateway request failed")?
            .error_for_status()
            .context("Push gateway rejected notification")?;
        Ok(())
    }
}

/// Logs alerts instead of sending them; used when no gateway is configured.
pub struct LogPushGateway;

#[async_trait::async_trait]
impl PushGateway for LogPushGateway {
    async fn push(&self, device_token: &str, payload: &PushPayload) -> Result<()> {
        info!(
            device = %device_token,
            title = %payload.aps.alert.title,
            body = %payload.aps.alert.body,
            "push notification (log only)"
        );
        Ok(())
    }
}

pub struct Notifier {
    devices: Arc<DeviceStore>,
    gateway: Arc<dyn PushGateway>,
}

impl Notifier {
    pub fn new(devices: Arc<DeviceStore>, gateway: Arc<dyn PushGateway>) -> Self {
        Self { devices, gateway }
    }

    /// Send to every active device of `user_id`. Succeeds when at least one accepted.
    pub async fn deliver(&self, user_id: &str, payload: &PushPayload) -> Result<usize> {
        let tokens = self.devices.active_tokens(user_id)?;
        if tokens.is_empty() {
            bail!("no active devices for user {}", user_id);
        }

        let mut accepted = 0;
        for token in &tokens {
            match self.gateway.push(token, payload).await {
                Ok(()) => accepted += 1,
                Err(e) => warn!(user = %user_id, error = %e, "push to device failed"),
            }
        }
        if accepted == 0 {
            bail!("all {} device(s) rejected the notification", tokens.len());
        }

        debug!(user = %user_id, accepted, total = tokens.len(), "notification delivered");
        Ok(accepted)
    }
}
