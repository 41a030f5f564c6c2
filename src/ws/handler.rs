//! `/analyze` live subscription.
//!
//! After the upgrade a connection for today is registered with the hub, receives
//! the day's history as one frame per bucket, and then every update for its
//! ticker. A connection for an earlier day only gets that day's history. A server
//! ping keeps idle connections alive. Any send failure, read error or close ends
//! the connection and unregisters it.

use super::hub::ConnId;
use crate::api::handlers::{required_ticker, track_ticker};
use crate::api::{blocking, ApiError, AppState};
use crate::logs::{analyze_ticker_and_date, parse_date_or_today, today};
use crate::models::PeriodSummary;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use chrono::NaiveDate;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
pub struct AnalyzeQuery {
    pub ticker: Option<String>,
    pub date: Option<String>,
}

/// GET /analyze?ticker=&date=
///
/// Parameters are validated before the upgrade so bad requests get a plain 400.
pub async fn analyze_ws(
    State(state): State<AppState>,
    Query(query): Query<AnalyzeQuery>,
    ws: Option<WebSocketUpgrade>,
) -> Result<Response, ApiError> {
    let ticker = required_ticker(query.ticker.as_deref())?;
    let date = parse_date_or_today(query.date.as_deref(), today(&state.config.timezone))?;
    let ws = ws.ok_or(ApiError::UpgradeRequired)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, ticker, date)))
}

async fn handle_socket(socket: WebSocket, state: AppState, ticker: String, date: NaiveDate) {
    // Only today's log still grows; other days get their history and nothing else.
    let live = date == today(&state.config.timezone);
    // Register first so nothing written during the history load is missed.
    let (id, mut outbound) = if live {
        let (id, rx) = state.hub.register(&ticker);
        track_ticker(&state, &ticker).await;
        (Some(id), Some(rx))
    } else {
        (None, None)
    };
    let (mut sender, mut receiver) = socket.split();

    let mut covered = HashMap::new();
    match load_history(&state, &ticker, date).await {
        Ok(history) => {
            debug!(ticker = %ticker, %date, live, buckets = history.len(), "sending history");
            for summary in &history {
                covered.insert(summary.start_ms(), summary.call_volume + summary.put_volume);
                if send_summary(&mut sender, summary).await.is_err() {
                    release(&state, id);
                    return;
                }
            }
        }
        Err(e) => warn!(ticker = %ticker, %date, error = ?e, "history unavailable"),
    }

    let every = state.config.ping_interval;
    let mut ping = interval_at(Instant::now() + every, every);

    loop {
        tokio::select! {
            update = next_update(&mut outbound) => match update {
                // Queued while history loaded and already reflected in it.
                Some(text) if behind_history(&text, &covered) => {}
                Some(text) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                // The hub dropped us.
                None => break,
            },
            _ = ping.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(ticker = %ticker, error = %e, "websocket read error");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    release(&state, id);
    let _ = sender.close().await;
    info!(ticker = %ticker, %date, live, "websocket closed");
}

async fn send_summary(
    sender: &mut SplitSink<WebSocket, Message>,
    summary: &PeriodSummary,
) -> Result<(), axum::Error> {
    match serde_json::to_string(summary) {
        Ok(text) => sender.send(Message::Text(text)).await,
        Err(e) => {
            warn!(error = %e, "failed to encode summary");
            Ok(())
        }
    }
}

/// Pending forever for a connection without a live subscription.
async fn next_update(outbound: &mut Option<mpsc::Receiver<String>>) -> Option<String> {
    match outbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn release(state: &AppState, id: Option<ConnId>) {
    if let Some(id) = id {
        state.hub.unregister(id);
    }
}

/// A queued frame for a bucket the history already showed with at least as much volume.
fn behind_history(text: &str, covered: &HashMap<i64, i64>) -> bool {
    let Ok(summary) = serde_json::from_str::<PeriodSummary>(text) else {
        return false;
    };
    covered
        .get(&summary.start_ms())
        .is_some_and(|volume| summary.call_volume + summary.put_volume <= *volume)
}

async fn load_history(
    state: &AppState,
    ticker: &str,
    date: NaiveDate,
) -> Result<Vec<PeriodSummary>, ApiError> {
    let log_dir = state.config.log_dir.clone();
    let period = state.config.period_minutes;
    let tz = state.config.timezone;
    let ticker = ticker.to_string();
    blocking(move || analyze_ticker_and_date(&log_dir, &ticker, date, period, &tz)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::Los_Angeles;

    // 2023-06-16 09:30:00 America/Los_Angeles
    const T0: i64 = 1_686_933_000_000;

    fn frame(start_ms: i64, call_volume: i64, put_volume: i64) -> String {
        let mut summary = PeriodSummary::empty(start_ms, start_ms + 300_000, &Los_Angeles);
        summary.call_volume = call_volume;
        summary.put_volume = put_volume;
        serde_json::to_string(&summary).unwrap()
    }

    #[test]
    fn test_behind_history_drops_only_stale_frames() {
        let covered = HashMap::from([(T0, 10)]);
        assert!(behind_history(&frame(T0, 4, 2), &covered));
        assert!(behind_history(&frame(T0, 6, 4), &covered));
        assert!(!behind_history(&frame(T0, 8, 4), &covered));
        // Buckets history never showed always go through.
        assert!(!behind_history(&frame(T0 + 300_000, 1, 0), &covered));
        assert!(!behind_history("not json", &covered));
    }
}
