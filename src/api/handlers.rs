//! REST handlers. All of them run behind the session middleware.

use super::{blocking, ApiError, AppState};
use crate::auth::Claims;
use crate::logs::{parse_date_or_today, parse_time_of_day, today, transactions_for_period};
use crate::models::Tick;
use crate::notifications::NotificationRule;
use axum::{
    extract::{Query, State},
    response::Json,
    Extension,
};
use serde::Deserialize;
use serde_json::{json, Value};
use chrono::Utc;
use tracing::{info, warn};

const DEFAULT_QUERY_PERIOD: u32 = 1;
const MAX_QUERY_PERIOD: u32 = 24 * 60;

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    pub ticker: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub period: Option<u32>,
}

/// GET /transactions?ticker=&date=&time=HH:MM&period=
pub async fn get_transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<Vec<Tick>>, ApiError> {
    let ticker = required_ticker(query.ticker.as_deref())?;
    let time = query
        .time
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("time parameter is required (format: HH:MM)"))?;
    let time = parse_time_of_day(time)?;

    let tz = state.config.timezone;
    let date = parse_date_or_today(query.date.as_deref(), today(&tz))?;

    let period = query.period.unwrap_or(DEFAULT_QUERY_PERIOD);
    if period == 0 || period > MAX_QUERY_PERIOD {
        return Err(ApiError::bad_request(format!(
            "period must be between 1 and {}",
            MAX_QUERY_PERIOD
        )));
    }

    let log_dir = state.config.log_dir.clone();
    let ticks = blocking(move || {
        transactions_for_period(&log_dir, &ticker, date, time, period, &tz)
    })
    .await?;
    Ok(Json(ticks))
}

/// GET /notifications
pub async fn get_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Value>, ApiError> {
    let rules = state.rules.clone();
    let user = blocking(move || rules.get_user(&claims.sub)).await?;
    Ok(Json(json!({ "notifications": user.notifications })))
}

/// PUT /notifications: replace the caller's rule for one ticker.
pub async fn put_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(rule): Json<NotificationRule>,
) -> Result<Json<Value>, ApiError> {
    let rule = rule
        .normalized()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let ticker = rule.ticker.clone();

    let rules = state.rules.clone();
    let sub = claims.sub.clone();
    blocking(move || rules.put_rule(&sub, rule)).await?;
    track_ticker(&state, &ticker).await;

    info!(user = %claims.sub, ticker = %ticker, "notification rule updated");
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct RegisterDeviceRequest {
    #[serde(default)]
    pub device_token: String,
}

/// POST /auth/register: attach a push device to the caller.
pub async fn register_device(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<RegisterDeviceRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.device_token.trim().is_empty() {
        return Err(ApiError::bad_request("device_token is required"));
    }

    let devices = state.devices.clone();
    blocking(move || devices.register(&claims.sub, &body.device_token)).await?;
    Ok(Json(json!({ "success": true, "message": "Device registered" })))
}

/// Bootstrap today's stream for `ticker` before anything else reads its log, so
/// the next append is polled as new data. Failures only cost the eager start.
pub(crate) async fn track_ticker(state: &AppState, ticker: &str) {
    let registry = state.registry.clone();
    let owned = ticker.to_string();
    let now_ms = Utc::now().timestamp_millis();
    if let Err(e) = blocking(move || registry.track_today(&owned, now_ms).map(|_| ())).await {
        warn!(ticker = %ticker, error = ?e, "failed to bootstrap ticker");
    }
}

/// Upper-cased, non-blank `ticker` parameter.
pub(crate) fn required_ticker(ticker: Option<&str>) -> Result<String, ApiError> {
    ticker
        .map(|t| t.trim().to_ascii_uppercase())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::bad_request("ticker parameter is required"))
}
