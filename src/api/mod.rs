//! HTTP surface: shared state, router and REST handlers.

pub mod error;
pub mod handlers;

pub use error::ApiError;

use crate::auth::{auth_middleware, JwtHandler};
use crate::config::Config;
use crate::middleware::request_logging;
use crate::notifications::{DeviceStore, RuleStore};
use crate::stream::{StreamSettings, TickerRegistry};
use crate::ws::{analyze_ws, ConnectionHub};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: Arc<ConnectionHub>,
    pub registry: Arc<TickerRegistry>,
    pub rules: Arc<RuleStore>,
    pub devices: Arc<DeviceStore>,
    pub jwt: Arc<JwtHandler>,
}

pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/analyze", get(analyze_ws))
        .route("/transactions", get(handlers::get_transactions))
        .route(
            "/notifications",
            get(handlers::get_notifications).put(handlers::put_notifications),
        )
        .route("/auth/register", post(handlers::register_device))
        .route_layer(middleware::from_fn_with_state(
            state.jwt.clone(),
            auth_middleware,
        ))
        .with_state(state);

    let public_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health_check() -> &'static str {
    "OK"
}

/// Run blocking file work off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("blocking task failed: {}", e)))?
        .map_err(ApiError::Internal)
}
