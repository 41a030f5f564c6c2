//! Option premium flow service.
//!
//! Daily tick logs are aggregated into fixed-width call/put premium buckets,
//! streamed live to WebSocket subscribers and checked against per-user alert
//! thresholds. The binaries are thin wrappers over this library.

pub mod analysis;
pub mod api;
pub mod auth;
pub mod config;
pub mod logs;
pub mod middleware;
pub mod models;
pub mod notifications;
pub mod service;
pub mod stream;
pub mod ws;

pub use config::{Config, ServerArgs};
pub use models::{OptionType, PeriodSummary, Tick, INFINITE_RATIO};
pub use service::Service;
