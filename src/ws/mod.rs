//! WebSocket fan-out of bucket summaries.

pub mod handler;
pub mod hub;

pub use handler::analyze_ws;
pub use hub::{ConnId, ConnectionHub};
