//! Real-time side of the aggregator: per-ticker streams, their registry and the
//! pipeline that drives them from file changes.

pub mod pipeline;
pub mod registry;
pub mod ticker;

pub use pipeline::{ChangeOutcome, Pipeline};
pub use registry::{PendingAlert, SharedTickerState, TickerRegistry, TickerState};
pub use ticker::{StreamSettings, TickerStream};
