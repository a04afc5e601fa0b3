pub mod config;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod reconcile;
pub mod sinks;
pub mod sources;

pub use pipeline::{Envelope, Pipeline};
