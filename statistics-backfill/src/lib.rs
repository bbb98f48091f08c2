pub mod accumulator;
pub mod config;
pub mod cost;
pub mod observability;
pub mod pipeline;
pub mod sinks;
pub mod sources;
pub mod timezone;
pub mod transform;

pub use pipeline::{BackfillError, BackfillPlan, BackfillReport, Envelope, Pipeline};
