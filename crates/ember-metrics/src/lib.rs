//! # ember-metrics
//!
//! Minimal in-process metrics for Emberchain:
//! - Counters for event accounting (dropped votes, rejected proposals, ...)
//! - Gauges for current values (table size, pending height, ...)
//! - JSON snapshot export
//!
//! All sinks are append-only and safe for concurrent emission.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod registry;
mod snapshot;

pub use registry::Metrics;
pub use snapshot::MetricsSnapshot;
