//! Observability metrics for the flush pipeline.
//!
//! All metrics use lock-free atomics so the flush path never blocks on
//! reporting.

pub mod histogram;
pub mod registry;

pub use histogram::Histogram;
pub use registry::{FlushMetrics, MetricsRegistry};
