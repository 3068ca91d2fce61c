//! Runtime-wide and per-box counters.

mod box_metrics;
mod runtime_metrics;

pub use box_metrics::BoxMetrics;
pub(crate) use box_metrics::BoxMetricsStorage;
pub use runtime_metrics::RuntimeMetrics;
pub(crate) use runtime_metrics::RuntimeMetricsStorage;
