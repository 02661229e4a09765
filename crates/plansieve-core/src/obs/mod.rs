//! Observability: runtime counters and query tracing.
//!
//! Engine logic never touches counters directly. Instrumentation flows
//! through `MetricsEvent` into a `MetricsSink`, and per-query structure
//! through an optional caller-injected `QueryTraceSink`.

pub(crate) mod metrics;
pub(crate) mod sink;
pub(crate) mod trace;

// re-exports
pub use metrics::{EventOps, EventState, PipelineCounters};
pub use sink::{GlobalMetricsSink, MetricsEvent, MetricsSink, metrics_report, metrics_reset_all};
pub use trace::{QueryTraceEvent, QueryTraceSink};
