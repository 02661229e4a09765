//! Metrics sink boundary.
//!
//! Evaluation and pipeline logic MUST NOT depend on obs::metrics directly.
//! All instrumentation flows through MetricsEvent and MetricsSink.
use crate::obs::metrics::{self, EventState};

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricsEvent<'a> {
    PlanEvaluated { leaves: u64, unfiltered: bool },
    LeafResolved { rows: u64 },
    LeafSkipped,
    ResolverRetry,
    ResolverFailure,
    Timeout,
    MergeFinish { rows: u64 },
    PlanRetry,
    PlanFailure,
    PipelineStart { pipeline: &'a str, nested: bool },
    PipelineFinish { pipeline: &'a str, rows: u64 },
    PipelineError { pipeline: &'a str },
}

///
/// MetricsSink
///

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: MetricsEvent<'_>);
}

///
/// GlobalMetricsSink
/// Default process-local sink that writes into global metrics state.
/// Used whenever the caller does not inject a sink of its own.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent<'_>) {
        metrics::with_state_mut(|m| m.apply(&event));
    }
}

/// Snapshot the process-global counters.
#[must_use]
pub fn metrics_report() -> EventState {
    metrics::with_state(Clone::clone)
}

/// Reset the process-global counters.
pub fn metrics_reset_all() {
    metrics::reset_all();
}
