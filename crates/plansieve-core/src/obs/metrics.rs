use crate::obs::sink::MetricsEvent;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    sync::{LazyLock, Mutex, PoisonError},
};

///
/// EventState
/// Ephemeral, in-memory counters for plan evaluation and pipeline runs.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub pipelines: BTreeMap<String, PipelineCounters>,
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventOps {
    // Evaluation
    pub plans_evaluated: u64,
    pub plans_unfiltered: u64,
    pub plan_leaves: u64,
    pub leaves_resolved: u64,
    pub leaves_skipped: u64,
    pub rows_resolved: u64,

    // Resolver health
    pub resolver_retries: u64,
    pub resolver_failures: u64,
    pub timeouts: u64,

    // Merge
    pub merges: u64,
    pub rows_merged: u64,

    // Plan generation
    pub plan_retries: u64,
    pub plan_failures: u64,

    // Pipelines
    pub nested_runs: u64,
}

///
/// PipelineCounters
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PipelineCounters {
    pub runs: u64,
    pub nested_runs: u64,
    pub rows_returned: u64,
    pub failures: u64,
}

impl EventState {
    /// Fold one event into the counters.
    pub fn apply(&mut self, event: &MetricsEvent<'_>) {
        let ops = &mut self.ops;

        match *event {
            MetricsEvent::PlanEvaluated { leaves, unfiltered } => {
                ops.plans_evaluated = ops.plans_evaluated.saturating_add(1);
                if unfiltered {
                    ops.plans_unfiltered = ops.plans_unfiltered.saturating_add(1);
                }
                ops.plan_leaves = ops.plan_leaves.saturating_add(leaves);
            }
            MetricsEvent::LeafResolved { rows } => {
                ops.leaves_resolved = ops.leaves_resolved.saturating_add(1);
                ops.rows_resolved = ops.rows_resolved.saturating_add(rows);
            }
            MetricsEvent::LeafSkipped => {
                ops.leaves_skipped = ops.leaves_skipped.saturating_add(1);
            }
            MetricsEvent::ResolverRetry => {
                ops.resolver_retries = ops.resolver_retries.saturating_add(1);
            }
            MetricsEvent::ResolverFailure => {
                ops.resolver_failures = ops.resolver_failures.saturating_add(1);
            }
            MetricsEvent::Timeout => {
                ops.timeouts = ops.timeouts.saturating_add(1);
            }
            MetricsEvent::MergeFinish { rows } => {
                ops.merges = ops.merges.saturating_add(1);
                ops.rows_merged = ops.rows_merged.saturating_add(rows);
            }
            MetricsEvent::PlanRetry => {
                ops.plan_retries = ops.plan_retries.saturating_add(1);
            }
            MetricsEvent::PlanFailure => {
                ops.plan_failures = ops.plan_failures.saturating_add(1);
            }
            MetricsEvent::PipelineStart { pipeline, nested } => {
                let entry = self.pipelines.entry(pipeline.to_string()).or_default();
                entry.runs = entry.runs.saturating_add(1);
                if nested {
                    entry.nested_runs = entry.nested_runs.saturating_add(1);
                    ops.nested_runs = ops.nested_runs.saturating_add(1);
                }
            }
            MetricsEvent::PipelineFinish { pipeline, rows } => {
                let entry = self.pipelines.entry(pipeline.to_string()).or_default();
                entry.rows_returned = entry.rows_returned.saturating_add(rows);
            }
            MetricsEvent::PipelineError { pipeline } => {
                let entry = self.pipelines.entry(pipeline.to_string()).or_default();
                entry.failures = entry.failures.saturating_add(1);
            }
        }
    }
}

static EVENT_STATE: LazyLock<Mutex<EventState>> = LazyLock::new(Mutex::default);

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    let state = EVENT_STATE.lock().unwrap_or_else(PoisonError::into_inner);
    f(&state)
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    let mut state = EVENT_STATE.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut state)
}

/// Reset all counters.
pub(crate) fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}
