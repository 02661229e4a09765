//! Plan evaluation.
//!
//! Walks a plan once, resolves every leaf through the filter registry and
//! records each result under the leaf's tree position. Leaves are
//! independent of each other, so they are resolved on the worker pool and
//! the store is assembled afterwards from `(path, rows)` pairs.

mod store;

#[cfg(test)]
mod tests;

pub use store::{ResultStore, StoreNode};

use crate::{
    config::{EngineConfig, MissingFilterPolicy},
    error::{ErrorClass, ErrorOrigin, InternalError},
    identity::IdentitySet,
    obs::{GlobalMetricsSink, MetricsEvent, MetricsSink, QueryTraceSink, trace::TraceScope},
    plan::{
        Leaf, Node, Path, PathTrail, Plan, PlanFingerprint, Segment, Side, sibling_segments,
    },
    registry::{FilterRegistry, RegistryError, ResolveContext, ResolverError, RunScope},
};
use rayon::{ThreadPool, prelude::*};
use std::time::{Duration, Instant};
use thiserror::Error as ThisError;

static GLOBAL_METRICS: GlobalMetricsSink = GlobalMetricsSink;

///
/// EvaluateError
///

#[derive(Debug, ThisError)]
pub enum EvaluateError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("filter '{filter}' failed at '{path}' after {attempts} attempt(s): {source}")]
    Resolver {
        filter: String,
        path: String,
        attempts: u32,
        source: ResolverError,
    },

    #[error("query deadline exceeded after {elapsed_ms}ms (limit {limit_ms}ms)")]
    Timeout { elapsed_ms: u64, limit_ms: u64 },

    #[error("result store path '{path}' written twice")]
    PathCollision { path: String },
}

impl EvaluateError {
    pub(crate) fn class(&self) -> ErrorClass {
        match self {
            Self::Registry(err) => err.class(),
            Self::Resolver { source, .. } => source.class(),
            Self::Timeout { .. } => ErrorClass::Timeout,
            Self::PathCollision { .. } => ErrorClass::InvariantViolation,
        }
    }
}

impl From<EvaluateError> for InternalError {
    fn from(err: EvaluateError) -> Self {
        Self::new(err.class(), ErrorOrigin::Evaluate, err.to_string())
    }
}

///
/// Deadline
///
/// Whole-query time limit. Copied into nested pipeline runs so they
/// spend from the same budget.
///
/// The limit is cooperative: it is checked before and after every
/// resolver call, never during one. A resolver that is already running
/// is not cancelled, and a pooled evaluation reports the timeout only
/// after its in-flight calls return. Resolvers that may block should
/// bound their own I/O.
///

#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    started: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    #[must_use]
    pub fn new(limit: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.limit.is_some_and(|limit| self.elapsed() >= limit)
    }

    pub fn check(&self) -> Result<(), EvaluateError> {
        match self.limit {
            Some(limit) if self.elapsed() >= limit => Err(EvaluateError::Timeout {
                elapsed_ms: duration_ms(self.elapsed()),
                limit_ms: duration_ms(limit),
            }),
            _ => Ok(()),
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

///
/// LeafTask
///

struct LeafTask<'p> {
    path: Path,
    leaf: &'p Leaf,
}

///
/// Evaluator
///
/// Borrowed view over everything one evaluation needs. Cheap to build;
/// one per plan.
///

pub struct Evaluator<'a> {
    registry: &'a FilterRegistry,
    config: &'a EngineConfig,
    pool: Option<&'a ThreadPool>,
    metrics: &'a dyn MetricsSink,
    trace: Option<&'a dyn QueryTraceSink>,
    deadline: Deadline,
    scope: Option<RunScope<'a>>,
}

impl<'a> Evaluator<'a> {
    /// Inline evaluator reporting to the global metrics sink, with the
    /// config's query timeout starting now.
    #[must_use]
    pub fn new(registry: &'a FilterRegistry, config: &'a EngineConfig) -> Self {
        Self {
            registry,
            config,
            pool: None,
            metrics: &GLOBAL_METRICS,
            trace: None,
            deadline: Deadline::new(config.query_timeout()),
            scope: None,
        }
    }

    #[must_use]
    pub const fn with_pool(mut self, pool: Option<&'a ThreadPool>) -> Self {
        self.pool = pool;
        self
    }

    #[must_use]
    pub const fn with_metrics(mut self, metrics: &'a dyn MetricsSink) -> Self {
        self.metrics = metrics;
        self
    }

    #[must_use]
    pub const fn with_trace(mut self, trace: Option<&'a dyn QueryTraceSink>) -> Self {
        self.trace = trace;
        self
    }

    #[must_use]
    pub const fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    #[must_use]
    pub(crate) const fn with_scope(mut self, scope: RunScope<'a>) -> Self {
        self.deadline = scope.deadline;
        self.scope = Some(scope);
        self
    }

    /// Evaluate the whole plan. An unfiltered plan yields an empty store.
    pub fn evaluate(&self, plan: &Plan) -> Result<ResultStore, EvaluateError> {
        match plan.root() {
            None => {
                self.metrics.record(MetricsEvent::PlanEvaluated {
                    leaves: 0,
                    unfiltered: true,
                });
                Ok(ResultStore::new())
            }
            Some(root) => self.evaluate_node(plan, root, &Path::root()),
        }
    }

    /// Evaluate `node` (a subtree of `plan`) with its results stored below
    /// `base`.
    pub fn evaluate_node(
        &self,
        plan: &Plan,
        node: &Node,
        base: &Path,
    ) -> Result<ResultStore, EvaluateError> {
        let fingerprint = plan.fingerprint();
        let trace = TraceScope::new(self.trace, fingerprint);

        let result = self.run(plan, node, base, fingerprint, trace);
        if let Err(err) = &result {
            if matches!(err, EvaluateError::Timeout { .. }) {
                self.metrics.record(MetricsEvent::Timeout);
            }
            trace.error(err.class(), ErrorOrigin::Evaluate);
        }

        result
    }

    fn run(
        &self,
        plan: &Plan,
        node: &Node,
        base: &Path,
        fingerprint: PlanFingerprint,
        trace: TraceScope<'_>,
    ) -> Result<ResultStore, EvaluateError> {
        let tasks = collect_leaves(node, base);
        self.metrics.record(MetricsEvent::PlanEvaluated {
            leaves: tasks.len() as u64,
            unfiltered: false,
        });
        trace.plan_start(
            tasks.len() as u64,
            self.scope.map_or(0, |scope| scope.depth),
        );

        let tasks = self.apply_missing_filter_policy(tasks, trace)?;

        let resolve = |task: &LeafTask<'_>| self.resolve_leaf(plan, fingerprint, trace, task);
        let results: Result<Vec<(Path, IdentitySet)>, EvaluateError> = match self.pool {
            Some(pool) if tasks.len() > 1 => {
                pool.install(|| tasks.par_iter().map(resolve).collect())
            }
            _ => tasks.iter().map(resolve).collect(),
        };

        let mut store = ResultStore::new();
        for (path, rows) in results? {
            store.insert(&path, rows)?;
        }

        Ok(store)
    }

    // Reject checks every leaf before any resolver runs.
    fn apply_missing_filter_policy<'p>(
        &self,
        tasks: Vec<LeafTask<'p>>,
        trace: TraceScope<'_>,
    ) -> Result<Vec<LeafTask<'p>>, EvaluateError> {
        match self.config.missing_filter {
            MissingFilterPolicy::Reject => {
                for task in &tasks {
                    self.registry.try_get(&task.leaf.filter_name)?;
                }

                Ok(tasks)
            }
            MissingFilterPolicy::Skip => Ok(tasks
                .into_iter()
                .filter(|task| {
                    let known = self.registry.contains(&task.leaf.filter_name);
                    if !known {
                        self.metrics.record(MetricsEvent::LeafSkipped);
                        trace.leaf_skipped(&task.path, &task.leaf.filter_name);
                    }

                    known
                })
                .collect()),
        }
    }

    fn resolve_leaf(
        &self,
        plan: &Plan,
        fingerprint: PlanFingerprint,
        trace: TraceScope<'_>,
        task: &LeafTask<'_>,
    ) -> Result<(Path, IdentitySet), EvaluateError> {
        let filter = &task.leaf.filter_name;
        let resolver = self.registry.try_get(filter)?;

        let mut attempt = 0;
        loop {
            self.deadline.check()?;

            let ctx = ResolveContext::new(&task.path, plan, fingerprint, attempt, self.scope);
            let outcome = resolver.resolve(&task.leaf.instruction, &ctx);

            self.deadline.check()?;

            match outcome {
                Ok(rows) => {
                    let count = rows.len() as u64;
                    self.metrics.record(MetricsEvent::LeafResolved { rows: count });
                    trace.leaf_resolved(&task.path, filter, count, attempt + 1);

                    return Ok((task.path.clone(), rows));
                }
                Err(err) if err.is_transient() && attempt < self.config.resolver_retries => {
                    self.metrics.record(MetricsEvent::ResolverRetry);
                    attempt += 1;
                }
                Err(source) => {
                    self.metrics.record(MetricsEvent::ResolverFailure);

                    return Err(EvaluateError::Resolver {
                        filter: filter.clone(),
                        path: task.path.to_string(),
                        attempts: attempt + 1,
                        source,
                    });
                }
            }
        }
    }
}

/// Evaluate `plan` inline with default configuration.
pub fn evaluate(plan: &Plan, registry: &FilterRegistry) -> Result<ResultStore, EvaluateError> {
    let config = EngineConfig::default();

    Evaluator::new(registry, &config).evaluate(plan)
}

// Document-order leaf list. The root contributes its own segment; AND/OR
// children get disambiguated sibling segments; NOT operands go under A/B.
// Full paths are only built for leaves.
fn collect_leaves<'p>(root: &'p Node, base: &Path) -> Vec<LeafTask<'p>> {
    let mut tasks = Vec::new();
    let mut trail = PathTrail::new();
    let mut stack = vec![(root, Segment::new(root.own_kind()), None)];

    while let Some((node, segment, parent)) = stack.pop() {
        let at = trail.push(parent, segment);
        match node {
            Node::Leaf(leaf) => tasks.push(LeafTask {
                path: trail.path(base, at),
                leaf,
            }),
            Node::And(children) | Node::Or(children) => {
                let segments = sibling_segments(children);
                for (child, segment) in children.iter().zip(segments).rev() {
                    stack.push((child, segment, Some(at)));
                }
            }
            Node::Not { a, b } => {
                let side_b = trail.push(Some(at), Segment::operand(Side::B));
                stack.push((b, Segment::new(b.own_kind()), Some(side_b)));
                let side_a = trail.push(Some(at), Segment::operand(Side::A));
                stack.push((a, Segment::new(a.own_kind()), Some(side_a)));
            }
        }
    }

    tasks
}
