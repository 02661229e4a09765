use crate::{
    identity::{Identity, IdentitySet},
    obs::{EventState, MetricsEvent, MetricsSink, QueryTraceEvent, QueryTraceSink},
    pipeline::{GeneratorError, PipelineClassifier, PlanGenerator, PlanRequest},
    plan::Plan,
    registry::{ResolveContext, Resolver, ResolverError},
};
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

pub(crate) fn id(text: &str) -> Identity {
    text.parse().expect("test identity should parse")
}

pub(crate) fn set(items: &[&str]) -> IdentitySet {
    items.iter().map(|text| id(text)).collect()
}

///
/// StaticResolver
/// Answers by instruction, falling back to a default set.
///

#[derive(Default)]
pub(crate) struct StaticResolver {
    answers: HashMap<String, IdentitySet>,
    fallback: IdentitySet,
}

impl StaticResolver {
    pub(crate) fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn always(rows: IdentitySet) -> Self {
        Self {
            answers: HashMap::new(),
            fallback: rows,
        }
    }

    pub(crate) fn answer(mut self, instruction: &str, rows: IdentitySet) -> Self {
        self.answers.insert(instruction.to_string(), rows);
        self
    }
}

impl Resolver for StaticResolver {
    fn resolve(&self, instruction: &str, _: &ResolveContext<'_>) -> Result<IdentitySet, ResolverError> {
        Ok(self
            .answers
            .get(instruction)
            .unwrap_or(&self.fallback)
            .clone())
    }
}

///
/// CountingResolver
/// Static rows plus a call counter.
///

pub(crate) struct CountingResolver {
    rows: IdentitySet,
    calls: AtomicU32,
}

impl CountingResolver {
    pub(crate) const fn new(rows: IdentitySet) -> Self {
        Self {
            rows,
            calls: AtomicU32::new(0),
        }
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Resolver for CountingResolver {
    fn resolve(&self, _: &str, _: &ResolveContext<'_>) -> Result<IdentitySet, ResolverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.clone())
    }
}

///
/// FlakyResolver
/// Fails transiently a fixed number of times, then answers.
///

pub(crate) struct FlakyResolver {
    failures: u32,
    rows: IdentitySet,
    calls: AtomicU32,
}

impl FlakyResolver {
    pub(crate) const fn new(failures: u32, rows: IdentitySet) -> Self {
        Self {
            failures,
            rows,
            calls: AtomicU32::new(0),
        }
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Resolver for FlakyResolver {
    fn resolve(&self, _: &str, _: &ResolveContext<'_>) -> Result<IdentitySet, ResolverError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(ResolverError::transient(format!("blip {call}")));
        }

        Ok(self.rows.clone())
    }
}

///
/// SlowResolver
///

pub(crate) struct SlowResolver(pub(crate) Duration);

impl Resolver for SlowResolver {
    fn resolve(&self, _: &str, _: &ResolveContext<'_>) -> Result<IdentitySet, ResolverError> {
        std::thread::sleep(self.0);
        Ok(IdentitySet::new())
    }
}

///
/// LocalMetrics
/// Per-test metrics sink; avoids racing on the global counters.
///

#[derive(Default)]
pub(crate) struct LocalMetrics(Mutex<EventState>);

impl LocalMetrics {
    pub(crate) fn snapshot(&self) -> EventState {
        self.0.lock().expect("metrics lock").clone()
    }
}

impl MetricsSink for LocalMetrics {
    fn record(&self, event: MetricsEvent<'_>) {
        self.0.lock().expect("metrics lock").apply(&event);
    }
}

///
/// RecordingTrace
/// Renders trace events to short strings.
///

#[derive(Default)]
pub(crate) struct RecordingTrace(Mutex<Vec<String>>);

impl RecordingTrace {
    pub(crate) fn events(&self) -> Vec<String> {
        self.0.lock().expect("trace lock").clone()
    }
}

impl QueryTraceSink for RecordingTrace {
    fn on_event(&self, event: QueryTraceEvent<'_>) {
        let line = match event {
            QueryTraceEvent::PlanStart { leaves, depth, .. } => {
                format!("start leaves={leaves} depth={depth}")
            }
            QueryTraceEvent::LeafResolved {
                path,
                rows,
                attempts,
                ..
            } => format!("resolved {path} rows={rows} attempts={attempts}"),
            QueryTraceEvent::LeafSkipped { path, .. } => format!("skipped {path}"),
            QueryTraceEvent::MergeFinish { rows, .. } => format!("merged rows={rows}"),
            QueryTraceEvent::Error { class, origin, .. } => format!("error {origin}:{class}"),
        };

        self.0.lock().expect("trace lock").push(line);
    }
}

///
/// ScriptedGenerator
/// Replays queued outcomes and records what it was asked.
///

#[derive(Default)]
pub(crate) struct ScriptedGenerator {
    outcomes: Mutex<VecDeque<Result<Plan, GeneratorError>>>,
    seen: Mutex<Vec<SeenRequest>>,
}

#[derive(Clone, Debug)]
pub(crate) struct SeenRequest {
    pub(crate) pipeline: String,
    pub(crate) goal: String,
    pub(crate) question: String,
    pub(crate) attempt: u32,
    pub(crate) feedback: Option<String>,
    pub(crate) schema_filters: Vec<String>,
    pub(crate) has_example: bool,
}

impl ScriptedGenerator {
    pub(crate) fn new(outcomes: Vec<Result<Plan, GeneratorError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            seen: Mutex::default(),
        }
    }

    pub(crate) fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().expect("generator lock").clone()
    }
}

impl PlanGenerator for ScriptedGenerator {
    fn generate(&self, request: &PlanRequest<'_>) -> Result<Plan, GeneratorError> {
        self.seen.lock().expect("generator lock").push(SeenRequest {
            pipeline: request.pipeline.to_string(),
            goal: request.goal.to_string(),
            question: request.question.to_string(),
            attempt: request.attempt,
            feedback: request.feedback.map(ToString::to_string),
            schema_filters: request.schema.filter_names().map(ToString::to_string).collect(),
            has_example: request.example.is_some(),
        });

        self.outcomes
            .lock()
            .expect("generator lock")
            .pop_front()
            .unwrap_or_else(|| Err(GeneratorError::failed("script exhausted")))
    }
}

///
/// FixedClassifier
///

pub(crate) struct FixedClassifier(pub(crate) &'static str);

impl PipelineClassifier for FixedClassifier {
    fn classify(&self, _: &str, _: &[&str]) -> Result<String, GeneratorError> {
        Ok(self.0.to_string())
    }
}
