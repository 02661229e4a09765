//! Pipelines and the pipeline manager.
//!
//! A pipeline answers a natural-language question over one entity
//! universe: generate a plan grounded in the pipeline's schema, evaluate
//! it against the pipeline's filter registry, merge the result store. The
//! manager owns named pipelines plus the shared engine resources (config,
//! worker pool, sinks) and is what resolvers re-enter for nested runs.

mod generator;
mod nested;


pub use generator::{FixedPlan, GeneratorError, PipelineClassifier, PlanGenerator, PlanRequest};
pub use nested::{NestedPipelineResolver, Passthrough};

use crate::{
    config::{ConfigError, EngineConfig},
    error::{ErrorClass, ErrorOrigin, InternalError},
    evaluate::{Deadline, EvaluateError, Evaluator},
    identity::IdentitySet,
    merge::{MergeError, merge_with},
    obs::{GlobalMetricsSink, MetricsEvent, MetricsSink, QueryTraceSink, trace::TraceScope},
    plan::{Plan, PlanError},
    registry::{FilterRegistry, RunScope},
    schema::{SchemaDoc, build_schema},
};
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, sync::Arc};
use thiserror::Error as ThisError;

const UNNAMED: &str = "unnamed";

///
/// PipelineError
///

#[derive(Debug, ThisError)]
pub enum PipelineError {
    #[error("pipeline '{0}' already registered")]
    DuplicatePipeline(String),

    #[error("pipeline '{0}' not found")]
    UnknownPipeline(String),

    #[error("classifier chose '{answer}', which is not one of: {candidates}")]
    UnknownSelection { answer: String, candidates: String },

    #[error("no pipeline classifier configured")]
    NoClassifier,

    #[error("pipeline selection failed: {0}")]
    Selection(GeneratorError),

    #[error("nested run of pipeline '{pipeline}' at depth {depth} exceeds limit {limit}")]
    NestingTooDeep {
        pipeline: String,
        depth: u32,
        limit: u32,
    },

    #[error("plan generation for pipeline '{pipeline}' failed after {attempts} attempt(s): {message}")]
    PlanGeneration {
        pipeline: String,
        attempts: u32,
        message: String,
    },

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Evaluate(#[from] EvaluateError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PipelineError {
    pub(crate) fn class(&self) -> ErrorClass {
        match self {
            Self::DuplicatePipeline(_)
            | Self::UnknownPipeline(_)
            | Self::UnknownSelection { .. }
            | Self::NoClassifier
            | Self::NestingTooDeep { .. } => ErrorClass::Configuration,
            Self::Selection(_) | Self::PlanGeneration { .. } => ErrorClass::PlanGeneration,
            Self::Plan(err) => err.class(),
            Self::Evaluate(err) => err.class(),
            Self::Merge(err) => err.class(),
            Self::Config(err) => err.class(),
        }
    }

    pub(crate) const fn origin(&self) -> ErrorOrigin {
        match self {
            Self::Plan(_) => ErrorOrigin::Plan,
            Self::Evaluate(_) => ErrorOrigin::Evaluate,
            Self::Merge(_) => ErrorOrigin::Merge,
            Self::Config(_) => ErrorOrigin::Config,
            _ => ErrorOrigin::Pipeline,
        }
    }
}

impl From<PipelineError> for InternalError {
    fn from(err: PipelineError) -> Self {
        Self::new(err.class(), err.origin(), err.to_string())
    }
}

///
/// RunEnv
///
/// Engine resources one pipeline run borrows.
///

#[derive(Clone, Copy)]
struct RunEnv<'a> {
    config: &'a EngineConfig,
    pool: Option<&'a ThreadPool>,
    metrics: &'a dyn MetricsSink,
    trace: Option<&'a dyn QueryTraceSink>,
    deadline: Deadline,
    scope: Option<RunScope<'a>>,
}

impl RunEnv<'_> {
    fn depth(&self) -> u32 {
        self.scope.map_or(0, |scope| scope.depth)
    }
}

///
/// Pipeline
///
/// Registry, universe, goal and plan generator for one kind of entity.
/// The schema is derived from the registry once, at construction.
///

pub struct Pipeline {
    name: String,
    goal: String,
    registry: FilterRegistry,
    universe: IdentitySet,
    generator: Arc<dyn PlanGenerator>,
    example: Option<Plan>,
    schema: SchemaDoc,
}

impl Pipeline {
    pub fn new(
        goal: impl Into<String>,
        registry: FilterRegistry,
        universe: IdentitySet,
        generator: impl PlanGenerator + 'static,
    ) -> Self {
        Self::with_shared_generator(goal, registry, universe, Arc::new(generator))
    }

    pub fn with_shared_generator(
        goal: impl Into<String>,
        registry: FilterRegistry,
        universe: IdentitySet,
        generator: Arc<dyn PlanGenerator>,
    ) -> Self {
        let schema = build_schema(&registry.descriptors());

        Self {
            name: UNNAMED.to_string(),
            goal: goal.into(),
            registry,
            universe,
            generator,
            example: None,
            schema,
        }
    }

    /// Attach a worked example plan handed to the generator.
    #[must_use]
    pub fn with_example(mut self, example: Plan) -> Self {
        self.example = Some(example);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn goal(&self) -> &str {
        &self.goal
    }

    #[must_use]
    pub const fn registry(&self) -> &FilterRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn universe(&self) -> &IdentitySet {
        &self.universe
    }

    #[must_use]
    pub const fn schema(&self) -> &SchemaDoc {
        &self.schema
    }

    #[must_use]
    pub const fn example(&self) -> Option<&Plan> {
        self.example.as_ref()
    }

    /// Answer `question` outside any manager: default config, inline
    /// resolution, global metrics. Resolvers cannot start nested runs.
    pub fn run(&self, question: &str) -> Result<IdentitySet, PipelineError> {
        let config = EngineConfig::default();

        self.run_with(question, &standalone_env(&config))
    }

    /// Evaluate and merge an already generated plan outside any manager.
    pub fn execute(&self, plan: &Plan) -> Result<IdentitySet, PipelineError> {
        let config = EngineConfig::default();

        self.execute_with(plan, &standalone_env(&config))
    }

    fn run_with(&self, question: &str, env: &RunEnv<'_>) -> Result<IdentitySet, PipelineError> {
        env.metrics.record(MetricsEvent::PipelineStart {
            pipeline: &self.name,
            nested: env.depth() > 0,
        });

        let result = self
            .generate_plan(question, env)
            .and_then(|plan| self.execute_with(&plan, env));

        match &result {
            Ok(rows) => env.metrics.record(MetricsEvent::PipelineFinish {
                pipeline: &self.name,
                rows: rows.len() as u64,
            }),
            Err(_) => env.metrics.record(MetricsEvent::PipelineError {
                pipeline: &self.name,
            }),
        }

        result
    }

    // Up to `plan_retries + 1` attempts; each retry is told why the
    // previous plan was rejected. Generated plans may only name filters
    // from this pipeline's schema.
    fn generate_plan(&self, question: &str, env: &RunEnv<'_>) -> Result<Plan, PipelineError> {
        let attempts = env.config.plan_retries.saturating_add(1);
        let mut last: Option<PipelineError> = None;

        for attempt in 0..attempts {
            env.deadline.check()?;
            if attempt > 0 {
                env.metrics.record(MetricsEvent::PlanRetry);
            }

            let feedback = last.as_ref().map(ToString::to_string);
            let request = PlanRequest {
                pipeline: &self.name,
                goal: &self.goal,
                question,
                schema: &self.schema,
                example: self.example.as_ref(),
                attempt,
                feedback: feedback.as_deref(),
            };

            let err = match self.generator.generate(&request) {
                Ok(plan) => match plan.check_filters(|name| self.schema.contains_filter(name)) {
                    Ok(()) => return Ok(plan),
                    Err(err) => PipelineError::Plan(err),
                },
                Err(GeneratorError::Plan(err)) => PipelineError::Plan(err),
                Err(GeneratorError::Failed(message)) => PipelineError::PlanGeneration {
                    pipeline: self.name.clone(),
                    attempts: attempt + 1,
                    message,
                },
            };
            last = Some(err);
        }

        env.metrics.record(MetricsEvent::PlanFailure);

        Err(last.unwrap_or_else(|| PipelineError::PlanGeneration {
            pipeline: self.name.clone(),
            attempts,
            message: "no attempt made".to_string(),
        }))
    }

    fn execute_with(&self, plan: &Plan, env: &RunEnv<'_>) -> Result<IdentitySet, PipelineError> {
        let trace = TraceScope::new(env.trace, plan.fingerprint());

        if plan.is_unfiltered() {
            env.metrics.record(MetricsEvent::PlanEvaluated {
                leaves: 0,
                unfiltered: true,
            });
            trace.merge_finish(self.universe.len() as u64);

            return Ok(self.universe.clone());
        }

        let mut evaluator = Evaluator::new(&self.registry, env.config)
            .with_pool(env.pool)
            .with_metrics(env.metrics)
            .with_trace(env.trace)
            .with_deadline(env.deadline);
        if let Some(scope) = env.scope {
            evaluator = evaluator.with_scope(scope);
        }

        let store = evaluator.evaluate(plan)?;
        let rows = merge_with(&store, env.config.missing_operand).inspect_err(|err| {
            trace.error(err.class(), ErrorOrigin::Merge);
        })?;

        let count = rows.len() as u64;
        env.metrics.record(MetricsEvent::MergeFinish { rows: count });
        trace.merge_finish(count);

        Ok(rows)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("goal", &self.goal)
            .field("registry", &self.registry)
            .field("universe", &self.universe.len())
            .finish_non_exhaustive()
    }
}

static GLOBAL_METRICS: GlobalMetricsSink = GlobalMetricsSink;

fn standalone_env(config: &EngineConfig) -> RunEnv<'_> {
    RunEnv {
        config,
        pool: None,
        metrics: &GLOBAL_METRICS,
        trace: None,
        deadline: Deadline::new(config.query_timeout()),
        scope: None,
    }
}

///
/// Answer
/// Selected pipeline and its merged result.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Answer {
    pub pipeline: String,
    pub identities: IdentitySet,
}

///
/// PipelineManager
///
/// Named pipelines in registration order plus the engine resources every
/// run shares. Resolvers reach it through `ResolveContext` to start nested
/// runs of other pipelines.
///

pub struct PipelineManager {
    pipelines: Vec<Pipeline>,
    index: HashMap<String, usize>,
    config: EngineConfig,
    pool: Option<ThreadPool>,
    classifier: Option<Arc<dyn PipelineClassifier>>,
    metrics: Arc<dyn MetricsSink>,
    trace: Option<Arc<dyn QueryTraceSink>>,
}

impl PipelineManager {
    /// Validate `config` and build the shared worker pool.
    pub fn new(config: EngineConfig) -> Result<Self, PipelineError> {
        let pool = config.build_pool()?;

        Ok(Self {
            pipelines: Vec::new(),
            index: HashMap::new(),
            config,
            pool,
            classifier: None,
            metrics: Arc::new(GlobalMetricsSink),
            trace: None,
        })
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: impl PipelineClassifier + 'static) -> Self {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    #[must_use]
    pub fn with_trace(mut self, trace: Arc<dyn QueryTraceSink>) -> Self {
        self.trace = Some(trace);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn add_pipeline(
        &mut self,
        name: impl Into<String>,
        mut pipeline: Pipeline,
    ) -> Result<(), PipelineError> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(PipelineError::DuplicatePipeline(name));
        }

        pipeline.name.clone_from(&name);
        self.index.insert(name, self.pipelines.len());
        self.pipelines.push(pipeline);

        Ok(())
    }

    pub fn get_pipeline(&self, name: &str) -> Result<&Pipeline, PipelineError> {
        self.index
            .get(name)
            .map(|&i| &self.pipelines[i])
            .ok_or_else(|| PipelineError::UnknownPipeline(name.to_string()))
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.pipelines.iter().map(Pipeline::name)
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.pipelines.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Generate, evaluate and merge a plan for `question` on one pipeline.
    pub fn run_pipeline(&self, name: &str, question: &str) -> Result<IdentitySet, PipelineError> {
        self.run_nested(name, question, 0, Deadline::new(self.config.query_timeout()))
    }

    /// Evaluate and merge a given plan on one pipeline with this
    /// manager's resources.
    pub fn execute(&self, name: &str, plan: &Plan) -> Result<IdentitySet, PipelineError> {
        let pipeline = self.get_pipeline(name)?;
        let deadline = Deadline::new(self.config.query_timeout());
        let env = self.env(0, deadline);

        pipeline.execute_with(plan, &env)
    }

    /// Ask the classifier which pipeline should answer `question`.
    pub fn select_pipeline(&self, question: &str) -> Result<&Pipeline, PipelineError> {
        let classifier = self.classifier.as_ref().ok_or(PipelineError::NoClassifier)?;
        let candidates: Vec<&str> = self.names().collect();

        let answer = classifier
            .classify(question, &candidates)
            .map_err(PipelineError::Selection)?;
        let answer = answer.trim();

        self.get_pipeline(answer)
            .map_err(|_| PipelineError::UnknownSelection {
                answer: answer.to_string(),
                candidates: candidates.join(", "),
            })
    }

    /// Select a pipeline for `question`, then run it.
    pub fn answer(&self, question: &str) -> Result<Answer, PipelineError> {
        let pipeline = self.select_pipeline(question)?;
        let identities = self.run_pipeline(pipeline.name(), question)?;

        Ok(Answer {
            pipeline: pipeline.name().to_string(),
            identities,
        })
    }

    pub(crate) fn run_nested(
        &self,
        name: &str,
        question: &str,
        depth: u32,
        deadline: Deadline,
    ) -> Result<IdentitySet, PipelineError> {
        if depth > self.config.max_nesting_depth {
            return Err(PipelineError::NestingTooDeep {
                pipeline: name.to_string(),
                depth,
                limit: self.config.max_nesting_depth,
            });
        }

        let pipeline = self.get_pipeline(name)?;
        let env = self.env(depth, deadline);

        pipeline.run_with(question, &env)
    }

    fn env(&self, depth: u32, deadline: Deadline) -> RunEnv<'_> {
        RunEnv {
            config: &self.config,
            pool: self.pool.as_ref(),
            metrics: self.metrics.as_ref(),
            trace: self.trace.as_deref(),
            deadline,
            scope: Some(RunScope {
                manager: self,
                depth,
                deadline,
            }),
        }
    }
}

impl fmt::Debug for PipelineManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineManager")
            .field("pipelines", &self.pipelines)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
