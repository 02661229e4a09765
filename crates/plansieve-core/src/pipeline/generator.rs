use crate::{
    plan::{Plan, PlanError},
    schema::SchemaDoc,
};
use thiserror::Error as ThisError;

///
/// GeneratorError
///
/// Failure reported by an external plan generator or classifier.
///

#[derive(Debug, ThisError)]
pub enum GeneratorError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Plan(#[from] PlanError),
}

impl GeneratorError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

///
/// PlanRequest
///
/// Inputs for one plan-generation attempt. `feedback` carries the reason
/// the previous attempt was rejected, if any.
///

#[derive(Clone, Copy, Debug)]
pub struct PlanRequest<'a> {
    pub pipeline: &'a str,
    pub goal: &'a str,
    pub question: &'a str,
    pub schema: &'a SchemaDoc,
    pub example: Option<&'a Plan>,
    pub attempt: u32,
    pub feedback: Option<&'a str>,
}

///
/// PlanGenerator
///

pub trait PlanGenerator: Send + Sync {
    fn generate(&self, request: &PlanRequest<'_>) -> Result<Plan, GeneratorError>;
}

impl<F> PlanGenerator for F
where
    F: Fn(&PlanRequest<'_>) -> Result<Plan, GeneratorError> + Send + Sync,
{
    fn generate(&self, request: &PlanRequest<'_>) -> Result<Plan, GeneratorError> {
        self(request)
    }
}

///
/// FixedPlan
/// Generator that always answers with the same plan.
///

#[derive(Clone, Debug)]
pub struct FixedPlan(pub Plan);

impl PlanGenerator for FixedPlan {
    fn generate(&self, _: &PlanRequest<'_>) -> Result<Plan, GeneratorError> {
        Ok(self.0.clone())
    }
}

///
/// PipelineClassifier
///
/// Picks which registered pipeline should answer a question. The answer
/// must be one of `candidates`.
///

pub trait PipelineClassifier: Send + Sync {
    fn classify(&self, question: &str, candidates: &[&str]) -> Result<String, GeneratorError>;
}

impl<F> PipelineClassifier for F
where
    F: Fn(&str, &[&str]) -> Result<String, GeneratorError> + Send + Sync,
{
    fn classify(&self, question: &str, candidates: &[&str]) -> Result<String, GeneratorError> {
        self(question, candidates)
    }
}
