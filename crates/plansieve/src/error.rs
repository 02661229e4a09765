use derive_more::Display;
use plansieve_core::{
    config::ConfigError,
    error::{ErrorClass, ErrorOrigin as CoreErrorOrigin, InternalError},
    evaluate::EvaluateError,
    merge::MergeError,
    pipeline::PipelineError,
    plan::PlanError,
    registry::RegistryError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

///
/// Error
/// Public error type with a stable kind + origin taxonomy.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
        }
    }

    /// Whether the caller can fix this by changing its registries,
    /// pipeline names or configuration.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self.kind, ErrorKind::Configuration)
    }
}

impl From<InternalError> for Error {
    fn from(err: InternalError) -> Self {
        Self::new(err.class.into(), err.origin.into(), err.message)
    }
}

// Area errors classify themselves on the way to `InternalError`.
macro_rules! from_area_error {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Error {
                fn from(err: $ty) -> Self {
                    InternalError::from(err).into()
                }
            }
        )*
    };
}

from_area_error!(
    ConfigError,
    EvaluateError,
    MergeError,
    PipelineError,
    PlanError,
    RegistryError,
);

///
/// ErrorKind
/// Public error taxonomy for callers.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
#[remain::sorted]
pub enum ErrorKind {
    /// Duplicate or unknown filter/pipeline names, invalid settings.
    Configuration,

    /// The caller cannot remediate this.
    Internal,

    /// The plan generator gave up.
    PlanGeneration,

    /// A resolver failed permanently or ran out of retries.
    Resolver,

    /// The query deadline elapsed.
    Timeout,

    /// Plan uses an operator or node shape the engine does not support.
    UnsupportedPlanShape,
}

impl From<ErrorClass> for ErrorKind {
    fn from(class: ErrorClass) -> Self {
        match class {
            ErrorClass::Configuration => Self::Configuration,
            ErrorClass::PlanGeneration => Self::PlanGeneration,
            ErrorClass::Resolver => Self::Resolver,
            ErrorClass::Timeout => Self::Timeout,
            ErrorClass::UnsupportedPlanShape => Self::UnsupportedPlanShape,
            ErrorClass::Internal | ErrorClass::InvariantViolation => Self::Internal,
        }
    }
}

///
/// ErrorOrigin
/// Public origin taxonomy for callers.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ErrorOrigin {
    Config,
    Evaluate,
    Merge,
    Pipeline,
    Plan,
    Registry,
}

impl From<CoreErrorOrigin> for ErrorOrigin {
    fn from(origin: CoreErrorOrigin) -> Self {
        match origin {
            CoreErrorOrigin::Config => Self::Config,
            CoreErrorOrigin::Evaluate => Self::Evaluate,
            CoreErrorOrigin::Merge => Self::Merge,
            CoreErrorOrigin::Pipeline => Self::Pipeline,
            CoreErrorOrigin::Plan => Self::Plan,
            CoreErrorOrigin::Registry => Self::Registry,
        }
    }
}
