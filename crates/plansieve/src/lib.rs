//! ## Crate layout
//! - `core`: plan model, schema builder, filter registry, evaluator, merge
//!   engine, pipelines and observability.
//! - `error`: public error type with a stable kind + origin taxonomy.
//!
//! The `prelude` module carries the vocabulary needed to register filters,
//! build pipelines and run questions through a `PipelineManager`.

pub use plansieve_core as core;

pub mod error;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use error::{Error, ErrorKind, ErrorOrigin};

///
/// Prelude
///

pub mod prelude {
    pub use crate::core::{
        config::{EngineConfig, MissingFilterPolicy, MissingOperandPolicy},
        prelude::*,
        registry::{ResolverError, resolver_fn},
        pipeline::{FixedPlan, GeneratorError, NestedPipelineResolver, PipelineClassifier},
    };
    pub use crate::{Error, ErrorKind};
}
