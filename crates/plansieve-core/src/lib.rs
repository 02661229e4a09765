//! Core engine for plansieve: plan model, schema builder, filter registry,
//! evaluator, merge engine and pipelines, with the vocabulary exported via
//! the `prelude`.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod config;
pub mod error;
pub mod evaluate;
pub mod identity;
pub mod merge;
pub mod obs;
pub mod pipeline;
pub mod plan;
pub mod registry;
pub mod schema;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, sinks, stores or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        identity::{Identity, IdentitySet},
        pipeline::{Pipeline, PipelineManager, PlanGenerator, PlanRequest},
        plan::{Node, Plan},
        registry::{FilterDescriptor, FilterRegistry, ResolveContext, Resolver},
    };
}
