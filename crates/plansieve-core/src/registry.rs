use crate::{
    error::{ErrorClass, ErrorOrigin, InternalError},
    evaluate::Deadline,
    identity::IdentitySet,
    pipeline::{PipelineError, PipelineManager},
    plan::{Path, Plan, PlanFingerprint},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, sync::Arc};
use thiserror::Error as ThisError;

///
/// RegistryError
///

#[derive(Debug, ThisError)]
pub enum RegistryError {
    #[error("filter '{0}' already registered")]
    DuplicateFilter(String),

    #[error("filter '{0}' not found")]
    UnknownFilter(String),
}

impl RegistryError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::DuplicateFilter(_) | Self::UnknownFilter(_) => ErrorClass::Configuration,
        }
    }
}

impl From<RegistryError> for InternalError {
    fn from(err: RegistryError) -> Self {
        Self::configuration(ErrorOrigin::Registry, err.to_string())
    }
}

///
/// ResolverError
///
/// Failure of one leaf resolution. A resolver signals "not applicable" by
/// failing, never by returning a sentinel set.
///

#[derive(Debug, ThisError)]
pub enum ResolverError {
    #[error("{0}")]
    Failed(String),

    /// Worth retrying (network blip, lock timeout).
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("not applicable: {0}")]
    NotApplicable(String),

    #[error("nested pipeline run failed: {0}")]
    Nested(Box<PipelineError>),
}

impl ResolverError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn not_applicable(message: impl Into<String>) -> Self {
        Self::NotApplicable(message.into())
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Classification, looking through nested pipeline failures so a
    /// configuration error three pipelines deep is still reported as one.
    pub(crate) fn class(&self) -> ErrorClass {
        match self {
            Self::Nested(inner) => inner.class(),
            Self::Failed(_) | Self::Transient(_) | Self::NotApplicable(_) => ErrorClass::Resolver,
        }
    }
}

impl From<PipelineError> for ResolverError {
    fn from(err: PipelineError) -> Self {
        Self::Nested(Box::new(err))
    }
}

///
/// FilterDescriptor
///
/// Name and prompt-facing description of one filter.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct FilterDescriptor {
    pub name: String,
    pub description: String,
}

impl FilterDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

///
/// RunScope
///
/// Pipeline-manager context a resolver may re-enter through.
///

#[derive(Clone, Copy)]
pub(crate) struct RunScope<'a> {
    pub(crate) manager: &'a PipelineManager,
    pub(crate) depth: u32,
    pub(crate) deadline: Deadline,
}

///
/// ResolveContext
///
/// Everything a resolver is told besides its instruction. The path is for
/// tracing only; the whole plan and the manager let a resolver derive a
/// new question and run a different pipeline before answering.
///

pub struct ResolveContext<'a> {
    path: &'a Path,
    plan: &'a Plan,
    fingerprint: PlanFingerprint,
    attempt: u32,
    scope: Option<RunScope<'a>>,
}

impl<'a> ResolveContext<'a> {
    pub(crate) const fn new(
        path: &'a Path,
        plan: &'a Plan,
        fingerprint: PlanFingerprint,
        attempt: u32,
        scope: Option<RunScope<'a>>,
    ) -> Self {
        Self {
            path,
            plan,
            fingerprint,
            attempt,
            scope,
        }
    }

    #[must_use]
    pub const fn path(&self) -> &Path {
        self.path
    }

    #[must_use]
    pub const fn plan(&self) -> &Plan {
        self.plan
    }

    #[must_use]
    pub const fn fingerprint(&self) -> PlanFingerprint {
        self.fingerprint
    }

    /// Zero on the first call, incremented on each retry.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Nesting depth of the pipeline run this leaf belongs to.
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.scope.map_or(0, |scope| scope.depth)
    }

    #[must_use]
    pub fn manager(&self) -> Option<&'a PipelineManager> {
        self.scope.map(|scope| scope.manager)
    }

    /// Run another registered pipeline and return its merged result. The
    /// nested run shares this query's deadline.
    pub fn run_pipeline(&self, name: &str, question: &str) -> Result<IdentitySet, ResolverError> {
        let Some(scope) = self.scope else {
            return Err(ResolverError::not_applicable(format!(
                "cannot run pipeline '{name}': no pipeline manager in scope"
            )));
        };

        scope
            .manager
            .run_nested(name, question, scope.depth.saturating_add(1), scope.deadline)
            .map_err(ResolverError::from)
    }
}

///
/// Resolver
///
/// Turns one leaf instruction into a set of identities. May block on I/O,
/// may re-enter the pipeline manager; the evaluator assumes neither
/// purity nor non-reentrancy.
///

pub trait Resolver: Send + Sync {
    fn resolve(
        &self,
        instruction: &str,
        ctx: &ResolveContext<'_>,
    ) -> Result<IdentitySet, ResolverError>;
}

///
/// FnResolver
/// Adapter for closure resolvers.
///

pub struct FnResolver<F>(F);

impl<F> Resolver for FnResolver<F>
where
    F: Fn(&str, &ResolveContext<'_>) -> Result<IdentitySet, ResolverError> + Send + Sync,
{
    fn resolve(
        &self,
        instruction: &str,
        ctx: &ResolveContext<'_>,
    ) -> Result<IdentitySet, ResolverError> {
        (self.0)(instruction, ctx)
    }
}

/// Wrap a closure as a [`Resolver`].
pub const fn resolver_fn<F>(f: F) -> FnResolver<F>
where
    F: Fn(&str, &ResolveContext<'_>) -> Result<IdentitySet, ResolverError> + Send + Sync,
{
    FnResolver(f)
}

///
/// FilterRegistry
///
/// Ordered `name -> resolver` mapping for one entity universe. Built fresh
/// per request from the current universe and backing-store handles.
///

#[derive(Clone, Default)]
pub struct FilterRegistry {
    entries: Vec<RegistryEntry>,
    index: HashMap<String, usize>,
}

#[derive(Clone)]
struct RegistryEntry {
    descriptor: FilterDescriptor,
    resolver: Arc<dyn Resolver>,
}

impl FilterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resolver under `descriptor.name`.
    pub fn register(
        &mut self,
        descriptor: FilterDescriptor,
        resolver: impl Resolver + 'static,
    ) -> Result<(), RegistryError> {
        self.register_shared(descriptor, Arc::new(resolver))
    }

    /// Register a resolver that may also be registered elsewhere.
    pub fn register_shared(
        &mut self,
        descriptor: FilterDescriptor,
        resolver: Arc<dyn Resolver>,
    ) -> Result<(), RegistryError> {
        if self.index.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateFilter(descriptor.name));
        }

        self.index
            .insert(descriptor.name.clone(), self.entries.len());
        self.entries.push(RegistryEntry {
            descriptor,
            resolver,
        });

        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        resolver: impl Resolver + 'static,
    ) -> Result<Self, RegistryError> {
        self.register(FilterDescriptor::new(name, description), resolver)?;

        Ok(self)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn Resolver> {
        self.index
            .get(name)
            .map(|&i| self.entries[i].resolver.as_ref())
    }

    pub fn try_get(&self, name: &str) -> Result<&dyn Resolver, RegistryError> {
        self.get(name)
            .ok_or_else(|| RegistryError::UnknownFilter(name.to_string()))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Descriptors in registration order.
    #[must_use]
    pub fn descriptors(&self) -> Vec<FilterDescriptor> {
        self.entries.iter().map(|e| e.descriptor.clone()).collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.descriptor.name.as_str())
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
