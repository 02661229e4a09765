use crate::{
    identity::IdentitySet,
    registry::{ResolveContext, Resolver, ResolverError},
};

/// Projection that keeps nested rows unchanged.
pub type Passthrough = fn(IdentitySet, &ResolveContext<'_>) -> Result<IdentitySet, ResolverError>;

///
/// NestedPipelineResolver
///
/// Resolves a leaf by running another registered pipeline with the leaf
/// instruction as its question, then projecting the rows it returns into
/// this pipeline's universe (for example packages back to the components
/// that depend on them).
///

pub struct NestedPipelineResolver<P> {
    pipeline: String,
    project: P,
}

impl<P> NestedPipelineResolver<P>
where
    P: Fn(IdentitySet, &ResolveContext<'_>) -> Result<IdentitySet, ResolverError> + Send + Sync,
{
    pub fn new(pipeline: impl Into<String>, project: P) -> Self {
        Self {
            pipeline: pipeline.into(),
            project,
        }
    }

    #[must_use]
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }
}

impl NestedPipelineResolver<Passthrough> {
    /// Return the nested pipeline's rows as they are.
    pub fn passthrough(pipeline: impl Into<String>) -> Self {
        Self::new(pipeline, keep_rows as Passthrough)
    }
}

fn keep_rows(rows: IdentitySet, _: &ResolveContext<'_>) -> Result<IdentitySet, ResolverError> {
    Ok(rows)
}

impl<P> Resolver for NestedPipelineResolver<P>
where
    P: Fn(IdentitySet, &ResolveContext<'_>) -> Result<IdentitySet, ResolverError> + Send + Sync,
{
    fn resolve(
        &self,
        instruction: &str,
        ctx: &ResolveContext<'_>,
    ) -> Result<IdentitySet, ResolverError> {
        let rows = ctx.run_pipeline(&self.pipeline, instruction)?;

        (self.project)(rows, ctx)
    }
}
