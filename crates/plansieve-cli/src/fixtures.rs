//! Fixture-backed filter registries for offline plan evaluation.
//!
//! ```json
//! {
//!   "universe": ["cc-utils:1.0", "gardener:10.4.1"],
//!   "filters": {
//!     "id": {
//!       "description": "Filter by component name.",
//!       "answers": { "gardener": ["gardener:10.4.1"] }
//!     }
//!   }
//! }
//! ```

use crate::CliError;
use plansieve::core::{
    identity::{Identity, IdentitySet},
    registry::{FilterRegistry, ResolveContext, Resolver, ResolverError},
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

///
/// Fixtures
///

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Fixtures {
    #[serde(default)]
    universe: Vec<String>,
    #[serde(default)]
    filters: BTreeMap<String, FixtureFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FixtureFilter {
    #[serde(default)]
    description: String,
    #[serde(default)]
    answers: HashMap<String, Vec<String>>,
}

impl Fixtures {
    pub(crate) fn from_json(json: &str) -> Result<Self, CliError> {
        Ok(serde_json::from_str(json)?)
    }

    pub(crate) fn universe(&self) -> Result<IdentitySet, CliError> {
        parse_identities(&self.universe)
    }

    /// One fixture resolver per filter, in name order.
    pub(crate) fn registry(&self) -> Result<FilterRegistry, CliError> {
        let mut registry = FilterRegistry::new();
        for (name, filter) in &self.filters {
            let answers = filter
                .answers
                .iter()
                .map(|(instruction, rows)| Ok((instruction.clone(), parse_identities(rows)?)))
                .collect::<Result<HashMap<_, _>, CliError>>()?;

            registry = registry
                .with(name.as_str(), filter.description.as_str(), FixtureResolver { answers })
                .map_err(plansieve::Error::from)?;
        }

        Ok(registry)
    }
}

fn parse_identities(items: &[String]) -> Result<IdentitySet, CliError> {
    items
        .iter()
        .map(|text| text.parse::<Identity>().map_err(CliError::from))
        .collect()
}

///
/// FixtureResolver
/// Looks the trimmed instruction up in a fixed answer table.
///

struct FixtureResolver {
    answers: HashMap<String, IdentitySet>,
}

impl Resolver for FixtureResolver {
    fn resolve(
        &self,
        instruction: &str,
        _: &ResolveContext<'_>,
    ) -> Result<IdentitySet, ResolverError> {
        self.answers
            .get(instruction.trim())
            .cloned()
            .ok_or_else(|| {
                ResolverError::not_applicable(format!("no fixture answer for '{instruction}'"))
            })
    }
}
