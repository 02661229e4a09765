use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, str::FromStr};
use thiserror::Error as ThisError;

///
/// IdentitySet
///
/// Ordered set of identities. Ordering keeps merged output and trace
/// payloads deterministic across runs.
///

pub type IdentitySet = BTreeSet<Identity>;

///
/// Identity
///
/// Immutable, value-equal key for one catalog entity (component, package,
/// resource). Fields are private so an identity never changes after it
/// has been built.
///
/// Text form is `name:version`, or just `name` when unversioned. Parsing
/// splits on the last `:` so names containing colons are not supported.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Identity {
    name: String,
    version: Option<String>,
}

impl Identity {
    #[must_use]
    pub fn new(name: impl Into<String>, version: Option<String>) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// Identity without a version.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, None)
    }

    #[must_use]
    pub fn versioned(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::new(name, Some(version.into()))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Returns `true` if `self` is named `name` and, when `version` is
    /// given, carries exactly that version.
    #[must_use]
    pub fn matches(&self, name: &str, version: Option<&str>) -> bool {
        self.name == name && version.is_none_or(|v| self.version.as_deref() == Some(v))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}:{version}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

///
/// IdentityParseError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum IdentityParseError {
    #[error("identity has an empty name: '{0}'")]
    EmptyName(String),

    #[error("identity has an empty version: '{0}'")]
    EmptyVersion(String),
}

impl FromStr for Identity {
    type Err = IdentityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let (name, version) = match s.rsplit_once(':') {
            Some((name, version)) => {
                if version.is_empty() {
                    return Err(IdentityParseError::EmptyVersion(s.to_string()));
                }
                (name, Some(version.to_string()))
            }
            None => (s, None),
        };

        if name.is_empty() {
            return Err(IdentityParseError::EmptyName(s.to_string()));
        }

        Ok(Self::new(name, version))
    }
}
