//! Target resolution
//!
//! Produces the hosts a sweep will probe, either from an explicit list or by
//! handing a [`DirectoryQuery`] to an external [`TargetResolver`].

pub mod command;

use crate::error::SweepError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use command::CommandResolver;

/// Opaque host identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Target(String);

impl Target {
    pub fn new(host: impl Into<String>) -> Self {
        Self(host.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Target {
    fn from(s: &str) -> Self {
        Target::new(s)
    }
}

impl From<String> for Target {
    fn from(s: String) -> Self {
        Target(s)
    }
}

impl AsRef<str> for Target {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Domain-scoping descriptor handed to a directory resolver
///
/// The fields are carried verbatim; interpreting them is the resolver's job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryQuery {
    pub domain: Option<String>,
    pub ldap_filter: Option<String>,
    pub search_base: Option<String>,
    pub operating_system: Option<String>,
    pub service_pack: Option<String>,
    pub site_name: Option<String>,
    pub server: Option<String>,
    pub unconstrained: bool,
}

impl DirectoryQuery {
    pub fn for_domain(domain: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
            ..Default::default()
        }
    }

    /// True when no field narrows the query
    pub fn is_empty(&self) -> bool {
        self.domain.is_none()
            && self.ldap_filter.is_none()
            && self.search_base.is_none()
            && self.operating_system.is_none()
            && self.service_pack.is_none()
            && self.site_name.is_none()
            && self.server.is_none()
            && !self.unconstrained
    }
}

/// External enumerator for directory queries
#[async_trait]
pub trait TargetResolver: Send + Sync {
    /// Enumerate hosts matching `query`. Failures are reported as
    /// [`SweepError::Resolution`].
    async fn resolve(&self, query: &DirectoryQuery) -> Result<Vec<Target>, SweepError>;

    fn name(&self) -> &str;
}

/// Resolver backed by a fixed host list, whatever the query says
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    targets: Vec<Target>,
}

impl StaticResolver {
    pub fn new(targets: Vec<Target>) -> Self {
        Self { targets }
    }
}

#[async_trait]
impl TargetResolver for StaticResolver {
    async fn resolve(&self, _query: &DirectoryQuery) -> Result<Vec<Target>, SweepError> {
        Ok(self.targets.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Where the targets of a run come from
#[derive(Debug, Clone, PartialEq)]
pub enum TargetSource {
    Explicit(Vec<Target>),
    Query(DirectoryQuery),
}

impl TargetSource {
    /// Pick a source. A non-empty explicit list always wins.
    pub fn select(explicit: Vec<Target>, query: Option<&DirectoryQuery>) -> Result<Self, SweepError> {
        if !explicit.is_empty() {
            return Ok(TargetSource::Explicit(explicit));
        }
        match query {
            Some(query) if !query.is_empty() => Ok(TargetSource::Query(query.clone())),
            _ => Err(SweepError::NoTargets),
        }
    }

    /// Produce the target sequence, failing with [`SweepError::NoTargets`]
    /// when it comes back empty
    pub async fn resolve(
        self,
        resolver: Option<&dyn TargetResolver>,
    ) -> Result<Vec<Target>, SweepError> {
        let targets = match self {
            TargetSource::Explicit(targets) => targets,
            TargetSource::Query(query) => {
                let resolver = resolver.ok_or_else(|| {
                    SweepError::Resolution(
                        "a directory query was given but no resolver is configured".to_string(),
                    )
                })?;
                log::info!("Querying {} resolver for targets", resolver.name());
                resolver.resolve(&query).await?
            }
        };

        if targets.is_empty() {
            return Err(SweepError::NoTargets);
        }
        Ok(targets)
    }
}
