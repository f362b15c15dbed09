//! Directory resolution through an external enumerator
//!
//! The enumerator is any program that prints one host per line, e.g. an
//! `ldapsearch` wrapper. Query fields are offered as placeholders:
//! `{domain}`, `{filter}`, `{searchbase}`, `{server}`, `{os}`, `{sp}`,
//! `{site}` and `{unconstrained}`.

use super::{DirectoryQuery, Target, TargetResolver};
use crate::error::SweepError;
use crate::utils::command::CommandTemplate;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Enumerator run limit when none is configured
pub const DEFAULT_ENUMERATOR_TIMEOUT_SECS: u64 = 300;

/// Resolver that shells out to an enumerator command
#[derive(Debug, Clone)]
pub struct CommandResolver {
    template: CommandTemplate,
    timeout: Duration,
}

impl CommandResolver {
    pub fn new(template: &str) -> Result<Self, SweepError> {
        let template = CommandTemplate::parse(template)
            .map_err(|e| SweepError::ConfigError(format!("Invalid enumerator command: {}", e)))?;
        Ok(Self {
            template,
            timeout: Duration::from_secs(DEFAULT_ENUMERATOR_TIMEOUT_SECS),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn placeholders(query: &DirectoryQuery) -> HashMap<&'static str, String> {
        let field = |v: &Option<String>| v.clone().unwrap_or_default();
        let mut vars = HashMap::new();
        vars.insert("domain", field(&query.domain));
        vars.insert("filter", field(&query.ldap_filter));
        vars.insert("searchbase", field(&query.search_base));
        vars.insert("server", field(&query.server));
        vars.insert("os", field(&query.operating_system));
        vars.insert("sp", field(&query.service_pack));
        vars.insert("site", field(&query.site_name));
        vars.insert("unconstrained", query.unconstrained.to_string());
        vars
    }
}

/// Parse enumerator output: one host per line, blanks and `#` comments
/// skipped, duplicates dropped in first-seen order
pub fn parse_host_lines(output: &str) -> Vec<Target> {
    let mut seen = HashSet::new();
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| seen.insert(line.to_ascii_lowercase()))
        .map(Target::new)
        .collect()
}

#[async_trait]
impl TargetResolver for CommandResolver {
    async fn resolve(&self, query: &DirectoryQuery) -> Result<Vec<Target>, SweepError> {
        let vars = Self::placeholders(query);

        let output = self
            .template
            .run(&vars, &[], self.timeout)
            .await
            .map_err(|e| SweepError::Resolution(e.to_string()))?;

        if !output.success() {
            return Err(SweepError::Resolution(format!(
                "enumerator {} exited with {:?}: {}",
                self.template.program(),
                output.exit_code,
                output.stderr.trim()
            )));
        }

        let targets = parse_host_lines(&output.stdout);
        log::info!(
            "Enumerator {} returned {} hosts in {:?}",
            self.template.program(),
            targets.len(),
            output.elapsed
        );
        Ok(targets)
    }

    fn name(&self) -> &str {
        "command"
    }
}
