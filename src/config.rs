//! Configuration module for hostsweep

use crate::credential::Credential;
use crate::error::SweepError;
use crate::pacing::PacingPlan;
use crate::probe::{CommandProbe, HostProbe, LivenessCheck, TcpLiveness, TcpPortProbe};
use crate::target::command::DEFAULT_ENUMERATOR_TIMEOUT_SECS;
use crate::target::{CommandResolver, DirectoryQuery, Target, TargetResolver};
use crate::utils::file_input::targets_from_file;
use crate::utils::target_parser::{expand_entries, TargetParser};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const MAX_DELAY_SECS: u64 = 10_000;
pub const MIN_THREADS: usize = 1;
pub const MAX_THREADS: usize = 100;

/// Which access check to run against each host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    /// External access-check command
    Command,
    /// Plain TCP connect to `check_port`
    Port,
}

impl std::str::FromStr for CheckKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "command" | "cmd" => Ok(CheckKind::Command),
            "port" | "tcp" => Ok(CheckKind::Port),
            _ => Err(format!("Unknown check: {}", s)),
        }
    }
}

/// Main configuration structure for a sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Explicit host entries (hostnames, addresses, CIDR blocks)
    pub targets: Vec<String>,

    /// File with more host entries
    pub targets_file: Option<PathBuf>,

    /// Directory query used when no explicit hosts are given
    pub query: Option<DirectoryQuery>,

    /// Enumerator command answering `query`
    pub enumerator: Option<String>,

    /// Base pause between probes in seconds; 0 selects the worker pool
    pub delay: u64,

    /// Fraction of `delay` to randomize by
    pub jitter: f64,

    /// Worker count in concurrent mode
    pub threads: usize,

    pub check: CheckKind,

    /// Template for the command check
    pub check_command: Option<String>,

    /// Port for the port check
    pub check_port: u16,

    /// Exit codes of the check command meaning "no access"
    pub no_access_codes: Vec<i32>,

    /// Run the TCP liveness pre-check
    pub liveness: bool,

    pub liveness_ports: Vec<u16>,

    /// Limit for one enumerator run in seconds
    pub enumerator_timeout: u64,

    /// Connect timeout in milliseconds
    pub connect_timeout: u64,

    /// Overall limit for one probe in milliseconds
    pub probe_timeout: u64,

    /// Cancel the sweep after the first host with access
    pub stop_on_success: bool,

    /// Alternate identity; never written to or read from disk
    #[serde(skip)]
    pub credential: Option<Credential>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            targets_file: None,
            query: None,
            enumerator: None,
            delay: 0,
            jitter: 0.3,
            threads: 20,
            check: CheckKind::Command,
            check_command: None,
            check_port: 445,
            no_access_codes: vec![1],
            liveness: true,
            liveness_ports: vec![445, 135],
            enumerator_timeout: DEFAULT_ENUMERATOR_TIMEOUT_SECS,
            connect_timeout: 1000,
            probe_timeout: 30_000,
            stop_on_success: false,
            credential: None,
        }
    }
}

impl SweepConfig {
    /// Create a configuration for an explicit host list
    pub fn new<S: Into<String>>(targets: Vec<S>) -> Self {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, query: DirectoryQuery) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_delay(mut self, delay_secs: u64) -> Self {
        self.delay = delay_secs;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_liveness(mut self, enabled: bool) -> Self {
        self.liveness = enabled;
        self
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_stop_on_success(mut self, enabled: bool) -> Self {
        self.stop_on_success = enabled;
        self
    }

    pub fn with_probe_timeout(mut self, timeout_ms: u64) -> Self {
        self.probe_timeout = timeout_ms;
        self
    }

    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.connect_timeout)
    }

    pub fn probe_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.probe_timeout)
    }

    /// Sequential when a delay is configured, otherwise a worker pool
    pub fn pacing_plan(&self) -> PacingPlan {
        if self.delay > 0 {
            PacingPlan::Sequential {
                delay: Duration::from_secs(self.delay),
                jitter: self.jitter,
            }
        } else {
            PacingPlan::Concurrent {
                workers: self.threads,
            }
        }
    }

    /// Expand `targets` and `targets_file` into the explicit host list
    pub fn explicit_targets(&self) -> Result<Vec<Target>, SweepError> {
        let parser = TargetParser::default();
        let mut targets = expand_entries(&self.targets, &parser)
            .map_err(|e| SweepError::Resolution(e.to_string()))?;

        if let Some(path) = &self.targets_file {
            let from_file =
                targets_from_file(path).map_err(|e| SweepError::Resolution(format!("{:#}", e)))?;
            targets.extend(from_file);
        }

        Ok(targets)
    }

    /// Resolver for `query`, if an enumerator is configured
    pub fn build_resolver(&self) -> Result<Option<Arc<dyn TargetResolver>>, SweepError> {
        match &self.enumerator {
            Some(template) => {
                let resolver = CommandResolver::new(template)?
                    .with_timeout(Duration::from_secs(self.enumerator_timeout));
                Ok(Some(Arc::new(resolver)))
            }
            None => Ok(None),
        }
    }

    pub fn build_probe(&self) -> Result<Arc<dyn HostProbe>, SweepError> {
        match self.check {
            CheckKind::Command => {
                let template = self.check_command.as_deref().ok_or_else(|| {
                    SweepError::ConfigError("the command check needs a check command".to_string())
                })?;
                let probe = CommandProbe::new(template)?
                    .with_no_access_codes(self.no_access_codes.clone())
                    .with_timeout(self.probe_timeout_duration());
                Ok(Arc::new(probe))
            }
            CheckKind::Port => Ok(Arc::new(TcpPortProbe::new(
                self.check_port,
                self.connect_timeout_duration(),
            ))),
        }
    }

    pub fn build_liveness(&self) -> Option<Arc<dyn LivenessCheck>> {
        if !self.liveness {
            return None;
        }
        Some(Arc::new(TcpLiveness::new(
            self.liveness_ports.clone(),
            self.connect_timeout_duration(),
        )))
    }

    /// Load configuration from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = fs::read_to_string(&path).map_err(|e| {
            SweepError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let config: SweepConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from ~/.hostsweep.toml, falling back to defaults
    pub fn load_default_config() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let config_path = home_dir.join(".hostsweep.toml");

        if config_path.exists() {
            match Self::from_toml_file(&config_path) {
                Ok(config) => {
                    log::info!("Loaded config from {}", config_path.display());
                    return config;
                }
                Err(e) => log::warn!("Ignoring {}: {}", config_path.display(), e),
            }
        }

        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.delay > MAX_DELAY_SECS {
            return Err(SweepError::ConfigError(format!(
                "Delay must be between 0 and {} seconds",
                MAX_DELAY_SECS
            )));
        }

        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(SweepError::ConfigError(
                "Jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        if !(MIN_THREADS..=MAX_THREADS).contains(&self.threads) {
            return Err(SweepError::ConfigError(format!(
                "Thread count must be between {} and {}",
                MIN_THREADS, MAX_THREADS
            )));
        }

        if self.liveness && self.liveness_ports.is_empty() {
            return Err(SweepError::ConfigError(
                "Liveness check enabled but no liveness ports given".to_string(),
            ));
        }

        if self.connect_timeout == 0 || self.probe_timeout == 0 || self.enumerator_timeout == 0 {
            return Err(SweepError::ConfigError(
                "Timeouts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn port_config() -> SweepConfig {
        SweepConfig {
            check: CheckKind::Port,
            ..SweepConfig::new(vec!["dc01"])
        }
    }

    #[test]
    fn test_defaults() {
        let config = SweepConfig::default();
        assert_eq!(config.delay, 0);
        assert_eq!(config.jitter, 0.3);
        assert_eq!(config.threads, 20);
        assert!(config.liveness);
        assert_eq!(config.liveness_ports, vec![445, 135]);
        assert_eq!(config.enumerator_timeout, 300);
    }

    #[test]
    fn test_pacing_plan_selection() {
        let config = port_config().with_threads(7);
        assert_eq!(config.pacing_plan(), PacingPlan::Concurrent { workers: 7 });

        let config = port_config().with_delay(60).with_jitter(0.5);
        assert_eq!(
            config.pacing_plan(),
            PacingPlan::Sequential {
                delay: Duration::from_secs(60),
                jitter: 0.5
            }
        );
    }

    #[test]
    fn test_validate_ranges() {
        assert!(port_config().validate().is_ok());
        assert!(port_config().with_delay(10_000).validate().is_ok());
        assert!(port_config().with_delay(10_001).validate().is_err());
        assert!(port_config().with_jitter(1.5).validate().is_err());
        assert!(port_config().with_jitter(f64::NAN).validate().is_err());
        assert!(port_config().with_threads(0).validate().is_err());
        assert!(port_config().with_threads(101).validate().is_err());
        assert!(port_config().with_probe_timeout(0).validate().is_err());
    }

    #[test]
    fn test_liveness_needs_ports() {
        let mut config = port_config();
        config.liveness_ports.clear();
        assert!(config.validate().is_err());
        assert!(config.with_liveness(false).validate().is_ok());
    }

    #[test]
    fn test_command_check_needs_template() {
        let config = SweepConfig::new(vec!["dc01"]);
        assert!(matches!(config.build_probe(), Err(SweepError::ConfigError(_))));

        let config = SweepConfig {
            check_command: Some("check-admin {host}".to_string()),
            ..config
        };
        assert!(config.build_probe().is_ok());
    }

    #[test]
    fn test_explicit_targets_expand() {
        let config = SweepConfig::new(vec!["ws01,ws02", "10.1.0.0/31"]);
        let targets = config.explicit_targets().unwrap();
        assert_eq!(targets.len(), 4);
        assert_eq!(targets[2], Target::from("10.1.0.0"));
    }

    #[test]
    fn test_missing_targets_file_is_resolution_error() {
        let config = SweepConfig {
            targets_file: Some(PathBuf::from("/nonexistent/hosts.txt")),
            ..SweepConfig::default()
        };
        assert!(matches!(config.explicit_targets(), Err(SweepError::Resolution(_))));
    }

    #[test]
    fn test_toml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
targets = ["dc01.corp.local"]
delay = 30
jitter = 0.1
check = "port"
check_port = 3389
enumerator_timeout = 45

[query]
domain = "corp.local"
"#
        )
        .unwrap();

        let config = SweepConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.delay, 30);
        assert_eq!(config.check, CheckKind::Port);
        assert_eq!(config.check_port, 3389);
        assert_eq!(config.enumerator_timeout, 45);
        assert_eq!(config.threads, 20);
        assert_eq!(config.query, Some(DirectoryQuery::for_domain("corp.local")));
        assert!(config.credential.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_enumerator_timeout_applied() {
        let config = SweepConfig {
            enumerator: Some("sleep 10".to_string()),
            enumerator_timeout: 1,
            ..port_config()
        };
        let resolver = config.build_resolver().unwrap().unwrap();

        let started = std::time::Instant::now();
        let result = resolver.resolve(&DirectoryQuery::for_domain("corp.local")).await;
        assert!(matches!(result, Err(SweepError::Resolution(msg)) if msg.contains("timed out")));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_zero_enumerator_timeout_rejected() {
        let config = SweepConfig {
            enumerator_timeout: 0,
            ..port_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_credential_never_serialized() {
        let config = port_config().with_credential(Credential::new("alice", "s3cret"));
        let rendered = toml::to_string(&config).unwrap();
        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("alice"));
    }

    #[test]
    fn test_check_kind_from_str() {
        assert_eq!("command".parse::<CheckKind>(), Ok(CheckKind::Command));
        assert_eq!("PORT".parse::<CheckKind>(), Ok(CheckKind::Port));
        assert!("smb".parse::<CheckKind>().is_err());
    }
}
