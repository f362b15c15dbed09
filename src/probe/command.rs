//! Access check through an external command
//!
//! This is how an administrative-access test (e.g. opening `\\host\C$`
//! through an SMB client) is plugged in. The template may reference
//! `{host}`, `{user}` and `{domain}`. The password never appears on the
//! command line; it is exported as `HOSTSWEEP_PASSWORD`.

use super::{HostProbe, ProbeResult};
use crate::credential::CredentialContext;
use crate::error::{ProbeError, SweepError};
use crate::target::Target;
use crate::utils::command::{CommandFailure, CommandTemplate};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Environment variable carrying the password to the check command
pub const PASSWORD_ENV: &str = "HOSTSWEEP_PASSWORD";

#[derive(Debug, Clone)]
pub struct CommandProbe {
    template: CommandTemplate,
    no_access_codes: Vec<i32>,
    timeout: Duration,
}

impl CommandProbe {
    pub fn new(template: &str) -> Result<Self, SweepError> {
        let template = CommandTemplate::parse(template)
            .map_err(|e| SweepError::ConfigError(format!("Invalid check command: {}", e)))?;
        if !template.uses("host") {
            return Err(SweepError::ConfigError(
                "check command must reference {host}".to_string(),
            ));
        }
        Ok(Self {
            template,
            no_access_codes: vec![1],
            timeout: Duration::from_secs(30),
        })
    }

    /// Exit codes meaning "reachable, but access denied"
    pub fn with_no_access_codes(mut self, codes: Vec<i32>) -> Self {
        self.no_access_codes = codes;
        self
    }

    /// Hard limit for one command run; the process is killed past it
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn classify(&self, exit_code: Option<i32>, stderr: &str) -> Result<ProbeResult, ProbeError> {
        match exit_code {
            Some(0) => Ok(ProbeResult::ReachableAccess),
            Some(code) if self.no_access_codes.contains(&code) => Ok(ProbeResult::ReachableNoAccess),
            Some(code) => Err(ProbeError::Command(format!(
                "exit code {}: {}",
                code,
                stderr.trim()
            ))),
            None => Err(ProbeError::Command("terminated by signal".to_string())),
        }
    }
}

#[async_trait]
impl HostProbe for CommandProbe {
    async fn probe(
        &self,
        target: &Target,
        context: Option<&CredentialContext>,
    ) -> Result<ProbeResult, ProbeError> {
        let credential = context.and_then(|c| c.credential());

        let mut vars = HashMap::new();
        vars.insert("host", target.to_string());
        vars.insert(
            "user",
            credential.map(|c| c.username.clone()).unwrap_or_default(),
        );
        vars.insert(
            "domain",
            credential.and_then(|c| c.domain.clone()).unwrap_or_default(),
        );

        let mut env = Vec::new();
        if let Some(credential) = credential {
            env.push((PASSWORD_ENV, credential.password.as_str()));
        }

        let output = self
            .template
            .run(&vars, &env, self.timeout)
            .await
            .map_err(|e| match e {
                CommandFailure::TimedOut(_) => ProbeError::Timeout,
                CommandFailure::Spawn(msg) => ProbeError::Command(msg),
            })?;

        self.classify(output.exit_code, &output.stderr)
    }

    fn name(&self) -> &str {
        "command"
    }
}
