//! Per-host probing
//!
//! A [`HostProbe`] answers one question about one host. The orchestrator
//! calls it through [`guarded_probe`], which turns errors, panics and
//! timeouts into an [`ProbeResult::Unreachable`] outcome so a single bad
//! host never disturbs the rest of a sweep.

pub mod command;
pub mod tcp;

use crate::credential::CredentialContext;
use crate::error::{panic_message, ProbeError};
use crate::target::Target;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

pub use command::CommandProbe;
pub use tcp::{TcpLiveness, TcpPortProbe};

/// Outcome of probing one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeResult {
    Unreachable { reason: Option<String> },
    ReachableNoAccess,
    ReachableAccess,
}

impl ProbeResult {
    pub fn unreachable(reason: impl Into<String>) -> Self {
        ProbeResult::Unreachable {
            reason: Some(reason.into()),
        }
    }

    pub fn has_access(&self) -> bool {
        matches!(self, ProbeResult::ReachableAccess)
    }

    pub fn is_reachable(&self) -> bool {
        !matches!(self, ProbeResult::Unreachable { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProbeResult::Unreachable { .. } => "unreachable",
            ProbeResult::ReachableNoAccess => "no-access",
            ProbeResult::ReachableAccess => "access",
        }
    }
}

/// A probe result stamped with its target and timing
#[derive(Debug, Clone, Serialize)]
pub struct ProbeOutcome {
    pub target: Target,
    #[serde(flatten)]
    pub result: ProbeResult,
    /// Set when the probe itself failed rather than answering
    pub failed: bool,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    pub completed_at: DateTime<Utc>,
}

impl ProbeOutcome {
    pub fn new(target: Target, result: ProbeResult, failed: bool, elapsed: Duration) -> Self {
        Self {
            target,
            result,
            failed,
            elapsed,
            completed_at: Utc::now(),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match &self.result {
            ProbeResult::Unreachable { reason } => reason.as_deref(),
            _ => None,
        }
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

/// The access question asked of each host
#[async_trait]
pub trait HostProbe: Send + Sync {
    async fn probe(
        &self,
        target: &Target,
        context: Option<&CredentialContext>,
    ) -> Result<ProbeResult, ProbeError>;

    fn name(&self) -> &str;
}

/// Cheap reachability pre-check run before the probe
#[async_trait]
pub trait LivenessCheck: Send + Sync {
    async fn is_reachable(&self, target: &Target) -> bool;
}

/// Run the liveness check (if any) and the probe for one target
///
/// Never fails: probe errors, panics and overruns of `limit` are folded into
/// an `Unreachable` outcome with `failed` set.
pub async fn guarded_probe(
    probe: &dyn HostProbe,
    liveness: Option<&dyn LivenessCheck>,
    target: &Target,
    context: Option<&CredentialContext>,
    limit: Duration,
) -> ProbeOutcome {
    let start = Instant::now();

    if let Some(check) = liveness {
        let alive = AssertUnwindSafe(check.is_reachable(target))
            .catch_unwind()
            .await
            .unwrap_or(false);
        if !alive {
            log::debug!("{} did not answer the liveness check", target);
            return ProbeOutcome::new(
                target.clone(),
                ProbeResult::unreachable("liveness check failed"),
                false,
                start.elapsed(),
            );
        }
    }

    let call = AssertUnwindSafe(probe.probe(target, context)).catch_unwind();
    let verdict = match tokio::time::timeout(limit, call).await {
        Ok(Ok(Ok(result))) => Ok(result),
        Ok(Ok(Err(e))) => Err(e),
        Ok(Err(payload)) => Err(ProbeError::Panicked(panic_message(payload))),
        Err(elapsed) => Err(ProbeError::from(elapsed)),
    };

    match verdict {
        Ok(result) => ProbeOutcome::new(target.clone(), result, false, start.elapsed()),
        Err(e) => {
            log::debug!("{} probe failed for {}: {}", probe.name(), target, e);
            ProbeOutcome::new(
                target.clone(),
                ProbeResult::unreachable(e.to_string()),
                true,
                start.elapsed(),
            )
        }
    }
}
