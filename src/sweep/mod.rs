//! Sweep orchestration and result bookkeeping

pub mod engine;

use crate::probe::{ProbeOutcome, ProbeResult};
use crate::target::Target;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

pub use engine::SweepEngine;

/// Lifecycle of a sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepPhase {
    Init,
    Resolving,
    AcquireCredential,
    ProbingSequential,
    ProbingConcurrent,
    Cleanup,
    Done,
}

impl fmt::Display for SweepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SweepPhase::Init => "init",
            SweepPhase::Resolving => "resolving",
            SweepPhase::AcquireCredential => "acquire-credential",
            SweepPhase::ProbingSequential => "probing (sequential)",
            SweepPhase::ProbingConcurrent => "probing (concurrent)",
            SweepPhase::Cleanup => "cleanup",
            SweepPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Running tally of outcomes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub access: usize,
    pub no_access: usize,
    pub unreachable: usize,
    pub failures: usize,
}

impl SweepStats {
    pub fn record(&mut self, outcome: &ProbeOutcome) {
        match outcome.result {
            ProbeResult::ReachableAccess => self.access += 1,
            ProbeResult::ReachableNoAccess => self.no_access += 1,
            ProbeResult::Unreachable { .. } => self.unreachable += 1,
        }
        if outcome.failed {
            self.failures += 1;
        }
    }

    pub fn merge(&mut self, other: &SweepStats) {
        self.access += other.access;
        self.no_access += other.no_access;
        self.unreachable += other.unreachable;
        self.failures += other.failures;
    }

    pub fn total(&self) -> usize {
        self.access + self.no_access + self.unreachable
    }
}

/// Final report of a finished sweep
#[derive(Debug, Clone, Serialize)]
pub struct SweepSummary {
    pub run_id: Uuid,
    /// Hosts the sweep set out to probe
    pub targets: usize,
    pub access: usize,
    pub no_access: usize,
    pub unreachable: usize,
    /// Probes that errored, panicked or timed out (a subset of `unreachable`)
    pub failures: usize,
    pub cancelled: bool,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

impl SweepSummary {
    pub fn new(run_id: Uuid, targets: usize, stats: &SweepStats, cancelled: bool, duration: Duration) -> Self {
        Self {
            run_id,
            targets,
            access: stats.access,
            no_access: stats.no_access,
            unreachable: stats.unreachable,
            failures: stats.failures,
            cancelled,
            duration,
        }
    }

    /// Hosts that produced an outcome
    pub fn probed(&self) -> usize {
        self.access + self.no_access + self.unreachable
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

/// Outcomes of a sweep collected in memory
#[derive(Debug, Clone)]
pub struct SweepReport {
    pub outcomes: Vec<ProbeOutcome>,
    pub summary: SweepSummary,
}

impl SweepReport {
    /// Hosts with access, in the order their outcomes arrived
    pub fn positives(&self) -> Vec<Target> {
        self.outcomes
            .iter()
            .filter(|o| o.result.has_access())
            .map(|o| o.target.clone())
            .collect()
    }

    pub fn outcome_for(&self, target: &str) -> Option<&ProbeOutcome> {
        self.outcomes.iter().find(|o| o.target.as_str() == target)
    }
}
