//! hostsweep - concurrent host probing
//!
//! Resolves a set of hosts, optionally switches to an alternate identity,
//! and asks each host an access question, either one at a time with a
//! randomized pause or across a pool of workers.

pub mod config;
pub mod credential;
pub mod error;
pub mod output;
pub mod pacing;
pub mod probe;
pub mod sweep;
pub mod target;
pub mod utils;

// Re-export commonly used types
pub use config::{CheckKind, SweepConfig};
pub use credential::{Credential, CredentialContext, CredentialGuard, CredentialProvider, PassThroughProvider};
pub use error::{ProbeError, SweepError};
pub use pacing::{JitterTimer, PacingPlan};
pub use probe::{HostProbe, LivenessCheck, ProbeOutcome, ProbeResult};
pub use sweep::{SweepEngine, SweepPhase, SweepReport, SweepSummary};
pub use target::{DirectoryQuery, Target, TargetResolver, TargetSource};

pub type Result<T> = std::result::Result<T, SweepError>;
