//! Error handling for hostsweep
//!
//! Two layers of failure exist during a sweep. [`SweepError`] is fatal: it
//! aborts the whole run (after cleanup). [`ProbeError`] belongs to a single
//! target and is absorbed by the orchestrator, which records the target as
//! unreachable and keeps going.

use thiserror::Error;

/// Fatal errors that abort a sweep
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("No hosts found to enumerate")]
    NoTargets,

    #[error("Target resolution failed: {0}")]
    Resolution(String),

    #[error("Credential acquisition failed: {0}")]
    CredentialAcquisition(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Output error: {0}")]
    OutputError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Per-target probe failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProbeError {
    #[error("probe timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("access check failed: {0}")]
    AccessCheck(String),

    #[error("check command failed: {0}")]
    Command(String),

    #[error("probe panicked: {0}")]
    Panicked(String),
}

impl From<tokio::time::error::Elapsed> for ProbeError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ProbeError::Timeout
    }
}

impl From<std::io::Error> for ProbeError {
    fn from(e: std::io::Error) -> Self {
        ProbeError::Connection(e.to_string())
    }
}

impl From<csv::Error> for SweepError {
    fn from(e: csv::Error) -> Self {
        SweepError::OutputError(e.to_string())
    }
}

impl From<serde_json::Error> for SweepError {
    fn from(e: serde_json::Error) -> Self {
        SweepError::OutputError(e.to_string())
    }
}

impl From<toml::de::Error> for SweepError {
    fn from(e: toml::de::Error) -> Self {
        SweepError::ConfigError(format!("Failed to parse TOML: {}", e))
    }
}

/// Turn a caught panic payload into a readable message
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
