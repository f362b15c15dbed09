//! TCP connect based liveness check and port probe

use super::{HostProbe, LivenessCheck, ProbeResult};
use crate::credential::CredentialContext;
use crate::error::ProbeError;
use crate::target::Target;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Ports answered by practically every Windows host (SMB, RPC endpoint mapper)
pub const DEFAULT_LIVENESS_PORTS: [u16; 2] = [445, 135];

/// Outcome of a single connect attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectState {
    Open,
    Closed,
    Filtered,
}

/// Connect to `host:port`, classifying the result
pub async fn connect_state(host: &str, port: u16, limit: Duration) -> Result<ConnectState, ProbeError> {
    match timeout(limit, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => Ok(ConnectState::Open),
        Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => Ok(ConnectState::Closed),
        Ok(Err(e)) => Err(ProbeError::Connection(format!("{}:{}: {}", host, port, e))),
        Err(_) => Ok(ConnectState::Filtered),
    }
}

/// Host is alive when any configured port answers, with either an accepted
/// connection or a reset. Silence and connect errors count as down.
#[derive(Debug, Clone)]
pub struct TcpLiveness {
    ports: Vec<u16>,
    timeout: Duration,
}

impl TcpLiveness {
    pub fn new(ports: Vec<u16>, timeout: Duration) -> Self {
        Self { ports, timeout }
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }
}

impl Default for TcpLiveness {
    fn default() -> Self {
        Self::new(DEFAULT_LIVENESS_PORTS.to_vec(), Duration::from_millis(1000))
    }
}

#[async_trait]
impl LivenessCheck for TcpLiveness {
    async fn is_reachable(&self, target: &Target) -> bool {
        for &port in &self.ports {
            match connect_state(target.as_str(), port, self.timeout).await {
                Ok(ConnectState::Open) | Ok(ConnectState::Closed) => return true,
                Ok(ConnectState::Filtered) => {}
                Err(e) => log::debug!("Liveness connect to {} failed: {}", target, e),
            }
        }
        false
    }
}

/// "Is this port open" probe
///
/// Open reports access, refused reports reachable without access, and a
/// silent port reports the host unreachable.
#[derive(Debug, Clone)]
pub struct TcpPortProbe {
    port: u16,
    timeout: Duration,
}

impl TcpPortProbe {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }
}

#[async_trait]
impl HostProbe for TcpPortProbe {
    async fn probe(
        &self,
        target: &Target,
        _context: Option<&CredentialContext>,
    ) -> Result<ProbeResult, ProbeError> {
        let state = connect_state(target.as_str(), self.port, self.timeout).await?;
        Ok(match state {
            ConnectState::Open => ProbeResult::ReachableAccess,
            ConnectState::Closed => ProbeResult::ReachableNoAccess,
            ConnectState::Filtered => {
                ProbeResult::unreachable(format!("port {} filtered", self.port))
            }
        })
    }

    fn name(&self) -> &str {
        "tcp-port"
    }
}
