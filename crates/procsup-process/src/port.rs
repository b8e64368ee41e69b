//! Management port allocation.
//!
//! The supervisor asks a provider for a port before spawning; the only
//! contract is that the port is unused at call time.

use procsup_common::{ProcessError, ProcessResult};
use std::net::TcpListener;
use tracing::debug;

/// Source of free local ports for management endpoints.
pub trait PortProvider: Send + Sync {
    fn free_port(&self) -> ProcessResult<u16>;
}

/// Asks the OS for an ephemeral port by binding port 0 and releasing it.
#[derive(Debug, Clone)]
pub struct EphemeralPortProvider {
    host: String,
}

impl EphemeralPortProvider {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

impl Default for EphemeralPortProvider {
    fn default() -> Self {
        Self::new("127.0.0.1")
    }
}

impl PortProvider for EphemeralPortProvider {
    fn free_port(&self) -> ProcessResult<u16> {
        let bind_addr = format!("{}:0", self.host);
        let listener = TcpListener::bind(&bind_addr).map_err(|e| {
            ProcessError::configuration(
                "port-provider",
                "port allocation",
                format!("failed to bind {}: {}", bind_addr, e),
            )
        })?;
        let port = listener
            .local_addr()
            .map_err(|e| {
                ProcessError::configuration(
                    "port-provider",
                    "port allocation",
                    format!("failed to read local address: {}", e),
                )
            })?
            .port();
        debug!("Allocated free port {} on {}", port, self.host);
        Ok(port)
    }
}

/// Always hands out the same port. Useful when the port is chosen
/// externally, and in tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedPortProvider(pub u16);

impl PortProvider for FixedPortProvider {
    fn free_port(&self) -> ProcessResult<u16> {
        Ok(self.0)
    }
}
