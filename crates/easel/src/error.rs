use std::io;

use thiserror::Error;

/// Failure of an outstanding read. Surfaces where the [`ReadHandle`]
/// is awaited, never at the call site.
///
/// [`ReadHandle`]: crate::pending::ReadHandle
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReadError {
    #[error("bridge error: {0}")]
    Bridge(String),
    #[error("remote reply channel dropped before resolving")]
    Dropped,
    #[error("endpoint did not become ready in time")]
    EndpointTimeout,
    #[error("session shut down before the read resolved")]
    Shutdown,
}

impl From<surface_bridge::BridgeError> for ReadError {
    fn from(err: surface_bridge::BridgeError) -> Self {
        ReadError::Bridge(err.to_string())
    }
}

/// Failure of an execution unit replayed through the host hook.
#[derive(Debug, Error)]
#[error("execution unit failed: {0}")]
pub struct HostError(pub String);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to start dispatch worker: {0}")]
    WorkerSpawn(#[from] io::Error),
}
