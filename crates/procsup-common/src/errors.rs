//! Error types for the supervisor.
//!
//! Construction-time failures (`Configuration`, `SpawnFailed`,
//! `ManagementChannel` during connect) abort the launch entirely. After
//! launch, `ManagementChannel` is surfaced to the caller of a health probe.
//! `StreamRead` is never propagated: gobblers store it for inspection.

use thiserror::Error;

/// Process-level error taxonomy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// Invalid launch input (working directory, logical name, port).
    #[error("Process configuration error: {id} - {operation}: {reason}")]
    Configuration {
        id: String,
        operation: String,
        reason: String,
    },

    /// The OS refused to start the worker.
    #[error("Process spawn failed: {id} - {reason}")]
    SpawnFailed { id: String, reason: String },

    /// The management endpoint could not be reached or a remote call failed.
    #[error("Management channel error: {id} - {operation}: {reason}")]
    ManagementChannel {
        id: String,
        operation: String,
        reason: String,
    },

    /// Reading one of the worker's output streams failed.
    #[error("Stream read error: {id} ({stream}) - {reason}")]
    StreamRead {
        id: String,
        stream: String,
        reason: String,
    },

    /// The worker terminated while no stop had been requested.
    #[error("Process unexpectedly finished: {id} - {exit}")]
    UnexpectedExit { id: String, exit: String },

    #[error("Process state error: {id} - expected {expected}, got {actual}")]
    InvalidState {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("Process timeout: {id} - {operation}")]
    Timeout { id: String, operation: String },
}

impl ProcessError {
    pub fn configuration(
        id: impl Into<String>,
        operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Configuration {
            id: id.into(),
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn spawn_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn management_channel(
        id: impl Into<String>,
        operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ManagementChannel {
            id: id.into(),
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn stream_read(
        id: impl Into<String>,
        stream: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::StreamRead {
            id: id.into(),
            stream: stream.into(),
            reason: reason.into(),
        }
    }

    pub fn unexpected_exit(id: impl Into<String>, exit: impl Into<String>) -> Self {
        Self::UnexpectedExit {
            id: id.into(),
            exit: exit.into(),
        }
    }

    pub fn invalid_state(
        id: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            id: id.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn timeout(id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Timeout {
            id: id.into(),
            operation: operation.into(),
        }
    }

    /// Logical name of the process this error belongs to.
    pub fn process_id(&self) -> &str {
        match self {
            Self::Configuration { id, .. }
            | Self::SpawnFailed { id, .. }
            | Self::ManagementChannel { id, .. }
            | Self::StreamRead { id, .. }
            | Self::UnexpectedExit { id, .. }
            | Self::InvalidState { id, .. }
            | Self::Timeout { id, .. } => id,
        }
    }

    pub fn is_management_channel(&self) -> bool {
        matches!(self, Self::ManagementChannel { .. })
    }
}

/// Result type for process operations.
pub type ProcessResult<T> = std::result::Result<T, ProcessError>;

/// Read failure captured by a stream gobbler.
///
/// `std::io::Error` is not `Clone`, so the gobbler keeps the kind and the
/// rendered message instead of the error itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamReadError {
    pub kind: std::io::ErrorKind,
    pub message: String,
}

impl StreamReadError {
    pub fn from_io(err: &std::io::Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn into_process_error(self, id: impl Into<String>, stream: impl Into<String>) -> ProcessError {
        ProcessError::stream_read(id, stream, self.message)
    }
}

impl std::fmt::Display for StreamReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:?})", self.message, self.kind)
    }
}
