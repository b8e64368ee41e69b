//! Lifecycle events published by a supervisor.

use chrono::{DateTime, Utc};
use procsup_common::ProcessError;
use serde::Serialize;
use std::fmt;
use std::process::ExitStatus;

/// How the worker process ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitInfo {
    pub code: Option<i32>,
    /// Terminating signal (Unix only)
    pub signal: Option<i32>,
    /// True when a stop had been requested before the exit was observed.
    pub expected: bool,
    pub exited_at: DateTime<Utc>,
    /// Set when waiting on the process itself failed.
    pub wait_error: Option<String>,
}

impl ExitInfo {
    pub fn from_status(status: ExitStatus, expected: bool) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
            expected,
            exited_at: Utc::now(),
            wait_error: None,
        }
    }

    pub fn from_wait_error(error: &std::io::Error, expected: bool) -> Self {
        Self {
            code: None,
            signal: None,
            expected,
            exited_at: Utc::now(),
            wait_error: Some(error.to_string()),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// `UnexpectedExit` error for an exit nobody asked for.
    pub fn unexpected_error(&self, name: &str) -> Option<ProcessError> {
        (!self.expected).then(|| ProcessError::unexpected_exit(name, self.to_string()))
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal, &self.wait_error) {
            (_, _, Some(err)) => write!(f, "wait failed: {}", err),
            (Some(code), _, _) => write!(f, "exit code {}", code),
            (None, Some(signal), _) => write!(f, "killed by signal {}", signal),
            (None, None, None) => write!(f, "unknown exit status"),
        }
    }
}

/// Supervisor lifecycle event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    Spawned { name: String, pid: u32, port: u16 },
    ManagementConnected { name: String, endpoint: String },
    /// Pinging gave up; emitted once per supervisor.
    Unhealthy {
        name: String,
        reason: String,
        consecutive_failures: u32,
    },
    /// The worker exited while no stop was requested.
    UnexpectedExit { name: String, exit: ExitInfo },
    Exited { name: String, exit: ExitInfo },
    StopRequested { name: String },
}

impl SupervisorEvent {
    pub fn name(&self) -> &str {
        match self {
            SupervisorEvent::Spawned { name, .. }
            | SupervisorEvent::ManagementConnected { name, .. }
            | SupervisorEvent::Unhealthy { name, .. }
            | SupervisorEvent::UnexpectedExit { name, .. }
            | SupervisorEvent::Exited { name, .. }
            | SupervisorEvent::StopRequested { name } => name,
        }
    }

    /// Exit details, for the two exit events.
    pub fn exit(&self) -> Option<&ExitInfo> {
        match self {
            SupervisorEvent::UnexpectedExit { exit, .. } | SupervisorEvent::Exited { exit, .. } => {
                Some(exit)
            }
            _ => None,
        }
    }
}
