//! Lifecycle state of a supervised worker.
//!
//! A supervisor instance drives exactly one worker through
//! `Starting -> Running -> Stopping -> Stopped`, with `Unhealthy` entered when
//! liveness probing gives up. There is no way back from `Stopped`: a new
//! process requires a new supervisor.
//!
//! The exit watcher consults this state to tell a requested stop from a
//! crash: `stop()` moves to `Stopping` before it asks the worker to exit.

use chrono::{DateTime, Utc};
use procsup_common::{ProcessError, ProcessResult};
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_HISTORY: usize = 32;

/// Lifecycle state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    /// Spawned, management channel not yet connected
    Starting,
    /// Connected and being pinged
    Running,
    /// Liveness probing failed; the worker may still be alive
    Unhealthy,
    /// A stop has been requested
    Stopping,
    /// The OS process is confirmed terminated
    Stopped,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Starting => write!(f, "starting"),
            ProcessState::Running => write!(f, "running"),
            ProcessState::Unhealthy => write!(f, "unhealthy"),
            ProcessState::Stopping => write!(f, "stopping"),
            ProcessState::Stopped => write!(f, "stopped"),
        }
    }
}

impl ProcessState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessState::Stopped)
    }

    /// True while no stop has been requested. An exit observed in one of
    /// these states is unexpected.
    pub fn is_unrequested(&self) -> bool {
        matches!(
            self,
            ProcessState::Starting | ProcessState::Running | ProcessState::Unhealthy
        )
    }
}

/// One recorded lifecycle change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: ProcessState,
    pub to_state: ProcessState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// State machine that validates lifecycle transitions
#[derive(Debug, Clone)]
pub struct ProcessStateMachine {
    process_id: String,
    current_state: ProcessState,
    state_history: Vec<StateTransition>,
    last_transition_time: DateTime<Utc>,
}

impl ProcessStateMachine {
    /// A fresh machine starts in `Starting`: it is created at spawn time.
    pub fn new(process_id: &str) -> Self {
        Self {
            process_id: process_id.to_string(),
            current_state: ProcessState::Starting,
            state_history: Vec::new(),
            last_transition_time: Utc::now(),
        }
    }

    pub fn current_state(&self) -> ProcessState {
        self.current_state
    }

    pub fn state_history(&self) -> &[StateTransition] {
        &self.state_history
    }

    pub fn last_transition_time(&self) -> DateTime<Utc> {
        self.last_transition_time
    }

    pub fn is_valid_transition(&self, target_state: ProcessState) -> bool {
        use ProcessState::*;

        match (self.current_state, target_state) {
            (Starting, Running) => true,
            (Starting, Stopping) => true,
            (Starting, Stopped) => true, // crashed or failed to connect

            (Running, Unhealthy) => true,
            (Running, Stopping) => true,
            (Running, Stopped) => true,

            (Unhealthy, Stopping) => true,
            (Unhealthy, Stopped) => true,

            (Stopping, Stopped) => true,

            (state, target) if state == target => true,

            _ => false,
        }
    }

    /// Move to `target_state`, rejecting transitions the lifecycle does not allow.
    pub fn transition_to(
        &mut self,
        target_state: ProcessState,
        reason: Option<String>,
    ) -> ProcessResult<()> {
        if !self.is_valid_transition(target_state) {
            return Err(ProcessError::invalid_state(
                &self.process_id,
                format!("{:?}", target_state),
                format!("{:?}", self.current_state),
            ));
        }
        if target_state == self.current_state {
            return Ok(());
        }

        let now = Utc::now();
        let from_state = self.current_state;
        self.state_history.push(StateTransition {
            from_state,
            to_state: target_state,
            timestamp: now,
            reason,
        });
        if self.state_history.len() > MAX_HISTORY {
            self.state_history.remove(0);
        }
        self.current_state = target_state;
        self.last_transition_time = now;

        tracing::debug!(
            "Process {} transitioned from {:?} to {:?}",
            self.process_id,
            from_state,
            target_state
        );

        Ok(())
    }

    pub fn transition_to_running(&mut self) -> ProcessResult<()> {
        self.transition_to(
            ProcessState::Running,
            Some("Management channel connected".to_string()),
        )
    }

    pub fn transition_to_unhealthy(&mut self, reason: String) -> ProcessResult<()> {
        self.transition_to(ProcessState::Unhealthy, Some(reason))
    }

    pub fn transition_to_stopping(&mut self) -> ProcessResult<()> {
        self.transition_to(ProcessState::Stopping, Some("Stop requested".to_string()))
    }

    pub fn transition_to_stopped(&mut self, reason: String) -> ProcessResult<()> {
        self.transition_to(ProcessState::Stopped, Some(reason))
    }

    /// Whether the worker went through `Stopping`, i.e. a stop was requested.
    pub fn stop_requested(&self) -> bool {
        matches!(
            self.current_state,
            ProcessState::Stopping | ProcessState::Stopped
        ) && self
            .state_history
            .iter()
            .any(|t| t.to_state == ProcessState::Stopping)
    }
}
