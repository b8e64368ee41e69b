//! # procsup monitoring
//!
//! Liveness probing for supervised workers:
//! - `HealthStatus` tracks consecutive probe outcomes
//! - `PingSchedule` runs a probe at a fixed delay until cancelled or until
//!   the failure threshold is reached

pub mod ping;

use chrono::{DateTime, Utc};

/// Health status tracker for a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    pub is_healthy: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub total_checks: u64,
    pub failure_reason: Option<String>,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            is_healthy: true,
            last_check: None,
            last_success: None,
            consecutive_failures: 0,
            consecutive_successes: 0,
            total_checks: 0,
            failure_reason: None,
        }
    }

    pub fn record_success(&mut self) {
        let now = Utc::now();
        self.is_healthy = true;
        self.last_check = Some(now);
        self.last_success = Some(now);
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
        self.total_checks += 1;
        self.failure_reason = None;
    }

    /// Records a failed probe. Returns true when this failure crossed
    /// `failure_threshold` (healthy before, unhealthy now).
    pub fn record_failure(&mut self, reason: String, failure_threshold: u32) -> bool {
        let was_healthy = self.is_healthy;
        self.last_check = Some(Utc::now());
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
        self.total_checks += 1;
        self.failure_reason = Some(reason);

        if self.consecutive_failures >= failure_threshold.max(1) {
            self.is_healthy = false;
        }
        was_healthy && !self.is_healthy
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

pub use ping::*;
