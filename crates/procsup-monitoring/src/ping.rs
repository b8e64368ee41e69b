//! Ping schedule - fixed-delay liveness probing of a worker
//!
//! The first probe runs immediately; each following probe starts
//! `interval` after the previous one completed. Cancelling the schedule
//! interrupts an in-flight probe. Once consecutive failures reach the
//! threshold, the unhealthy callback fires exactly once and the task ends.

use crate::HealthStatus;
use async_trait::async_trait;
use parking_lot::RwLock;
use procsup_common::ProcessResult;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A single remote liveness check.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn probe(&self) -> ProcessResult<()>;
}

/// Called once when the failure threshold is reached, with the last reason.
pub type UnhealthyCallback = Arc<dyn Fn(&HealthStatus) + Send + Sync>;

/// Ping schedule configuration
#[derive(Debug, Clone)]
pub struct PingConfig {
    /// Delay between the end of one probe and the start of the next
    pub interval: Duration,

    /// Per-probe timeout; `None` waits for the transport
    pub timeout: Option<Duration>,

    /// Consecutive failures before the worker is declared unhealthy
    pub failure_threshold: u32,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            timeout: None,
            failure_threshold: 1,
        }
    }
}

/// Recurring liveness probe owned by a supervisor.
pub struct PingSchedule {
    process_id: String,
    config: PingConfig,
    status: Arc<RwLock<HealthStatus>>,
    active: Arc<AtomicBool>,
    cancel: CancellationToken,
    unhealthy_callback: Option<UnhealthyCallback>,
    task_handle: Option<JoinHandle<()>>,
}

impl PingSchedule {
    pub fn new(process_id: impl Into<String>, config: PingConfig) -> Self {
        Self {
            process_id: process_id.into(),
            config,
            status: Arc::new(RwLock::new(HealthStatus::new())),
            active: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            unhealthy_callback: None,
            task_handle: None,
        }
    }

    pub fn set_unhealthy_callback<F>(&mut self, callback: F)
    where
        F: Fn(&HealthStatus) + Send + Sync + 'static,
    {
        self.unhealthy_callback = Some(Arc::new(callback));
    }

    /// Start probing. A schedule runs at most once.
    pub fn start(&mut self, probe: Arc<dyn LivenessProbe>) {
        if self.task_handle.is_some() {
            warn!("Ping schedule already started for {}", self.process_id);
            return;
        }

        self.active.store(true, Ordering::SeqCst);
        let task = tokio::spawn(Self::run_ping_loop(
            self.process_id.clone(),
            self.config.clone(),
            probe,
            Arc::clone(&self.status),
            Arc::clone(&self.active),
            self.cancel.clone(),
            self.unhealthy_callback.clone(),
        ));
        self.task_handle = Some(task);

        info!(
            "Ping schedule started for {} (interval: {:?}, failure_threshold: {})",
            self.process_id, self.config.interval, self.config.failure_threshold
        );
    }

    /// Stop probing. Safe to call any number of times.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            debug!("Cancelling ping schedule for {}", self.process_id);
            self.cancel.cancel();
        }
    }

    /// True while the probing task is running.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn health(&self) -> HealthStatus {
        self.status.read().clone()
    }

    pub fn config(&self) -> &PingConfig {
        &self.config
    }

    /// Wait for the probing task to end (after `cancel()` or on its own).
    pub async fn join(&mut self) {
        if let Some(task) = self.task_handle.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Ping task for {} failed: {}", self.process_id, e);
                }
            }
        }
        self.active.store(false, Ordering::SeqCst);
    }

    /// Cancel and abort without waiting; used on drop paths.
    pub fn abort(&mut self) {
        self.cancel();
        if let Some(task) = self.task_handle.take() {
            task.abort();
        }
        self.active.store(false, Ordering::SeqCst);
    }

    async fn run_ping_loop(
        process_id: String,
        config: PingConfig,
        probe: Arc<dyn LivenessProbe>,
        status: Arc<RwLock<HealthStatus>>,
        active: Arc<AtomicBool>,
        cancel: CancellationToken,
        unhealthy_callback: Option<UnhealthyCallback>,
    ) {
        loop {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = Self::probe_once(probe.as_ref(), config.timeout) => outcome,
            };

            match outcome {
                Ok(()) => {
                    status.write().record_success();
                    debug!("Ping succeeded for {}", process_id);
                }
                Err(reason) => {
                    let (crossed, snapshot) = {
                        let mut current = status.write();
                        let crossed =
                            current.record_failure(reason.clone(), config.failure_threshold);
                        (crossed, current.clone())
                    };

                    warn!(
                        "Ping failed for {}: consecutive failures = {}/{}, reason: {}",
                        process_id,
                        snapshot.consecutive_failures,
                        config.failure_threshold,
                        reason
                    );

                    if crossed {
                        error!(
                            "Process {} is unhealthy after {} failed pings: {}",
                            process_id, snapshot.consecutive_failures, reason
                        );
                        if let Some(ref callback) = unhealthy_callback {
                            callback(&snapshot);
                        }
                        break;
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(config.interval) => {}
            }
        }

        active.store(false, Ordering::SeqCst);
        debug!("Ping loop ended for {}", process_id);
    }

    async fn probe_once(probe: &dyn LivenessProbe, timeout: Option<Duration>) -> Result<(), String> {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, probe.probe()).await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_) => Err(format!("ping timed out after {:?}", limit)),
            },
            None => probe.probe().await.map_err(|e| e.to_string()),
        }
    }
}

impl Drop for PingSchedule {
    fn drop(&mut self) {
        self.abort();
    }
}
