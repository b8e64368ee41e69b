//! Exit watcher: owns the worker's `Child` and reports its termination.
//!
//! On exit the watcher classifies it against the lifecycle state (an exit
//! before any stop request is unexpected), moves the state to `Stopped`,
//! publishes the `ExitInfo`, drains both gobblers within a bound and then
//! emits `UnexpectedExit` or `Exited`.

use crate::events::{ExitInfo, SupervisorEvent};
use parking_lot::Mutex;
use procsup_log_collection::{GobblerReport, StreamGobbler};
use procsup_process_state::ProcessStateMachine;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Everything the watcher task takes ownership of.
pub struct WatcherContext {
    pub name: String,
    pub child: Child,
    pub gobblers: Vec<StreamGobbler>,
    pub state: Arc<Mutex<ProcessStateMachine>>,
    pub events: broadcast::Sender<SupervisorEvent>,
    pub gobbler_join_timeout: Duration,
}

/// Result of a bounded wait for the worker's exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitWait {
    Exited(ExitInfo),
    TimedOut,
    /// The watcher task is gone without having recorded an exit.
    WatcherGone,
}

pub struct ExitWatcher {
    name: String,
    exit_rx: watch::Receiver<Option<ExitInfo>>,
    reports: Arc<Mutex<Vec<GobblerReport>>>,
    kill: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ExitWatcher {
    /// Spawn the watcher. Must be called after the gobblers are started.
    pub fn start(ctx: WatcherContext) -> Self {
        let (exit_tx, exit_rx) = watch::channel(None);
        let reports = Arc::new(Mutex::new(Vec::new()));
        let kill = CancellationToken::new();
        let name = ctx.name.clone();

        let task = tokio::spawn(Self::watch(
            ctx,
            exit_tx,
            Arc::clone(&reports),
            kill.clone(),
        ));
        debug!("Exit watcher started for {}", name);

        Self {
            name,
            exit_rx,
            reports,
            kill,
            task: Some(task),
        }
    }

    pub fn exit_info(&self) -> Option<ExitInfo> {
        self.exit_rx.borrow().clone()
    }

    pub fn has_exited(&self) -> bool {
        self.exit_rx.borrow().is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ExitInfo>> {
        self.exit_rx.clone()
    }

    /// Reports of the joined gobblers; empty until they have been drained.
    pub fn gobbler_reports(&self) -> Vec<GobblerReport> {
        self.reports.lock().clone()
    }

    /// Wait for the exit without a bound. `None` if the watcher is gone.
    pub async fn wait(&self) -> Option<ExitInfo> {
        wait_for_exit(&mut self.exit_rx.clone()).await
    }

    pub async fn wait_timeout(&self, limit: Duration) -> ExitWait {
        let mut rx = self.exit_rx.clone();
        match tokio::time::timeout(limit, wait_for_exit(&mut rx)).await {
            Ok(Some(exit)) => ExitWait::Exited(exit),
            Ok(None) => ExitWait::WatcherGone,
            Err(_) => ExitWait::TimedOut,
        }
    }

    /// Kill the worker through its own handle.
    pub fn force_kill(&self) {
        self.kill.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the watcher task, gobbler draining included.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Exit watcher for {} failed: {}", self.name, e);
                }
            }
        }
    }

    /// Abort the task. Dropping the owned `Child` kills a live worker.
    pub fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    async fn watch(
        ctx: WatcherContext,
        exit_tx: watch::Sender<Option<ExitInfo>>,
        reports: Arc<Mutex<Vec<GobblerReport>>>,
        kill: CancellationToken,
    ) {
        let WatcherContext {
            name,
            mut child,
            gobblers,
            state,
            events,
            gobbler_join_timeout,
        } = ctx;

        let status = tokio::select! {
            status = child.wait() => status,
            _ = kill.cancelled() => {
                warn!("Force killing process {}", name);
                if let Err(e) = child.start_kill() {
                    error!("Failed to kill process {}: {}", name, e);
                }
                child.wait().await
            }
        };

        // Classify and leave the live states under one lock, so a stop
        // request either happened before this exit or sees `Stopped`
        let expected = {
            let mut sm = state.lock();
            let expected = !sm.current_state().is_unrequested();
            if let Err(e) = sm.transition_to_stopped("process exited".to_string()) {
                warn!("Cannot record exit of {}: {}", name, e);
            }
            expected
        };

        let exit = match status {
            Ok(status) => ExitInfo::from_status(status, expected),
            Err(e) => {
                error!("Failed to wait for process {}: {}", name, e);
                ExitInfo::from_wait_error(&e, expected)
            }
        };
        exit_tx.send_replace(Some(exit.clone()));

        for mut gobbler in gobblers {
            let report = gobbler.join_timeout(gobbler_join_timeout).await;
            if !report.completed {
                warn!("Output of {} ({}) was not fully drained", name, report.tag);
            }
            reports.lock().push(report);
        }

        let event = if expected {
            info!("Process '{}' finished ({})", name, exit);
            SupervisorEvent::Exited { name, exit }
        } else {
            warn!("Process '{}' unexpectedly finished ({})", name, exit);
            SupervisorEvent::UnexpectedExit { name, exit }
        };
        // No subscribers is fine
        let _ = events.send(event);
    }
}

impl Drop for ExitWatcher {
    fn drop(&mut self) {
        self.abort();
    }
}

async fn wait_for_exit(rx: &mut watch::Receiver<Option<ExitInfo>>) -> Option<ExitInfo> {
    let recorded = rx.wait_for(Option::is_some).await.map(|exit| exit.clone());
    match recorded {
        Ok(exit) => exit,
        // Sender dropped; a value may still have been recorded
        Err(_) => rx.borrow().clone(),
    }
}
