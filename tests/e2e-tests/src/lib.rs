//! E2E test support for procsup.
//!
//! Tests launch the `testworker` binary of this package through a real
//! `ProcessSupervisor`. The worker's behavior is picked by its entry point
//! (the last launch argument) and tuned through environment properties.

use procsup_process::WorkerConfig;
use procsup_supervisor::{SupervisorEvent, SupervisorOptions};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

/// Worker behaviors, selected by entry point.
pub mod modes {
    /// Serves management calls, ready after `TESTWORKER_READY_DELAY_MS`.
    pub const STEADY: &str = "steady";
    /// Exits with code 3 before opening its endpoint.
    pub const CRASH: &str = "crash";
    /// Becomes ready, then exits with code 3 after `TESTWORKER_CRASH_AFTER_MS`.
    pub const CRASH_AFTER_READY: &str = "crash-after-ready";
    /// Never opens its endpoint.
    pub const SILENT: &str = "silent";
    /// Prints `TESTWORKER_LINES` lines on each stream, then behaves as steady.
    pub const CHATTY: &str = "chatty";
    /// Accepts stop requests and termination signals but keeps running.
    pub const IGNORE_STOP: &str = "ignore-stop";
    /// Answers pings as unresponsive after `TESTWORKER_FAIL_PINGS_AFTER_MS`.
    pub const UNRESPONSIVE: &str = "unresponsive";
}

pub const READY_DELAY_PROPERTY: &str = "TESTWORKER_READY_DELAY_MS";
pub const CRASH_AFTER_PROPERTY: &str = "TESTWORKER_CRASH_AFTER_MS";
pub const LINES_PROPERTY: &str = "TESTWORKER_LINES";
pub const FAIL_PINGS_AFTER_PROPERTY: &str = "TESTWORKER_FAIL_PINGS_AFTER_MS";

/// Path to the `testworker` binary built alongside the tests.
pub fn testworker_path() -> PathBuf {
    if let Ok(path) = env::var("TESTWORKER_BIN") {
        return PathBuf::from(path);
    }

    let mut path = env::current_exe()
        .expect("Failed to get current exe path")
        .parent()
        .expect("Failed to get parent dir")
        .to_path_buf();

    // If we're in deps/, go up one level
    if path.ends_with("deps") {
        path.pop();
    }

    #[cfg(windows)]
    path.push("testworker.exe");

    #[cfg(not(windows))]
    path.push("testworker");

    if !path.exists() {
        panic!("testworker binary not found at: {}", path.display());
    }

    path
}

/// A worker configuration rooted in its own scratch directory.
pub struct WorkerFixture {
    pub dir: TempDir,
    pub config: WorkerConfig,
}

impl WorkerFixture {
    pub fn new(name: &str, mode: &str) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create test directory");
        let resources = dir.path().join("lib");
        std::fs::create_dir_all(&resources).expect("Failed to create resource directory");

        let config = WorkerConfig::new(name, dir.path(), testworker_path(), mode)
            .with_resource(resources.join("worker.jar"))
            .with_resource(resources.join("deps.jar"));
        Self { dir, config }
    }

    pub fn with_property(mut self, key: &str, value: impl ToString) -> Self {
        self.config = self.config.with_property(key, value.to_string());
        self
    }
}

/// Short timings so failures surface in seconds, not minutes.
pub fn fast_options() -> SupervisorOptions {
    SupervisorOptions {
        grace_interval: Duration::from_millis(200),
        connect_timeout: Duration::from_secs(10),
        connect_initial_backoff: Duration::from_millis(50),
        connect_max_backoff: Duration::from_millis(500),
        ping_interval: Duration::from_millis(200),
        ping_timeout: Some(Duration::from_secs(2)),
        stop_timeout: Duration::from_secs(5),
        force_kill_timeout: Duration::from_secs(5),
        gobbler_join_timeout: Duration::from_secs(2),
        ..SupervisorOptions::default()
    }
}

/// Event channel to hand to `SupervisorOptions::with_events`.
pub fn event_channel() -> (
    broadcast::Sender<SupervisorEvent>,
    broadcast::Receiver<SupervisorEvent>,
) {
    broadcast::channel(256)
}

/// Everything currently buffered on `rx`.
pub fn drain_events(rx: &mut broadcast::Receiver<SupervisorEvent>) -> Vec<SupervisorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Wait for the first event matching `pred`.
pub async fn wait_for_event<F>(
    rx: &mut broadcast::Receiver<SupervisorEvent>,
    limit: Duration,
    pred: F,
) -> Option<SupervisorEvent>
where
    F: Fn(&SupervisorEvent) -> bool,
{
    tokio::time::timeout(limit, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Poll `is_ready` until it reports true.
pub async fn wait_until_ready(
    supervisor: &procsup_supervisor::ProcessSupervisor,
    limit: Duration,
) -> Result<(), String> {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        match supervisor.is_ready().await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => return Err(format!("is_ready failed: {}", e)),
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(format!("{} not ready after {:?}", supervisor.name(), limit));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
