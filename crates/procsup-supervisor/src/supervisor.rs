//! The process supervisor.
//!
//! One `ProcessSupervisor` drives exactly one worker process through its
//! whole life: spawn, output capture, management connection, liveness
//! pinging, exit detection and shutdown. There is no respawn and no
//! reconnect; a new worker needs a new supervisor.

use crate::config::SupervisorOptions;
use crate::events::{ExitInfo, SupervisorEvent};
use crate::exit_watcher::{ExitWait, ExitWatcher, WatcherContext};
use parking_lot::Mutex;
use procsup_common::{ProcessError, ProcessName, ProcessResult};
use procsup_log_collection::{
    FanoutLineSink, FileLineSink, GobblerReport, LineSink, StreamGobbler, StreamType,
    TracingLineSink,
};
use procsup_management::{ManagementEndpoint, RemoteHandle};
use procsup_monitoring::{HealthStatus, LivenessProbe, PingConfig, PingSchedule};
use procsup_process::{
    build_command, force_kill, process_exists, terminate_gracefully, validate_working_directory,
    EphemeralPortProvider, PortProvider, ProcessSpec, WorkerConfig,
};
use procsup_process_state::{ProcessState, ProcessStateMachine};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Supervisor of a single worker process.
pub struct ProcessSupervisor {
    spec: ProcessSpec,
    options: SupervisorOptions,
    pid: u32,
    state: Arc<Mutex<ProcessStateMachine>>,
    events: broadcast::Sender<SupervisorEvent>,
    remote: Arc<RemoteHandle>,
    ping: PingSchedule,
    watcher: ExitWatcher,
    /// Parent token of both gobblers.
    output_cancel: CancellationToken,
    stop_requested: bool,
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("name", &self.name())
            .field("pid", &self.pid)
            .field("port", &self.port())
            .field("state", &self.state())
            .finish()
    }
}

impl ProcessSupervisor {
    /// Launch a worker and connect to its management endpoint.
    ///
    /// Returns once the worker is launched and pinged, not once it is ready:
    /// poll [`Self::is_ready`] for that. On error nothing is left running.
    pub async fn launch(config: &WorkerConfig, options: SupervisorOptions) -> ProcessResult<Self> {
        let name = ProcessName::parse(config.name.clone())?;
        validate_working_directory(name.as_str(), &config.working_directory)?;

        let port_provider: Arc<dyn PortProvider> = match options.port_provider.clone() {
            Some(provider) => provider,
            None => Arc::new(EphemeralPortProvider::new(options.management_host.clone())),
        };
        let port = port_provider.free_port().map_err(|e| {
            ProcessError::configuration(name.as_str(), "port allocation", e.to_string())
        })?;

        let spec = ProcessSpec::resolve(config, port)?;
        let sink = Self::build_sink(&name, &options)?;
        let events = match options.events.clone() {
            Some(sender) => sender,
            None => broadcast::channel(options.event_capacity.max(1)).0,
        };

        let mut command = build_command(&spec)?;
        let mut child = command.spawn().map_err(|e| {
            ProcessError::spawn_failed(
                name.as_str(),
                format!("{}: {}", spec.executable().display(), e),
            )
        })?;
        let pid = child.id().ok_or_else(|| {
            ProcessError::spawn_failed(name.as_str(), "process exited before its PID was read")
        })?;
        info!(
            "Spawned process {} (PID: {}, management port: {})",
            name, pid, port
        );
        let _ = events.send(SupervisorEvent::Spawned {
            name: name.to_string(),
            pid,
            port,
        });

        // Gobblers first, then the watcher that joins them
        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                return Err(ProcessError::spawn_failed(
                    name.as_str(),
                    "output streams were not captured",
                ))
            }
        };
        let output_cancel = CancellationToken::new();
        let gobblers = vec![
            StreamGobbler::start(
                stdout,
                name.stdout_tag(),
                StreamType::Stdout,
                Arc::clone(&sink),
                &output_cancel,
            ),
            StreamGobbler::start(
                stderr,
                name.stderr_tag(),
                StreamType::Stderr,
                sink,
                &output_cancel,
            ),
        ];

        let state = Arc::new(Mutex::new(ProcessStateMachine::new(name.as_str())));
        let mut watcher = ExitWatcher::start(WatcherContext {
            name: name.to_string(),
            child,
            gobblers,
            state: Arc::clone(&state),
            events: events.clone(),
            gobbler_join_timeout: options.gobbler_join_timeout,
        });

        let endpoint =
            ManagementEndpoint::new(options.management_host.clone(), port, spec.name());
        let remote = match connect_with_retry(name.as_str(), &endpoint, &options, &watcher).await {
            Ok(remote) => Arc::new(remote),
            Err(e) => {
                error!("Failed to connect to process {}: {}", name, e);
                abort_launch(name.as_str(), &state, &mut watcher, &options).await;
                return Err(e);
            }
        };

        // The worker may have died right after accepting the connection
        let running = {
            let mut sm = state.lock();
            sm.current_state() == ProcessState::Starting && sm.transition_to_running().is_ok()
        };
        if !running {
            let e = ProcessError::management_channel(
                name.as_str(),
                "connect",
                "process exited during startup",
            );
            error!("Failed to start process {}: {}", name, e);
            abort_launch(name.as_str(), &state, &mut watcher, &options).await;
            return Err(e);
        }

        let mut ping = PingSchedule::new(
            name.as_str(),
            PingConfig {
                interval: options.ping_interval,
                timeout: options.ping_timeout,
                failure_threshold: options.ping_failure_threshold,
            },
        );
        {
            let state = Arc::clone(&state);
            let events = events.clone();
            let name = name.to_string();
            ping.set_unhealthy_callback(move |status: &HealthStatus| {
                let reason = status
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| "ping failed".to_string());
                let transitioned = {
                    let mut sm = state.lock();
                    sm.current_state() == ProcessState::Running
                        && sm.transition_to_unhealthy(reason.clone()).is_ok()
                };
                if transitioned {
                    let _ = events.send(SupervisorEvent::Unhealthy {
                        name: name.clone(),
                        reason,
                        consecutive_failures: status.consecutive_failures,
                    });
                }
            });
        }
        ping.start(Arc::clone(&remote) as Arc<dyn LivenessProbe>);

        info!("Process {} launched, management endpoint {}", name, endpoint);
        let _ = events.send(SupervisorEvent::ManagementConnected {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
        });

        Ok(Self {
            spec,
            options,
            pid,
            state,
            events,
            remote,
            ping,
            watcher,
            output_cancel,
            stop_requested: false,
        })
    }

    /// Ask the worker whether it finished initializing.
    pub async fn is_ready(&self) -> ProcessResult<bool> {
        self.remote.is_ready().await
    }

    /// Stop the worker and release everything the supervisor owns.
    ///
    /// Asks the worker to exit over the management channel, escalating to a
    /// termination signal if that call fails and to a kill if the worker
    /// does not exit within `stop_timeout`. Calling it again is a no-op.
    pub async fn stop(&mut self) -> ProcessResult<()> {
        let name = self.name().to_string();
        if self.stop_requested {
            debug!("Stop already requested for {}", name);
            return Ok(());
        }
        self.stop_requested = true;

        let already_exited = {
            let mut sm = self.state.lock();
            match sm.current_state() {
                ProcessState::Stopped => true,
                _ => {
                    sm.transition_to_stopping()?;
                    false
                }
            }
        };
        info!("Stopping process {} (PID: {})", name, self.pid);
        let _ = self.events.send(SupervisorEvent::StopRequested { name: name.clone() });

        self.ping.cancel();
        self.ping.join().await;

        if !already_exited && !self.watcher.has_exited() {
            match tokio::time::timeout(self.options.stop_timeout, self.remote.stop()).await {
                Ok(Ok(())) => debug!("Stop accepted by {}", name),
                Ok(Err(e)) => {
                    warn!("Remote stop failed for {}: {}, sending termination signal", name, e);
                    self.signal_terminate();
                }
                Err(_) => {
                    warn!(
                        "Remote stop for {} not answered within {:?}, sending termination signal",
                        name, self.options.stop_timeout
                    );
                    self.signal_terminate();
                }
            }
        }

        if !self.wait_for_exit_confirmed(self.options.stop_timeout).await? {
            warn!(
                "Process {} (PID: {}) did not exit within {:?}, force killing",
                name, self.pid, self.options.stop_timeout
            );
            self.force_kill();
            if !self
                .wait_for_exit_confirmed(self.options.force_kill_timeout)
                .await?
            {
                error!("Process {} (PID: {}) survived force kill", name, self.pid);
                return Err(ProcessError::timeout(
                    name,
                    format!(
                        "stop (did not exit after {:?} + force-kill timeout {:?})",
                        self.options.stop_timeout, self.options.force_kill_timeout
                    ),
                ));
            }
        }

        self.watcher.join().await;
        match self.watcher.exit_info() {
            Some(exit) => info!("Process {} stopped ({})", name, exit),
            None => info!("Process {} stopped", name),
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        self.spec.name().as_str()
    }

    pub fn port(&self) -> u16 {
        self.spec.management_port()
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    pub fn state(&self) -> ProcessState {
        self.state.lock().current_state()
    }

    pub fn health(&self) -> HealthStatus {
        self.ping.health()
    }

    pub fn is_ping_active(&self) -> bool {
        self.ping.is_active()
    }

    pub fn has_exited(&self) -> bool {
        self.watcher.has_exited()
    }

    pub fn exit_info(&self) -> Option<ExitInfo> {
        self.watcher.exit_info()
    }

    /// Wait until the worker exits, for whatever reason.
    pub async fn wait_for_exit(&self) -> Option<ExitInfo> {
        self.watcher.wait().await
    }

    /// Exit notifications as a watch channel.
    pub fn exit_receiver(&self) -> watch::Receiver<Option<ExitInfo>> {
        self.watcher.subscribe()
    }

    /// Events from now on. Pass a sender through
    /// [`SupervisorOptions::with_events`] to also see launch events.
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

    /// Drain reports of both output streams, available after exit.
    pub fn gobbler_reports(&self) -> Vec<GobblerReport> {
        self.watcher.gobbler_reports()
    }

    /// Read errors captured on the worker's output streams.
    pub fn stream_errors(&self) -> Vec<ProcessError> {
        self.gobbler_reports()
            .into_iter()
            .filter_map(|r| {
                r.error
                    .map(|e| e.into_process_error(self.name(), r.stream.to_string()))
            })
            .collect()
    }

    fn build_sink(name: &ProcessName, options: &SupervisorOptions) -> ProcessResult<Arc<dyn LineSink>> {
        if let Some(sink) = options.sink.clone() {
            return Ok(sink);
        }
        match &options.output_file {
            Some(path) => {
                let file = FileLineSink::open(path).map_err(|e| {
                    ProcessError::configuration(
                        name.as_str(),
                        "output file",
                        format!("cannot open '{}': {}", path.display(), e),
                    )
                })?;
                Ok(Arc::new(
                    FanoutLineSink::new()
                        .with(Arc::new(TracingLineSink))
                        .with(Arc::new(file)),
                ))
            }
            None => Ok(Arc::new(TracingLineSink)),
        }
    }

    fn signal_terminate(&self) {
        if self.watcher.has_exited() {
            return;
        }
        if let Err(e) = terminate_gracefully(self.pid) {
            warn!("Failed to signal process {} (PID: {}): {}", self.name(), self.pid, e);
        }
    }

    fn force_kill(&self) {
        if self.watcher.is_finished() {
            // No handle left to kill through
            if let Err(e) = force_kill(self.pid) {
                error!("Force kill failed for {} (PID: {}): {}", self.name(), self.pid, e);
            }
        } else {
            self.watcher.force_kill();
        }
    }

    /// True once the exit is confirmed within `limit`. Prefers the watcher,
    /// which owns the child; falls back to a PID check if it is gone.
    async fn wait_for_exit_confirmed(&self, limit: Duration) -> ProcessResult<bool> {
        match self.watcher.wait_timeout(limit).await {
            ExitWait::Exited(_) => Ok(true),
            ExitWait::TimedOut => Ok(false),
            ExitWait::WatcherGone => {
                warn!("Exit watcher for {} is gone, polling PID {}", self.name(), self.pid);
                let deadline = Instant::now() + limit;
                loop {
                    if !process_exists(self.pid)? {
                        return Ok(true);
                    }
                    if Instant::now() >= deadline {
                        return Ok(false);
                    }
                    tokio::time::sleep(EXIT_POLL_INTERVAL).await;
                }
            }
        }
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        self.ping.abort();
        self.output_cancel.cancel();
        if !self.watcher.is_finished() {
            debug!("Supervisor for {} dropped with a live watcher", self.name());
        }
        self.watcher.abort();
    }
}

/// Grace interval, then connect attempts with exponential backoff until
/// `connect_timeout`. Gives up early once the worker has exited.
async fn connect_with_retry(
    name: &str,
    endpoint: &ManagementEndpoint,
    options: &SupervisorOptions,
    watcher: &ExitWatcher,
) -> ProcessResult<RemoteHandle> {
    let exited_during_startup = |exit: ExitInfo| {
        ProcessError::management_channel(
            name,
            "connect",
            format!("process exited during startup ({})", exit),
        )
    };

    debug!(
        "Waiting {:?} before connecting to {}",
        options.grace_interval, endpoint
    );
    if let ExitWait::Exited(exit) = watcher.wait_timeout(options.grace_interval).await {
        return Err(exited_during_startup(exit));
    }

    let deadline = Instant::now() + options.connect_timeout;
    let mut backoff = options.connect_initial_backoff;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        if let Some(exit) = watcher.exit_info() {
            return Err(exited_during_startup(exit));
        }

        match RemoteHandle::connect(name, endpoint.clone()).await {
            Ok(remote) => {
                info!(
                    "Connected to management endpoint of {} (attempt {})",
                    name, attempt
                );
                return Ok(remote);
            }
            Err(e) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(ProcessError::management_channel(
                        name,
                        "connect",
                        format!(
                            "gave up after {} attempts within {:?}: {}",
                            attempt, options.connect_timeout, e
                        ),
                    ));
                }
                debug!("Connect attempt {} for {} failed: {}", attempt, name, e);

                let delay = backoff.min(deadline - now);
                if let ExitWait::Exited(exit) = watcher.wait_timeout(delay).await {
                    return Err(exited_during_startup(exit));
                }
                backoff = options.next_backoff(backoff);
            }
        }
    }
}

/// Tear down a launch that will not complete: kill the worker and wait for
/// the watcher so no task outlives the failed launch.
async fn abort_launch(
    name: &str,
    state: &Mutex<ProcessStateMachine>,
    watcher: &mut ExitWatcher,
    options: &SupervisorOptions,
) {
    {
        // Our own kill is not an unexpected exit
        let mut sm = state.lock();
        if sm.current_state().is_unrequested() {
            let _ = sm.transition_to_stopping();
        }
    }

    if !watcher.has_exited() {
        watcher.force_kill();
    }
    let limit = options.force_kill_timeout + options.gobbler_join_timeout;
    if tokio::time::timeout(limit, watcher.join()).await.is_err() {
        error!("Process {} did not go away after launch failure", name);
        watcher.abort();
    }
}
