use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use procsup_supervisor::{ProcessSupervisor, SupervisorEvent, SupervisorFileConfig};

/// procsup - supervise a single worker process
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Seconds to wait for the worker to report ready
    #[arg(long, default_value = "60")]
    ready_timeout: u64,

    /// Interval in milliseconds between readiness polls
    #[arg(long, default_value = "250")]
    ready_poll_ms: u64,
}

enum RunOutcome {
    Signal,
    Exited,
    Unhealthy(String),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = SupervisorFileConfig::load_from_file(&args.config)?;

    initialize_logging(args.debug, &config.supervisor.log_level)?;

    info!("Starting procsup");
    info!("Config file: {}", args.config);

    let (events, mut event_rx) = broadcast::channel(config.supervisor.event_capacity);
    let options = config.supervisor.clone().with_events(events);

    let mut supervisor = ProcessSupervisor::launch(&config.worker, options)
        .await
        .map_err(|e| anyhow!("Launch failed: {}", e))?;
    info!(
        "Worker {} running (PID: {}, management port: {})",
        supervisor.name(),
        supervisor.pid(),
        supervisor.port()
    );

    let ready_timeout = Duration::from_secs(args.ready_timeout);
    let poll = Duration::from_millis(args.ready_poll_ms.max(10));
    if let Err(e) = wait_until_ready(&supervisor, ready_timeout, poll).await {
        error!("Worker {} did not become ready: {:#}", supervisor.name(), e);
        supervisor
            .stop()
            .await
            .map_err(|e| anyhow!("Shutdown failed: {}", e))?;
        return Err(e);
    }
    info!("Worker {} is ready", supervisor.name());

    let outcome = tokio::select! {
        result = setup_signal_handlers() => {
            result?;
            RunOutcome::Signal
        }
        _ = supervisor.wait_for_exit() => RunOutcome::Exited,
        reason = wait_for_unhealthy(&mut event_rx) => RunOutcome::Unhealthy(reason),
    };

    info!("Shutting down worker {}...", supervisor.name());
    supervisor
        .stop()
        .await
        .map_err(|e| anyhow!("Shutdown failed: {}", e))?;

    match outcome {
        RunOutcome::Signal => {
            info!("Worker shut down successfully");
            Ok(())
        }
        RunOutcome::Exited => match supervisor.exit_info() {
            Some(exit) => match exit.unexpected_error(supervisor.name()) {
                Some(e) => Err(e.into()),
                None => {
                    info!("Worker {} finished ({})", supervisor.name(), exit);
                    Ok(())
                }
            },
            None => Err(anyhow!(
                "Worker {} finished with unknown exit status",
                supervisor.name()
            )),
        },
        RunOutcome::Unhealthy(reason) => Err(anyhow!(
            "Worker {} became unhealthy: {}",
            supervisor.name(),
            reason
        )),
    }
}

fn initialize_logging(debug: bool, configured_level: &str) -> Result<()> {
    let level = if debug { "debug" } else { configured_level };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    Ok(())
}

async fn wait_until_ready(
    supervisor: &ProcessSupervisor,
    timeout: Duration,
    poll: Duration,
) -> Result<()> {
    tokio::time::timeout(timeout, poll_ready(supervisor, poll))
        .await
        .map_err(|_| anyhow!("not ready after {:?}", timeout))?
}

async fn poll_ready(supervisor: &ProcessSupervisor, poll: Duration) -> Result<()> {
    loop {
        if supervisor.is_ready().await? {
            return Ok(());
        }
        if let Some(exit) = supervisor.exit_info() {
            return Err(anyhow!("worker exited before becoming ready ({})", exit));
        }
        tokio::time::sleep(poll).await;
    }
}

async fn wait_for_unhealthy(events: &mut broadcast::Receiver<SupervisorEvent>) -> String {
    loop {
        match events.recv().await {
            Ok(SupervisorEvent::Unhealthy { reason, .. }) => return reason,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Missed {} supervisor events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}

async fn setup_signal_handlers() -> Result<()> {
    use tokio::signal;

    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to create SIGTERM handler")?;
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .context("Failed to create SIGINT handler")?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT signal");
            }
        }
    }

    #[cfg(windows)]
    {
        signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        info!("Received Ctrl+C signal");
    }

    Ok(())
}
