use async_trait::async_trait;
use clap::Parser;
use procsup_management::{ManagedWorker, ManagementServer, WorkerEnvironment};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use e2e_tests::{
    modes, CRASH_AFTER_PROPERTY, FAIL_PINGS_AFTER_PROPERTY, LINES_PROPERTY, READY_DELAY_PROPERTY,
};

/// Test worker for procsup E2E testing
#[derive(Parser, Debug)]
#[command(name = "testworker")]
#[command(about = "Worker process used by the procsup E2E tests", long_about = None)]
struct Args {
    #[arg(long)]
    management_enabled: bool,

    #[arg(long)]
    management_port: u16,

    #[arg(long, default_value = "false")]
    management_authenticate: String,

    #[arg(long, default_value = "false")]
    management_ssl: String,

    /// Platform-separated resource list
    #[arg(long, default_value = "")]
    resource_path: String,

    /// Behavior to exhibit
    entry_point: String,
}

struct TestWorker {
    ready: AtomicBool,
    ignore_stop: bool,
    fail_pings_after: Option<Duration>,
    started: Instant,
    shutdown: CancellationToken,
}

#[async_trait]
impl ManagedWorker for TestWorker {
    async fn ping(&self) -> bool {
        match self.fail_pings_after {
            Some(after) => self.started.elapsed() < after,
            None => true,
        }
    }

    async fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn stop(&self) {
        if self.ignore_stop {
            warn!("Ignoring stop request");
        } else {
            info!("Stop requested");
            self.shutdown.cancel();
        }
    }
}

fn env_millis(key: &str, default: u64) -> Duration {
    let millis = std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default);
    Duration::from_millis(millis)
}

#[tokio::main]
async fn main() {
    // Diagnostics go to stderr; stdout carries only the worker's own lines
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    let args = Args::parse();
    info!("Starting testworker with args: {:?}", args);

    let env = match WorkerEnvironment::from_env() {
        Ok(env) => env,
        Err(e) => {
            error!("Invalid worker environment: {}", e);
            std::process::exit(2);
        }
    };
    if env.management_port != args.management_port {
        warn!(
            "Port argument {} differs from environment {}",
            args.management_port, env.management_port
        );
    }
    if !args.management_enabled {
        error!("Management must be enabled");
        std::process::exit(2);
    }
    if args.management_authenticate != "false" || args.management_ssl != "false" {
        warn!("Authentication and SSL are not supported, serving plain HTTP");
    }

    let mode = args.entry_point.as_str();
    println!("{} starting in mode {}", env.name, mode);

    match mode {
        modes::CRASH => {
            eprintln!("fatal: crashing on purpose");
            std::process::exit(3);
        }
        modes::SILENT => {
            info!("Silent mode, never opening the management endpoint");
            loop {
                sleep(Duration::from_secs(3600)).await;
            }
        }
        _ => {}
    }

    if mode == modes::CHATTY {
        let lines: u32 = std::env::var(LINES_PROPERTY)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        for i in 1..=lines {
            println!("line-{}", i);
            eprintln!("err-{}", i);
        }
    }

    let ignore_stop = mode == modes::IGNORE_STOP;
    if ignore_stop {
        ignore_termination_signal();
    }

    let shutdown = CancellationToken::new();
    let worker = Arc::new(TestWorker {
        ready: AtomicBool::new(false),
        ignore_stop,
        fail_pings_after: (mode == modes::UNRESPONSIVE)
            .then(|| env_millis(FAIL_PINGS_AFTER_PROPERTY, 500)),
        started: Instant::now(),
        shutdown: shutdown.clone(),
    });

    let server = match ManagementServer::bind(
        "127.0.0.1",
        args.management_port,
        env.name.as_str(),
        worker.clone(),
    )
    .await
    {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to bind management port {}: {}", args.management_port, e);
            std::process::exit(2);
        }
    };
    let server_task = tokio::spawn(server.serve(shutdown.clone()));

    tokio::select! {
        _ = sleep(env_millis(READY_DELAY_PROPERTY, 0)) => {
            worker.ready.store(true, Ordering::SeqCst);
            println!("{} ready", env.name);
        }
        _ = shutdown.cancelled() => info!("Stopped before becoming ready"),
    }

    if mode == modes::CRASH_AFTER_READY {
        tokio::select! {
            _ = sleep(env_millis(CRASH_AFTER_PROPERTY, 500)) => {
                eprintln!("fatal: crashing after ready");
                std::process::exit(3);
            }
            _ = shutdown.cancelled() => {}
        }
    }

    shutdown.cancelled().await;
    if let Err(e) = server_task.await {
        error!("Management server failed: {}", e);
    }
    // Let the stop response reach the supervisor
    sleep(Duration::from_millis(100)).await;
    println!("{} stopped", env.name);
}

#[cfg(unix)]
fn ignore_termination_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::spawn(async move {
                while sigterm.recv().await.is_some() {
                    warn!("Ignoring SIGTERM");
                }
            });
        }
        Err(e) => error!("Failed to install SIGTERM handler: {}", e),
    }
}

#[cfg(not(unix))]
fn ignore_termination_signal() {}
