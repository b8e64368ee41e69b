//! # procsup supervisor
//!
//! Launches one out-of-process worker and keeps watch over it:
//!
//! - console output drained line by line into a sink, tagged `<name>` and
//!   `<name>-ERROR`
//! - a management channel to the worker (`ping`, `is_ready`, `stop`)
//! - fixed-delay pinging with an explicit unhealthy transition
//! - exit detection that tells a requested stop from a crash
//!
//! ```no_run
//! use procsup_process::WorkerConfig;
//! use procsup_supervisor::{ProcessSupervisor, SupervisorOptions};
//!
//! # async fn run() -> procsup_common::ProcessResult<()> {
//! let config = WorkerConfig::new("search", "/srv/search", "/usr/bin/java", "org.example.Search")
//!     .with_resource("lib/search.jar");
//! let mut supervisor = ProcessSupervisor::launch(&config, SupervisorOptions::default()).await?;
//! while !supervisor.is_ready().await? {
//!     tokio::time::sleep(std::time::Duration::from_millis(200)).await;
//! }
//! supervisor.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod events;
pub mod exit_watcher;
pub mod supervisor;

pub use config::{SupervisorFileConfig, SupervisorOptions};
pub use events::{ExitInfo, SupervisorEvent};
pub use exit_watcher::{ExitWait, ExitWatcher};
pub use supervisor::ProcessSupervisor;

pub use procsup_monitoring::HealthStatus;
pub use procsup_process_state::ProcessState;
