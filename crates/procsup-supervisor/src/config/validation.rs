use super::*;
use anyhow::{anyhow, Result};
use procsup_common::ProcessName;

/// Validate the complete configuration
pub fn validate_config(config: &SupervisorFileConfig) -> Result<()> {
    validate_options(&config.supervisor)?;
    validate_worker_config(&config.worker)?;
    Ok(())
}

/// Validate supervisor options
pub fn validate_options(options: &SupervisorOptions) -> Result<()> {
    if options.management_host.trim().is_empty() {
        return Err(anyhow!("Management host cannot be empty"));
    }

    if options.connect_timeout.is_zero() {
        return Err(anyhow!("Connect timeout must be greater than 0"));
    }

    if options.connect_initial_backoff.is_zero() {
        return Err(anyhow!("Initial connect backoff must be greater than 0"));
    }

    if options.connect_max_backoff < options.connect_initial_backoff {
        return Err(anyhow!(
            "Maximum connect backoff ({:?}) must not be below the initial backoff ({:?})",
            options.connect_max_backoff,
            options.connect_initial_backoff
        ));
    }

    if !options.backoff_multiplier.is_finite() || options.backoff_multiplier < 1.0 {
        return Err(anyhow!(
            "Backoff multiplier must be at least 1.0, got: {}",
            options.backoff_multiplier
        ));
    }

    if options.ping_interval.is_zero() {
        return Err(anyhow!("Ping interval must be greater than 0"));
    }

    if options.ping_timeout.is_some_and(|t| t.is_zero()) {
        return Err(anyhow!("Ping timeout must be greater than 0 when set"));
    }

    if options.ping_failure_threshold == 0 {
        return Err(anyhow!("Ping failure threshold must be at least 1"));
    }

    if options.stop_timeout.is_zero() || options.force_kill_timeout.is_zero() {
        return Err(anyhow!("Stop and force kill timeouts must be greater than 0"));
    }

    if options.event_capacity == 0 {
        return Err(anyhow!("Event capacity must be at least 1"));
    }

    match options.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(anyhow!(
            "Invalid log level: {}, must be one of: trace, debug, info, warn, error",
            options.log_level
        )),
    }
}

/// Validate the static parts of a worker configuration. The working
/// directory is checked at launch time, where it may have changed.
pub fn validate_worker_config(worker: &WorkerConfig) -> Result<()> {
    ProcessName::parse(worker.name.clone())?;

    if worker.executable.as_os_str().is_empty() {
        return Err(anyhow!("Executable cannot be empty for worker {}", worker.name));
    }

    if worker.entry_point.trim().is_empty() {
        return Err(anyhow!("Entry point cannot be empty for worker {}", worker.name));
    }

    if let Err(e) = std::env::join_paths(&worker.resources) {
        return Err(anyhow!("Invalid resource list for worker {}: {}", worker.name, e));
    }

    Ok(())
}
