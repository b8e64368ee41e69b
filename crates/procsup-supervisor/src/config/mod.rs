use crate::events::SupervisorEvent;
use anyhow::{Context, Result};
use procsup_log_collection::LineSink;
use procsup_process::{PortProvider, WorkerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

pub mod validation;

/// Top-level configuration file of the `procsup` binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorFileConfig {
    #[serde(default)]
    pub supervisor: SupervisorOptions,
    pub worker: WorkerConfig,
}

/// Supervisor tuning options
#[derive(Clone, Serialize, Deserialize)]
pub struct SupervisorOptions {
    /// Host the management endpoint is reached on
    #[serde(default = "default_management_host")]
    pub management_host: String,

    /// Delay between spawn and the first connect attempt
    #[serde(default = "default_grace_interval", with = "duration_serde")]
    pub grace_interval: Duration,

    /// Total budget for connect attempts after the grace interval
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    #[serde(default = "default_connect_initial_backoff", with = "duration_serde")]
    pub connect_initial_backoff: Duration,

    #[serde(default = "default_connect_max_backoff", with = "duration_serde")]
    pub connect_max_backoff: Duration,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Fixed delay between pings
    #[serde(default = "default_ping_interval", with = "duration_serde")]
    pub ping_interval: Duration,

    /// Per-ping timeout; unset waits for the transport
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "option_duration_serde"
    )]
    pub ping_timeout: Option<Duration>,

    /// Consecutive failed pings before the worker is declared unhealthy
    #[serde(default = "default_ping_failure_threshold")]
    pub ping_failure_threshold: u32,

    /// How long `stop()` waits for the worker to exit on its own
    #[serde(default = "default_stop_timeout", with = "duration_serde")]
    pub stop_timeout: Duration,

    /// How long `stop()` waits after force killing
    #[serde(default = "default_force_kill_timeout", with = "duration_serde")]
    pub force_kill_timeout: Duration,

    /// Bound on draining each output stream after exit
    #[serde(default = "default_gobbler_join_timeout", with = "duration_serde")]
    pub gobbler_join_timeout: Duration,

    /// Also append worker console lines to this file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<PathBuf>,

    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Port source; defaults to an ephemeral port on `management_host`
    #[serde(skip)]
    pub port_provider: Option<Arc<dyn PortProvider>>,

    /// Line sink for worker output; defaults to tracing (plus `output_file`)
    #[serde(skip)]
    pub sink: Option<Arc<dyn LineSink>>,

    /// Event channel to publish on. Lets callers observe events emitted
    /// before `launch` returns, including those of a failed launch.
    #[serde(skip)]
    pub events: Option<broadcast::Sender<SupervisorEvent>>,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            management_host: default_management_host(),
            grace_interval: default_grace_interval(),
            connect_timeout: default_connect_timeout(),
            connect_initial_backoff: default_connect_initial_backoff(),
            connect_max_backoff: default_connect_max_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            ping_interval: default_ping_interval(),
            ping_timeout: None,
            ping_failure_threshold: default_ping_failure_threshold(),
            stop_timeout: default_stop_timeout(),
            force_kill_timeout: default_force_kill_timeout(),
            gobbler_join_timeout: default_gobbler_join_timeout(),
            output_file: None,
            event_capacity: default_event_capacity(),
            log_level: default_log_level(),
            port_provider: None,
            sink: None,
            events: None,
        }
    }
}

impl std::fmt::Debug for SupervisorOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorOptions")
            .field("management_host", &self.management_host)
            .field("grace_interval", &self.grace_interval)
            .field("connect_timeout", &self.connect_timeout)
            .field("connect_initial_backoff", &self.connect_initial_backoff)
            .field("connect_max_backoff", &self.connect_max_backoff)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("ping_interval", &self.ping_interval)
            .field("ping_timeout", &self.ping_timeout)
            .field("ping_failure_threshold", &self.ping_failure_threshold)
            .field("stop_timeout", &self.stop_timeout)
            .field("force_kill_timeout", &self.force_kill_timeout)
            .field("gobbler_join_timeout", &self.gobbler_join_timeout)
            .field("output_file", &self.output_file)
            .field("event_capacity", &self.event_capacity)
            .field("log_level", &self.log_level)
            .field("custom_port_provider", &self.port_provider.is_some())
            .field("custom_sink", &self.sink.is_some())
            .field("external_events", &self.events.is_some())
            .finish()
    }
}

impl SupervisorOptions {
    pub fn with_port_provider(mut self, provider: Arc<dyn PortProvider>) -> Self {
        self.port_provider = Some(provider);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn LineSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_events(mut self, events: broadcast::Sender<SupervisorEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Next connect backoff, capped at `connect_max_backoff`.
    pub fn next_backoff(&self, current: Duration) -> Duration {
        let scaled = current.as_secs_f64() * self.backoff_multiplier.max(1.0);
        Duration::try_from_secs_f64(scaled)
            .unwrap_or(self.connect_max_backoff)
            .min(self.connect_max_backoff)
    }
}

impl SupervisorFileConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: SupervisorFileConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;

        validation::validate_config(&config)?;

        Ok(config)
    }
}

fn default_management_host() -> String {
    "127.0.0.1".to_string()
}

fn default_grace_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_connect_initial_backoff() -> Duration {
    Duration::from_millis(100)
}

fn default_connect_max_backoff() -> Duration {
    Duration::from_secs(2)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_ping_interval() -> Duration {
    Duration::from_secs(3)
}

fn default_ping_failure_threshold() -> u32 {
    1
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_force_kill_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_gobbler_join_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_event_capacity() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

// Durations are written as "250ms", "2s" or "1m"
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn format_duration(duration: &Duration) -> String {
        if duration.subsec_millis() == 0 {
            format!("{}s", duration.as_secs())
        } else {
            format!("{}ms", duration.as_millis())
        }
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        // Check for "ms" BEFORE "s" since "ms" ends with 's'
        if let Some(num_str) = s.strip_suffix("ms") {
            let millis: u64 = num_str
                .trim()
                .parse()
                .map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_millis(millis))
        } else if let Some(num_str) = s.strip_suffix('s') {
            let secs: u64 = num_str
                .trim()
                .parse()
                .map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_secs(secs))
        } else if let Some(num_str) = s.strip_suffix('m') {
            let mins: u64 = num_str
                .trim()
                .parse()
                .map_err(|_| format!("Invalid duration: {}", s))?;
            mins.checked_mul(60)
                .map(Duration::from_secs)
                .ok_or_else(|| format!("Duration out of range: {}", s))
        } else {
            Err(format!("Duration must end with 's', 'ms', or 'm': {}", s))
        }
    }
}

mod option_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_str(&super::duration_serde::format_duration(d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        match s {
            Some(s) => super::duration_serde::parse_duration(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
