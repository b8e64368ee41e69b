//! Launch-time contract as seen from inside the worker.

use procsup_common::{ProcessError, ProcessName, ProcessResult, NAME_PROPERTY, PORT_PROPERTY};

/// Logical name and management port injected by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEnvironment {
    pub name: ProcessName,
    pub management_port: u16,
}

impl WorkerEnvironment {
    /// Read the injected keys from the process environment.
    pub fn from_env() -> ProcessResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> ProcessResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_name = lookup(NAME_PROPERTY).ok_or_else(|| {
            ProcessError::configuration(
                "<unnamed>",
                "worker environment",
                format!("{} is not set", NAME_PROPERTY),
            )
        })?;
        let name = ProcessName::parse(raw_name)?;

        let raw_port = lookup(PORT_PROPERTY).ok_or_else(|| {
            ProcessError::configuration(
                name.as_str(),
                "worker environment",
                format!("{} is not set", PORT_PROPERTY),
            )
        })?;
        let management_port = match raw_port.trim().parse::<u16>() {
            Ok(port) if port != 0 => port,
            _ => {
                return Err(ProcessError::configuration(
                    name.as_str(),
                    "worker environment",
                    format!("invalid {}: {:?}", PORT_PROPERTY, raw_port),
                ))
            }
        };

        Ok(Self {
            name,
            management_port,
        })
    }
}
