//! Identity types and the launch-time environment contract.

use crate::errors::{ProcessError, ProcessResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Environment key carrying the logical process name into the worker.
pub const NAME_PROPERTY: &str = "PROCSUP_PROCESS_NAME";

/// Environment key carrying the management port into the worker.
pub const PORT_PROPERTY: &str = "PROCSUP_MANAGEMENT_PORT";

const MAX_NAME_LEN: usize = 64;

/// Logical name of a supervised process.
///
/// The name ends up in log tags, in the worker environment and in the
/// management endpoint path, so it is restricted to ASCII alphanumerics,
/// hyphens and underscores.
///
/// # Example
/// ```
/// use procsup_common::ProcessName;
///
/// let name = ProcessName::parse("search").unwrap();
/// assert_eq!(name.as_str(), "search");
/// assert!(ProcessName::parse("no spaces").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProcessName(String);

impl ProcessName {
    /// Validates and wraps a logical name.
    pub fn parse(name: impl Into<String>) -> ProcessResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ProcessError::configuration(
                "<unnamed>",
                "name check",
                "process name cannot be empty",
            ));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(ProcessError::configuration(
                name.clone(),
                "name check",
                format!("process name too long (max {} characters)", MAX_NAME_LEN),
            ));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ProcessError::configuration(
                name.clone(),
                "name check",
                "process name can only contain alphanumeric characters, hyphens, and underscores",
            ));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Tag used for lines read from the worker's standard output.
    pub fn stdout_tag(&self) -> String {
        self.0.clone()
    }

    /// Tag used for lines read from the worker's standard error.
    pub fn stderr_tag(&self) -> String {
        format!("{}-ERROR", self.0)
    }
}

impl TryFrom<String> for ProcessName {
    type Error = ProcessError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ProcessName> for String {
    fn from(name: ProcessName) -> Self {
        name.0
    }
}

impl AsRef<str> for ProcessName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
