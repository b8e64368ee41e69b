//! Core types for log collection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stream type (stdout or stderr)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Stdout,
    Stderr,
}

impl std::fmt::Display for StreamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamType::Stdout => write!(f, "stdout"),
            StreamType::Stderr => write!(f, "stderr"),
        }
    }
}

/// One line read from a worker stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    /// Stream tag, e.g. `search` or `search-ERROR`
    pub tag: String,
    pub stream: StreamType,
    /// 1-based position of the line within its stream
    pub line_num: u64,
    pub line: String,
}

impl LogEntry {
    /// Sink format: `<tag> > <line>`.
    pub fn tagged(&self) -> String {
        format!("{} > {}", self.tag, self.line)
    }
}
