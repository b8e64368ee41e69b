//! Wire contract of the management channel.

use hyper::Method;
use procsup_common::ProcessName;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const PATH_PREFIX: &str = "/mgmt";

/// Remote operations exposed by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagementOp {
    Ping,
    Ready,
    Stop,
}

impl ManagementOp {
    pub fn method(&self) -> Method {
        match self {
            ManagementOp::Ping | ManagementOp::Ready => Method::GET,
            ManagementOp::Stop => Method::POST,
        }
    }

    fn segment(&self) -> &'static str {
        match self {
            ManagementOp::Ping => "ping",
            ManagementOp::Ready => "ready",
            ManagementOp::Stop => "stop",
        }
    }

    /// Request path for this operation on `object_name`.
    pub fn path(&self, object_name: &str) -> String {
        format!("{}/{}/{}", PATH_PREFIX, object_name, self.segment())
    }

    /// Inverse of [`ManagementOp::path`]; `None` for foreign paths.
    pub fn from_path(object_name: &str, path: &str) -> Option<Self> {
        let rest = path.strip_prefix(PATH_PREFIX)?.strip_prefix('/')?;
        let segment = rest.strip_prefix(object_name)?.strip_prefix('/')?;
        match segment {
            "ping" => Some(ManagementOp::Ping),
            "ready" => Some(ManagementOp::Ready),
            "stop" => Some(ManagementOp::Stop),
            _ => None,
        }
    }
}

impl fmt::Display for ManagementOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagementOp::Ready => write!(f, "is_ready"),
            op => write!(f, "{}", op.segment()),
        }
    }
}

/// Body of a `ready` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyResponse {
    pub ready: bool,
}

/// Body of a `stop` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopResponse {
    pub accepted: bool,
}

/// Where a worker's management object lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementEndpoint {
    pub host: String,
    pub port: u16,
    /// Object name the operations are addressed to; the logical name.
    pub object_name: String,
}

impl ManagementEndpoint {
    pub fn new(host: impl Into<String>, port: u16, name: &ProcessName) -> Self {
        Self {
            host: host.into(),
            port,
            object_name: name.as_str().to_string(),
        }
    }

    /// Loopback endpoint, the default trust boundary.
    pub fn local(port: u16, name: &ProcessName) -> Self {
        Self::new("127.0.0.1", port, name)
    }

    /// `host:port`, as sent in the `Host` header.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn path(&self, op: ManagementOp) -> String {
        op.path(&self.object_name)
    }
}

impl fmt::Display for ManagementEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http://{}{}/{}", self.authority(), PATH_PREFIX, self.object_name)
    }
}
