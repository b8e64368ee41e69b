//! Worker launch parameters and command building.
//!
//! Launch surface, positional:
//!
//! ```text
//! <executable> --management-enabled
//!              --management-port <port>
//!              --management-authenticate false
//!              --management-ssl false
//!              --resource-path <resources joined with the platform separator>
//!              <entry point>
//! ```
//!
//! The management channel is unauthenticated and unencrypted; it is meant
//! for the local trust boundary only.

use crate::validation::{validate_entry_point, validate_executable, validate_working_directory};
use procsup_common::{ProcessError, ProcessName, ProcessResult, NAME_PROPERTY, PORT_PROPERTY};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// What the caller wants launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Logical name, unique per supervisor.
    pub name: String,
    pub working_directory: PathBuf,
    pub executable: PathBuf,
    pub entry_point: String,
    /// Resource locations forming the worker's execution path.
    #[serde(default)]
    pub resources: Vec<PathBuf>,
    /// Extra environment properties for the worker.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl WorkerConfig {
    pub fn new(
        name: impl Into<String>,
        working_directory: impl Into<PathBuf>,
        executable: impl Into<PathBuf>,
        entry_point: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            working_directory: working_directory.into(),
            executable: executable.into(),
            entry_point: entry_point.into(),
            resources: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_resource(mut self, resource: impl Into<PathBuf>) -> Self {
        self.resources.push(resource.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Resolved, immutable launch parameters.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    name: ProcessName,
    working_directory: PathBuf,
    executable: PathBuf,
    entry_point: String,
    resources: Vec<PathBuf>,
    properties: BTreeMap<String, String>,
    management_port: u16,
}

impl ProcessSpec {
    /// Validates `config` and binds it to an allocated management port.
    pub fn resolve(config: &WorkerConfig, management_port: u16) -> ProcessResult<Self> {
        let name = ProcessName::parse(config.name.clone())?;
        validate_working_directory(name.as_str(), &config.working_directory)?;
        validate_executable(name.as_str(), &config.executable)?;
        validate_entry_point(name.as_str(), &config.entry_point)?;
        if management_port == 0 {
            return Err(ProcessError::configuration(
                name.as_str(),
                "port allocation",
                "management port must be non-zero",
            ));
        }

        let spec = Self {
            name,
            working_directory: config.working_directory.clone(),
            executable: config.executable.clone(),
            entry_point: config.entry_point.clone(),
            resources: config.resources.clone(),
            properties: config.properties.clone(),
            management_port,
        };
        // Surface separator problems now rather than at spawn
        spec.resource_path()?;
        Ok(spec)
    }

    pub fn name(&self) -> &ProcessName {
        &self.name
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn resources(&self) -> &[PathBuf] {
        &self.resources
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn management_port(&self) -> u16 {
        self.management_port
    }

    /// Resource list joined with the platform path separator.
    pub fn resource_path(&self) -> ProcessResult<OsString> {
        std::env::join_paths(&self.resources).map_err(|e| {
            ProcessError::configuration(self.name.as_str(), "resource path", e.to_string())
        })
    }

    /// Worker environment: caller properties plus the two injected keys.
    /// The injected keys win over caller properties of the same name.
    pub fn environment(&self) -> BTreeMap<String, String> {
        let mut env = self.properties.clone();
        env.insert(NAME_PROPERTY.to_string(), self.name.to_string());
        env.insert(PORT_PROPERTY.to_string(), self.management_port.to_string());
        env
    }
}

/// Positional launch arguments, executable excluded.
pub fn launch_args(spec: &ProcessSpec) -> ProcessResult<Vec<OsString>> {
    Ok(vec![
        "--management-enabled".into(),
        "--management-port".into(),
        spec.management_port().to_string().into(),
        "--management-authenticate".into(),
        "false".into(),
        "--management-ssl".into(),
        "false".into(),
        "--resource-path".into(),
        spec.resource_path()?,
        spec.entry_point().into(),
    ])
}

/// Build the worker command: piped output streams, null stdin, rooted at
/// the working directory, killed if its handle is dropped.
pub fn build_command(spec: &ProcessSpec) -> ProcessResult<Command> {
    let mut cmd = Command::new(spec.executable());
    cmd.args(launch_args(spec)?)
        .envs(spec.environment())
        .current_dir(spec.working_directory())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Keep console control events of the supervisor away from the worker
    #[cfg(windows)]
    {
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }

    Ok(cmd)
}
