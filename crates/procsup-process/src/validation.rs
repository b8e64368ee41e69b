//! Launch input validation.

use procsup_common::{ProcessError, ProcessResult};
use std::path::Path;

/// Validate that the working directory exists and is a directory.
pub fn validate_working_directory(id: &str, dir: &Path) -> ProcessResult<()> {
    match std::fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(ProcessError::configuration(
            id,
            "directory check",
            format!("working directory '{}' is not a directory", dir.display()),
        )),
        Err(e) => Err(ProcessError::configuration(
            id,
            "directory check",
            format!("working directory '{}' does not exist: {}", dir.display(), e),
        )),
    }
}

/// Validate that an executable has been named.
///
/// Resolution against `PATH` is left to the OS at spawn time; a missing
/// binary surfaces there as a spawn failure.
pub fn validate_executable(id: &str, executable: &Path) -> ProcessResult<()> {
    if executable.as_os_str().is_empty() {
        return Err(ProcessError::configuration(
            id,
            "executable check",
            "executable path cannot be empty",
        ));
    }
    Ok(())
}

/// Validate the entry point identifier passed as the last launch argument.
pub fn validate_entry_point(id: &str, entry_point: &str) -> ProcessResult<()> {
    if entry_point.trim().is_empty() {
        return Err(ProcessError::configuration(
            id,
            "entry point check",
            "entry point cannot be empty",
        ));
    }
    Ok(())
}
