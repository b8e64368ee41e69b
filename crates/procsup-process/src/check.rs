//! Process existence checking.
//!
//! Used as the fallback confirmation when the exit watcher cannot be relied
//! upon (it panicked or was aborted) while a stop is waiting for the worker.

use procsup_common::{ProcessError, ProcessResult};

/// Check if a process with the given PID exists and is running.
///
/// On Unix this uses `kill(pid, 0)`, which sends no signal but reports
/// whether the process exists. On Windows it opens a query handle.
///
/// * `Ok(true)` - Process exists
/// * `Ok(false)` - Process does not exist
/// * `Err(_)` - The check itself failed
pub fn process_exists(pid: u32) -> ProcessResult<bool> {
    #[cfg(unix)]
    {
        process_exists_unix(pid)
    }

    #[cfg(windows)]
    {
        process_exists_windows(pid)
    }
}

#[cfg(unix)]
fn process_exists_unix(pid: u32) -> ProcessResult<bool> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), None) {
        Ok(_) => Ok(true),
        Err(nix::errno::Errno::ESRCH) => Ok(false),
        // Exists, but owned by someone else
        Err(nix::errno::Errno::EPERM) => Ok(true),
        Err(e) => Err(ProcessError::configuration(
            pid.to_string(),
            "existence check",
            format!("failed to check process: {}", e),
        )),
    }
}

#[cfg(windows)]
fn process_exists_windows(pid: u32) -> ProcessResult<bool> {
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

    const ERROR_INVALID_PARAMETER: u32 = 0x80070057;
    const ERROR_ACCESS_DENIED: u32 = 0x80070005;

    unsafe {
        let handle = match OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) {
            Ok(h) => h,
            Err(e) => {
                let code = e.code().0 as u32;
                if code == ERROR_INVALID_PARAMETER || code == ERROR_ACCESS_DENIED {
                    return Ok(false);
                }
                return Err(ProcessError::configuration(
                    pid.to_string(),
                    "existence check",
                    format!("failed to check process: {}", e),
                ));
            }
        };
        let _ = CloseHandle(handle);
        Ok(true)
    }
}
