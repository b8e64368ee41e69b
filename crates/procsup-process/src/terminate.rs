//! Process termination primitives.
//!
//! The supervisor normally asks the worker to stop over the management
//! channel. These PID-based primitives are the escalation path when that
//! channel is gone or the worker does not exit in time.

use procsup_common::{ProcessError, ProcessResult};

/// Terminate a process gracefully (SIGTERM on Unix).
///
/// Windows has no equivalent that works for a process without a shared
/// console, so this falls through to [`force_kill`] there.
pub fn terminate_gracefully(pid: u32) -> ProcessResult<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(|e| {
            ProcessError::timeout(pid.to_string(), format!("stop (SIGTERM failed: {})", e))
        })
    }

    #[cfg(windows)]
    {
        force_kill(pid)
    }
}

/// Force kill a process (SIGKILL on Unix, TerminateProcess on Windows).
pub fn force_kill(pid: u32) -> ProcessResult<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        kill(Pid::from_raw(pid as i32), Signal::SIGKILL).map_err(|e| {
            ProcessError::timeout(pid.to_string(), format!("stop (SIGKILL failed: {})", e))
        })
    }

    #[cfg(windows)]
    {
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Threading::{OpenProcess, TerminateProcess, PROCESS_TERMINATE};

        unsafe {
            let handle = match OpenProcess(PROCESS_TERMINATE, false, pid) {
                Ok(h) if !h.is_invalid() => h,
                _ => {
                    return Err(ProcessError::timeout(
                        pid.to_string(),
                        "stop (failed to open process for termination)",
                    ));
                }
            };

            let result = TerminateProcess(handle, 1);
            let _ = CloseHandle(handle);

            result.map_err(|e| {
                ProcessError::timeout(pid.to_string(), format!("stop (TerminateProcess failed: {})", e))
            })
        }
    }
}
