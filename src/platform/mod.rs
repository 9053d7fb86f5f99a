//! Platform-specific process control for Unix and Windows

#[cfg(windows)]
pub mod windows;

#[cfg(unix)]
pub mod unix;

use tracing::{debug, warn};

use crate::core::backend::{BackendError, BackendResult};

/// Terminate a process gracefully
pub fn terminate_process(pid: u32) -> BackendResult<()> {
    #[cfg(windows)]
    {
        windows::terminate_process(pid)
    }
    #[cfg(unix)]
    {
        unix::terminate_process(pid)
    }
    #[cfg(not(any(windows, unix)))]
    {
        let _ = pid;
        Err(BackendError::Unavailable("process termination".to_string()))
    }
}

/// Force kill a process
pub fn kill_process(pid: u32) -> BackendResult<()> {
    #[cfg(windows)]
    {
        windows::kill_process(pid)
    }
    #[cfg(unix)]
    {
        unix::kill_process(pid)
    }
    #[cfg(not(any(windows, unix)))]
    {
        let _ = pid;
        Err(BackendError::Unavailable("process termination".to_string()))
    }
}

/// Check if a process is running
pub fn is_process_running(pid: u32) -> bool {
    #[cfg(windows)]
    {
        windows::is_process_running(pid)
    }
    #[cfg(unix)]
    {
        unix::is_process_running(pid)
    }
    #[cfg(not(any(windows, unix)))]
    {
        let _ = pid;
        false
    }
}

/// Ask a process to exit, escalating to a forced kill if the request is
/// refused for any reason other than the process being gone
pub fn stop_process(pid: u32) -> BackendResult<()> {
    if pid == std::process::id() {
        return Err(BackendError::Failed(format!(
            "Refusing to kill the console itself (pid {})",
            pid
        )));
    }

    match terminate_process(pid) {
        Ok(()) => {
            debug!("Sent termination request to PID {}", pid);
            Ok(())
        }
        Err(e @ BackendError::NoSuchProcess(_)) => Err(e),
        Err(e) => {
            warn!("Graceful termination of PID {} failed: {}, forcing kill", pid, e);
            kill_process(pid)
        }
    }
}
