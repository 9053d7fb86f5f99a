//! Unix signal delivery

use crate::core::backend::{BackendError, BackendResult};

/// Terminate a process gracefully (SIGTERM)
pub fn terminate_process(pid: u32) -> BackendResult<()> {
    send_signal(pid, libc::SIGTERM)
}

/// Force kill a process (SIGKILL)
pub fn kill_process(pid: u32) -> BackendResult<()> {
    send_signal(pid, libc::SIGKILL)
}

/// Check if a process is running
pub fn is_process_running(pid: u32) -> bool {
    match to_pid_t(pid) {
        // kill with signal 0 checks if process exists without sending a signal
        Some(raw) => unsafe { libc::kill(raw, 0) == 0 },
        None => false,
    }
}

fn to_pid_t(pid: u32) -> Option<libc::pid_t> {
    // 0 and negative values address process groups, never a single process
    libc::pid_t::try_from(pid).ok().filter(|p| *p > 0)
}

fn send_signal(pid: u32, signal: libc::c_int) -> BackendResult<()> {
    let raw = to_pid_t(pid).ok_or(BackendError::NoSuchProcess(pid))?;
    let result = unsafe { libc::kill(raw, signal) };
    if result == 0 {
        return Ok(());
    }

    let err = std::io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::ESRCH) => Err(BackendError::NoSuchProcess(pid)),
        Some(libc::EPERM) => Err(BackendError::PermissionDenied(pid)),
        _ => Err(BackendError::Failed(format!(
            "Failed to signal process {}: {}",
            pid, err
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuses_group_addressing_pids() {
        assert_eq!(terminate_process(0), Err(BackendError::NoSuchProcess(0)));
        assert_eq!(
            kill_process(u32::MAX),
            Err(BackendError::NoSuchProcess(u32::MAX))
        );
        assert!(!is_process_running(0));
    }

    #[test]
    fn own_process_is_running() {
        assert!(is_process_running(std::process::id()));
    }
}
