//! Windows process termination

use windows::Win32::Foundation::{CloseHandle, ERROR_ACCESS_DENIED, ERROR_INVALID_PARAMETER, FALSE};
use windows::Win32::System::Threading::{
    GetExitCodeProcess, OpenProcess, TerminateProcess, PROCESS_QUERY_LIMITED_INFORMATION,
    PROCESS_TERMINATE,
};

use crate::core::backend::{BackendError, BackendResult};

/// Terminate a process with exit code 0
///
/// Windows has no SIGTERM equivalent for arbitrary processes, so both the
/// graceful and the forced path end in `TerminateProcess`.
pub fn terminate_process(pid: u32) -> BackendResult<()> {
    terminate_with_code(pid, 0)
}

/// Force kill a process
pub fn kill_process(pid: u32) -> BackendResult<()> {
    terminate_with_code(pid, 1)
}

fn terminate_with_code(pid: u32, exit_code: u32) -> BackendResult<()> {
    unsafe {
        let handle = OpenProcess(PROCESS_TERMINATE, FALSE, pid).map_err(|e| {
            if e.code() == ERROR_ACCESS_DENIED.to_hresult() {
                BackendError::PermissionDenied(pid)
            } else if e.code() == ERROR_INVALID_PARAMETER.to_hresult() {
                BackendError::NoSuchProcess(pid)
            } else {
                BackendError::Failed(format!("Failed to open process {}: {}", pid, e))
            }
        })?;

        let result = TerminateProcess(handle, exit_code);
        let _ = CloseHandle(handle);

        result.map_err(|e| BackendError::Failed(format!("Failed to kill process {}: {}", pid, e)))
    }
}

/// Check if a process is running
pub fn is_process_running(pid: u32) -> bool {
    unsafe {
        let handle = match OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, FALSE, pid) {
            Ok(h) => h,
            Err(_) => return false,
        };

        let mut exit_code: u32 = 0;
        let result = GetExitCodeProcess(handle, &mut exit_code);
        let _ = CloseHandle(handle);

        // STILL_ACTIVE = 259
        result.is_ok() && exit_code == 259
    }
}
