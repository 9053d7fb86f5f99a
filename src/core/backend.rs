//! Backend data source - The boundary the controller polls and mutates through

use thiserror::Error;

use super::resource::{HostInfo, PortBinding, ProcessRecord, SystemStats};

/// Failure reported by a backend call
///
/// The controller never inspects the cause beyond "read failed" versus
/// "kill failed"; the message is passed through to the caller as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("{0}")]
    Failed(String),
    #[error("no such process: {0}")]
    NoSuchProcess(u32),
    #[error("permission denied for process {0}")]
    PermissionDenied(u32),
    #[error("{0} is not available on this system")]
    Unavailable(String),
    #[error("backend call aborted: {0}")]
    Aborted(String),
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Source of process, stats and port data plus the kill operation
///
/// Calls are blocking and may fail independently of each other; the
/// controller runs them off the async runtime.
pub trait Backend: Send + Sync + 'static {
    /// Running processes, most CPU-intensive first
    fn list_processes(&self) -> BackendResult<Vec<ProcessRecord>>;

    fn system_stats(&self) -> BackendResult<SystemStats>;

    /// OS name, OS version and hostname of the machine
    fn host_info(&self) -> BackendResult<HostInfo>;

    /// Ports currently held open, sorted by port
    fn list_port_bindings(&self) -> BackendResult<Vec<PortBinding>>;

    /// Terminate a process. `Ok` only when the backend confirms the signal
    /// was delivered.
    fn kill_process(&self, pid: u32) -> BackendResult<()>;
}
