//! Resource records - Processes, listening ports and system-wide load

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scheduler state of a process as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProcessState {
    Running,
    Sleeping,
    Idle,
    Stopped,
    Zombie,
    Dead,
    #[default]
    Unknown,
}

impl ProcessState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Sleeping => "Sleeping",
            Self::Idle => "Idle",
            Self::Stopped => "Stopped",
            Self::Zombie => "Zombie",
            Self::Dead => "Dead",
            Self::Unknown => "Unknown",
        }
    }
}

impl From<sysinfo::ProcessStatus> for ProcessState {
    fn from(status: sysinfo::ProcessStatus) -> Self {
        use sysinfo::ProcessStatus;
        match status {
            ProcessStatus::Run => Self::Running,
            ProcessStatus::Sleep | ProcessStatus::UninterruptibleDiskSleep => Self::Sleeping,
            ProcessStatus::Idle => Self::Idle,
            ProcessStatus::Stop | ProcessStatus::Tracing => Self::Stopped,
            ProcessStatus::Zombie => Self::Zombie,
            ProcessStatus::Dead => Self::Dead,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.label())
    }
}

/// One running process, as sampled by a single process tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    /// OS process id (may be reused after the process exits)
    pub pid: u32,
    /// Executable name, not unique
    pub name: String,
    /// Instantaneous CPU usage percentage
    pub cpu_usage: f32,
    /// Resident memory in bytes
    pub memory: u64,
    pub status: ProcessState,
}

impl ProcessRecord {
    pub fn memory_string(&self) -> String {
        format_bytes(self.memory)
    }

    pub fn cpu_string(&self) -> String {
        format!("{:.1}%", self.cpu_usage)
    }
}

/// System-wide load snapshot
///
/// Produced by a separate backend call from the process list, so the two may
/// disagree slightly while processes come and go.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub total_processes: usize,
    /// Aggregate CPU usage percentage
    pub total_cpu_usage: f32,
    /// Total physical memory in bytes
    pub total_memory: u64,
    /// Used physical memory in bytes
    pub used_memory: u64,
}

impl SystemStats {
    /// Memory usage percentage
    pub fn memory_percent(&self) -> f32 {
        if self.total_memory > 0 {
            (self.used_memory as f32 / self.total_memory as f32) * 100.0
        } else {
            0.0
        }
    }

    pub fn total_memory_string(&self) -> String {
        format_bytes(self.total_memory)
    }

    pub fn used_memory_string(&self) -> String {
        format_bytes(self.used_memory)
    }
}

/// Identity of the machine being watched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    /// Operating system name, e.g. "Ubuntu" or "Darwin"
    pub os: String,
    pub version: String,
    pub hostname: String,
}

impl HostInfo {
    /// One-line summary, e.g. `build-01 (Ubuntu 24.04)`
    pub fn summary(&self) -> String {
        if self.version.is_empty() {
            format!("{} ({})", self.hostname, self.os)
        } else {
            format!("{} ({} {})", self.hostname, self.os, self.version)
        }
    }
}

/// Transport protocol of a port binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.label())
    }
}

/// A port held open by a process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    pub port: u16,
    /// Owning process id
    pub pid: u32,
    /// Owning process name; best-effort, empty if the owner already exited
    pub process_name: String,
    pub protocol: Protocol,
}

impl PortBinding {
    /// Identity of a binding within one port snapshot
    pub fn key(&self) -> (u16, u32) {
        (self.port, self.pid)
    }
}

/// Outcome of one kill request, kept for the operator's history view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillRecord {
    pub pid: u32,
    /// Name from the process list at the time of the request, if known
    pub process_name: String,
    pub requested_at: DateTime<Utc>,
    pub success: bool,
    /// Backend error message for failed requests
    pub message: Option<String>,
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
