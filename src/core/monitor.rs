//! System backend - Live process, stats and port data from the host

use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use sysinfo::{CpuRefreshKind, Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{debug, info, trace};

use super::backend::{Backend, BackendError, BackendResult};
use super::ports;
use super::resource::{HostInfo, PortBinding, ProcessRecord, SystemStats};
use super::settings::Settings;
use crate::platform;

/// Backend that reads the local machine
///
/// Keeps one `sysinfo::System` alive across ticks so CPU usage is measured
/// as the delta between consecutive refreshes.
pub struct SystemBackend {
    system: Mutex<System>,
    /// Time of the last process refresh, `None` until the first sample
    last_process_refresh: Mutex<Option<Instant>>,
    /// Set once global CPU usage has a baseline sample
    cpu_sampled: AtomicBool,
    port_range: RangeInclusive<u16>,
}

impl SystemBackend {
    pub fn new(settings: &Settings) -> Self {
        Self {
            system: Mutex::new(System::new()),
            last_process_refresh: Mutex::new(None),
            cpu_sampled: AtomicBool::new(false),
            port_range: settings.port_range_start..=settings.port_range_end,
        }
    }

    /// Whether `port` falls in the configured reporting range
    pub fn port_in_range(&self, port: u16) -> bool {
        self.port_range.contains(&port)
    }

    fn lock_system(&self) -> BackendResult<MutexGuard<'_, System>> {
        self.system
            .lock()
            .map_err(|e| BackendError::Failed(format!("System lock poisoned: {}", e)))
    }

    fn refresh_processes(&self, system: &mut System) -> BackendResult<()> {
        let mut last = self
            .last_process_refresh
            .lock()
            .map_err(|e| BackendError::Failed(format!("Refresh lock poisoned: {}", e)))?;

        let kind = ProcessRefreshKind::new().with_cpu().with_memory();
        system.refresh_processes_specifics(ProcessesToUpdate::All, true, kind);

        // CPU usage needs two samples; the very first tick takes both
        if last.is_none() {
            std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            system.refresh_processes_specifics(ProcessesToUpdate::All, true, kind);
        }
        *last = Some(Instant::now());
        Ok(())
    }
}

impl Backend for SystemBackend {
    fn list_processes(&self) -> BackendResult<Vec<ProcessRecord>> {
        let mut system = self.lock_system()?;
        self.refresh_processes(&mut system)?;

        let mut processes: Vec<ProcessRecord> = system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessRecord {
                pid: pid.as_u32(),
                name: process.name().to_string_lossy().to_string(),
                cpu_usage: process.cpu_usage(),
                memory: process.memory(),
                status: process.status().into(),
            })
            .collect();

        processes.sort_by(|a, b| b.cpu_usage.total_cmp(&a.cpu_usage));
        trace!("Listed {} processes", processes.len());
        Ok(processes)
    }

    fn system_stats(&self) -> BackendResult<SystemStats> {
        let mut system = self.lock_system()?;
        let cpu = CpuRefreshKind::new().with_cpu_usage();
        system.refresh_cpu_specifics(cpu);
        // Global CPU usage is a delta too; the first call takes both samples
        if !self.cpu_sampled.swap(true, Ordering::SeqCst) {
            std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            system.refresh_cpu_specifics(cpu);
        }
        system.refresh_memory();
        if system.processes().is_empty() {
            system.refresh_processes_specifics(
                ProcessesToUpdate::All,
                true,
                ProcessRefreshKind::new(),
            );
        }

        Ok(SystemStats {
            total_processes: system.processes().len(),
            total_cpu_usage: system.global_cpu_usage(),
            total_memory: system.total_memory(),
            used_memory: system.used_memory(),
        })
    }

    fn host_info(&self) -> BackendResult<HostInfo> {
        let unknown = || "unknown".to_string();
        Ok(HostInfo {
            os: System::name().unwrap_or_else(unknown),
            version: System::os_version().unwrap_or_default(),
            hostname: System::host_name().unwrap_or_else(unknown),
        })
    }

    fn list_port_bindings(&self) -> BackendResult<Vec<PortBinding>> {
        let mut bindings: Vec<PortBinding> = ports::scan()?
            .into_iter()
            .filter(|b| self.port_in_range(b.port))
            .collect();

        // netstat does not report owners by name; fill in from the process table
        if bindings.iter().any(|b| b.process_name.is_empty()) {
            let system = self.lock_system()?;
            for binding in bindings.iter_mut().filter(|b| b.process_name.is_empty()) {
                if let Some(process) = system.process(Pid::from_u32(binding.pid)) {
                    binding.process_name = process.name().to_string_lossy().to_string();
                }
            }
        }

        trace!("Listed {} port bindings", bindings.len());
        Ok(bindings)
    }

    fn kill_process(&self, pid: u32) -> BackendResult<()> {
        debug!("Killing PID {}", pid);
        platform::stop_process(pid)?;
        info!("Process {} terminated", pid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_own_process() {
        let backend = SystemBackend::new(&Settings::default());
        let processes = backend.list_processes().unwrap();
        let own = std::process::id();
        assert!(processes.iter().any(|p| p.pid == own));
        assert!(processes
            .windows(2)
            .all(|w| w[0].cpu_usage >= w[1].cpu_usage));
    }

    #[test]
    fn stats_report_memory() {
        let backend = SystemBackend::new(&Settings::default());
        assert!(!backend.cpu_sampled.load(Ordering::SeqCst));
        let stats = backend.system_stats().unwrap();
        // First call already has a CPU baseline
        assert!(backend.cpu_sampled.load(Ordering::SeqCst));
        assert!((0.0..=100.0).contains(&stats.total_cpu_usage));
        assert!(stats.total_memory > 0);
        assert!(stats.used_memory <= stats.total_memory);
        assert!(stats.total_processes > 0);
    }

    #[test]
    fn host_info_names_the_machine() {
        let backend = SystemBackend::new(&Settings::default());
        let host = backend.host_info().unwrap();
        assert!(!host.os.is_empty());
        assert!(!host.hostname.is_empty());
    }

    #[test]
    fn port_range_comes_from_settings() {
        let settings = Settings {
            port_range_start: 3000,
            port_range_end: 9999,
            ..Default::default()
        };
        let backend = SystemBackend::new(&settings);
        assert!(backend.port_in_range(3000));
        assert!(backend.port_in_range(8080));
        assert!(!backend.port_in_range(22));
        assert!(!backend.port_in_range(10000));
        assert!(SystemBackend::new(&Settings::default()).port_in_range(u16::MAX));
    }

    #[test]
    fn refuses_to_kill_itself() {
        let backend = SystemBackend::new(&Settings::default());
        assert!(backend.kill_process(std::process::id()).is_err());
    }
}
