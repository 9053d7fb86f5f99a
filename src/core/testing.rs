//! Scriptable in-memory backend for controller tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

use super::backend::{Backend, BackendError, BackendResult};
use super::resource::{HostInfo, PortBinding, ProcessRecord, ProcessState, Protocol, SystemStats};

/// Backend whose answers are set by the test
///
/// Killing a pid removes it from both the process list and the port list,
/// like the real OS would. Any call can be held open with a gate to keep a
/// fetch in flight.
#[derive(Default)]
pub struct FakeBackend {
    processes: Mutex<Option<BackendResult<Vec<ProcessRecord>>>>,
    stats: Mutex<Option<BackendResult<SystemStats>>>,
    ports: Mutex<Option<BackendResult<Vec<PortBinding>>>>,
    host: Mutex<Option<BackendResult<HostInfo>>>,
    kill_error: Mutex<Option<BackendError>>,
    process_gate: Mutex<Option<Receiver<()>>>,
    port_gate: Mutex<Option<Receiver<()>>>,
    pub process_calls: AtomicUsize,
    pub stats_calls: AtomicUsize,
    pub port_calls: AtomicUsize,
    pub kill_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_processes(&self, result: BackendResult<Vec<ProcessRecord>>) {
        *self.processes.lock().unwrap() = Some(result);
    }

    pub fn set_stats(&self, result: BackendResult<SystemStats>) {
        *self.stats.lock().unwrap() = Some(result);
    }

    pub fn set_ports(&self, result: BackendResult<Vec<PortBinding>>) {
        *self.ports.lock().unwrap() = Some(result);
    }

    pub fn set_host(&self, result: BackendResult<HostInfo>) {
        *self.host.lock().unwrap() = Some(result);
    }

    pub fn fail_kills_with(&self, error: BackendError) {
        *self.kill_error.lock().unwrap() = Some(error);
    }

    /// Block the next process-list call until the returned sender is used
    /// or dropped
    pub fn hold_processes(&self) -> Sender<()> {
        let (tx, rx) = mpsc::channel();
        *self.process_gate.lock().unwrap() = Some(rx);
        tx
    }

    /// Block the next port-list call until the returned sender is used or
    /// dropped
    pub fn hold_ports(&self) -> Sender<()> {
        let (tx, rx) = mpsc::channel();
        *self.port_gate.lock().unwrap() = Some(rx);
        tx
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn wait(gate: &Mutex<Option<Receiver<()>>>) {
        let rx = gate.lock().unwrap().take();
        if let Some(rx) = rx {
            let _ = rx.recv();
        }
    }
}

impl Backend for FakeBackend {
    fn list_processes(&self) -> BackendResult<Vec<ProcessRecord>> {
        self.process_calls.fetch_add(1, Ordering::SeqCst);
        Self::wait(&self.process_gate);
        self.processes
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn system_stats(&self) -> BackendResult<SystemStats> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        self.stats
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(SystemStats::default()))
    }

    fn host_info(&self) -> BackendResult<HostInfo> {
        self.host
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(HostInfo::default()))
    }

    fn list_port_bindings(&self) -> BackendResult<Vec<PortBinding>> {
        self.port_calls.fetch_add(1, Ordering::SeqCst);
        Self::wait(&self.port_gate);
        self.ports
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn kill_process(&self, pid: u32) -> BackendResult<()> {
        self.kill_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.kill_error.lock().unwrap().clone() {
            return Err(error);
        }

        let mut processes = self.processes.lock().unwrap();
        let Some(Ok(list)) = processes.as_mut() else {
            return Err(BackendError::NoSuchProcess(pid));
        };
        let before = list.len();
        list.retain(|p| p.pid != pid);
        if list.len() == before {
            return Err(BackendError::NoSuchProcess(pid));
        }

        if let Some(Ok(ports)) = self.ports.lock().unwrap().as_mut() {
            ports.retain(|b| b.pid != pid);
        }
        Ok(())
    }
}

pub fn process(pid: u32, name: &str, cpu_usage: f32, memory: u64) -> ProcessRecord {
    ProcessRecord {
        pid,
        name: name.to_string(),
        cpu_usage,
        memory,
        status: ProcessState::Running,
    }
}

pub fn tcp(port: u16, pid: u32, name: &str) -> PortBinding {
    PortBinding {
        port,
        pid,
        process_name: name.to_string(),
        protocol: Protocol::Tcp,
    }
}
