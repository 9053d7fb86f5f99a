//! Console controller - Polled state, filtering and the kill gateway

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::backend::{Backend, BackendError, BackendResult};
use super::filter::{self, FilterState, FilteredView, ProcessFilter, Thresholds};
use super::resource::{HostInfo, KillRecord, PortBinding, ProcessRecord, SystemStats};
use super::settings::Settings;
use super::store::{FetchKind, FetchRejected, StateStore};
use crate::persistence::Database;

/// Everything a presentation layer needs for one frame
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsoleSnapshot {
    pub processes: FilteredView,
    pub ports: Vec<PortBinding>,
    pub stats: Option<SystemStats>,
    pub host: Option<HostInfo>,
    pub process_error: Option<String>,
    pub stats_error: Option<String>,
    pub port_error: Option<String>,
    pub processes_updated: Option<DateTime<Utc>>,
    pub ports_updated: Option<DateTime<Utc>>,
    pub filter: FilterState,
}

/// Resource monitoring and control controller
///
/// Cheap to clone; clones share the same store, filter and backend.
pub struct Controller {
    /// Backend data source
    backend: Arc<dyn Backend>,
    /// Process, stats and port slots
    store: Arc<RwLock<StateStore>>,
    /// Current search query and category filter
    filter: Arc<RwLock<FilterState>>,
    /// Machine identity, read once
    host: Arc<RwLock<Option<HostInfo>>>,
    thresholds: Thresholds,
    display_cap: usize,
    /// Kill history, if persistence is enabled
    history: Option<Arc<Database>>,
    history_retention: u32,
    /// Bumped whenever something visible changes
    changes: Arc<watch::Sender<u64>>,
}

impl Controller {
    pub fn new(backend: Arc<dyn Backend>, settings: &Settings) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            backend,
            store: Arc::new(RwLock::new(StateStore::new())),
            filter: Arc::new(RwLock::new(FilterState::default())),
            host: Arc::new(RwLock::new(None)),
            thresholds: settings.thresholds(),
            display_cap: settings.display_cap.max(1),
            history: None,
            history_retention: settings.history_retention,
            changes: Arc::new(changes),
        }
    }

    /// Record every kill request in `database`
    pub fn with_history(mut self, database: Arc<Database>) -> Self {
        self.history = Some(database);
        self
    }

    // === Polling ===

    /// Start a fetch of `kind` unless one is already outstanding
    ///
    /// Returns the handle of the spawned fetch, or `None` if the request was
    /// dropped. Must be called from within a Tokio runtime.
    pub fn trigger(&self, kind: FetchKind) -> Option<JoinHandle<()>> {
        let admitted = match self.store.write() {
            Ok(mut store) => store.begin_fetch(kind),
            Err(e) => {
                error!("State store lock poisoned: {}", e);
                return None;
            }
        };

        match admitted {
            Ok(()) => {
                let controller = self.clone();
                Some(tokio::spawn(async move { controller.run_fetch(kind).await }))
            }
            Err(FetchRejected::InFlight(_)) => {
                trace!("Skipping {} fetch, one is already in flight", kind);
                None
            }
            Err(FetchRejected::Disposed) => None,
        }
    }

    async fn run_fetch(&self, kind: FetchKind) {
        debug!("Fetching {}", kind);
        let backend = Arc::clone(&self.backend);
        match kind {
            FetchKind::Processes => {
                let (processes, stats) = tokio::task::spawn_blocking(move || {
                    (backend.list_processes(), backend.system_stats())
                })
                .await
                .unwrap_or_else(|e| (Err(aborted(&e)), Err(aborted(&e))));

                if let Err(e) = &processes {
                    warn!("Process list fetch failed: {}", e);
                }
                if let Err(e) = &stats {
                    warn!("System stats fetch failed: {}", e);
                }
                let accepted = match self.store.write() {
                    Ok(mut store) => {
                        let processes_accepted = store.commit_processes(processes);
                        let stats_accepted = store.commit_stats(stats);
                        processes_accepted || stats_accepted
                    }
                    Err(e) => {
                        error!("State store lock poisoned: {}", e);
                        false
                    }
                };
                if accepted {
                    self.notify();
                }
            }
            FetchKind::Ports => {
                let ports = tokio::task::spawn_blocking(move || backend.list_port_bindings())
                    .await
                    .unwrap_or_else(|e| Err(aborted(&e)));

                if let Err(e) = &ports {
                    warn!("Port list fetch failed: {}", e);
                }
                let accepted = match self.store.write() {
                    Ok(mut store) => store.commit_ports(ports),
                    Err(e) => {
                        error!("State store lock poisoned: {}", e);
                        false
                    }
                };
                if accepted {
                    self.notify();
                }
            }
        }
    }

    /// Refresh the process list and stats now and wait for the result.
    /// Returns false if a fetch was already outstanding.
    pub async fn refresh_processes(&self) -> bool {
        self.refresh(FetchKind::Processes).await
    }

    /// Refresh the port list now and wait for the result.
    /// Returns false if a fetch was already outstanding.
    pub async fn refresh_ports(&self) -> bool {
        self.refresh(FetchKind::Ports).await
    }

    async fn refresh(&self, kind: FetchKind) -> bool {
        match self.trigger(kind) {
            Some(handle) => {
                let _ = handle.await;
                true
            }
            None => false,
        }
    }

    pub fn is_fetching(&self, kind: FetchKind) -> bool {
        self.store
            .read()
            .map(|s| s.is_in_flight(kind))
            .unwrap_or(false)
    }

    /// Read the machine identity from the backend and keep it for later
    /// snapshots
    pub async fn load_host_info(&self) -> BackendResult<HostInfo> {
        let backend = Arc::clone(&self.backend);
        let host = tokio::task::spawn_blocking(move || backend.host_info())
            .await
            .unwrap_or_else(|e| Err(aborted(&e)))?;

        info!("Watching {}", host.summary());
        if let Ok(mut slot) = self.host.write() {
            *slot = Some(host.clone());
        }
        self.notify();
        Ok(host)
    }

    pub fn host_info(&self) -> Option<HostInfo> {
        self.host.read().ok().and_then(|h| h.clone())
    }

    // === Mutation ===

    /// Kill a process and, on success, force both the process and the port
    /// view to refresh before returning
    ///
    /// Failures are returned as reported by the backend and leave every slot
    /// untouched. Nothing is retried.
    pub async fn kill_process(&self, pid: u32) -> BackendResult<()> {
        let process_name = self.process_name(pid).unwrap_or_default();
        info!("Kill requested for PID {} ({})", pid, process_name);

        let backend = Arc::clone(&self.backend);
        let result = tokio::task::spawn_blocking(move || backend.kill_process(pid))
            .await
            .unwrap_or_else(|e| Err(aborted(&e)));

        self.record_kill(pid, process_name, &result).await;

        match result {
            Ok(()) => {
                info!("Process {} killed, refreshing process and port views", pid);
                let pending = [
                    self.trigger(FetchKind::Processes),
                    self.trigger(FetchKind::Ports),
                ];
                for handle in pending.into_iter().flatten() {
                    let _ = handle.await;
                }
                Ok(())
            }
            Err(e) => {
                error!("Failed to kill process {}: {}", pid, e);
                Err(e)
            }
        }
    }

    async fn record_kill(&self, pid: u32, process_name: String, result: &BackendResult<()>) {
        let Some(database) = self.history.clone() else {
            return;
        };
        let record = KillRecord {
            pid,
            process_name,
            requested_at: Utc::now(),
            success: result.is_ok(),
            message: result.as_ref().err().map(ToString::to_string),
        };
        let retention = self.history_retention as usize;

        let written = tokio::task::spawn_blocking(move || {
            if let Err(e) = database.record_kill(&record) {
                error!("Failed to record kill of PID {}: {}", record.pid, e);
            }
            if retention > 0 {
                if let Err(e) = database.prune_kills(retention) {
                    warn!("Failed to prune kill history: {}", e);
                }
            }
        })
        .await;
        if let Err(e) = written {
            error!("Kill history write for PID {} aborted: {}", pid, e);
        }
    }

    /// Recent kill requests, newest first. Empty without persistence.
    pub async fn kill_history(&self, limit: usize) -> anyhow::Result<Vec<KillRecord>> {
        let Some(database) = self.history.clone() else {
            return Ok(Vec::new());
        };
        tokio::task::spawn_blocking(move || database.recent_kills(limit)).await?
    }

    // === Filtering ===

    pub fn set_query(&self, query: impl Into<String>) {
        if let Ok(mut filter) = self.filter.write() {
            filter.query = query.into();
        }
        self.notify();
    }

    pub fn set_filter(&self, predicate: ProcessFilter) {
        if let Ok(mut filter) = self.filter.write() {
            filter.filter = predicate;
        }
        self.notify();
    }

    pub fn filter_state(&self) -> FilterState {
        self.filter.read().map(|f| f.clone()).unwrap_or_default()
    }

    // === Views ===

    /// Filtered process table, recomputed from the current slot value
    pub fn process_view(&self) -> FilteredView {
        let filter = self.filter_state();
        self.store
            .read()
            .map(|store| {
                let processes = store.processes().value().map(Vec::as_slice).unwrap_or(&[]);
                filter::apply(processes, &filter, &self.thresholds, self.display_cap)
            })
            .unwrap_or_default()
    }

    /// Port table, exactly as last fetched
    pub fn port_view(&self) -> Vec<PortBinding> {
        self.store
            .read()
            .ok()
            .and_then(|store| store.ports().value().cloned())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> Option<SystemStats> {
        self.store
            .read()
            .ok()
            .and_then(|store| store.stats().value().cloned())
    }

    pub fn process_error(&self) -> Option<BackendError> {
        self.store
            .read()
            .ok()
            .and_then(|store| store.processes().last_error().cloned())
    }

    pub fn stats_error(&self) -> Option<BackendError> {
        self.store
            .read()
            .ok()
            .and_then(|store| store.stats().last_error().cloned())
    }

    pub fn port_error(&self) -> Option<BackendError> {
        self.store
            .read()
            .ok()
            .and_then(|store| store.ports().last_error().cloned())
    }

    /// Consistent view of all slots taken under one lock
    pub fn snapshot(&self) -> ConsoleSnapshot {
        let filter = self.filter_state();
        let Ok(store) = self.store.read() else {
            return ConsoleSnapshot::default();
        };
        let processes = store.processes().value().map(Vec::as_slice).unwrap_or(&[]);
        ConsoleSnapshot {
            processes: filter::apply(processes, &filter, &self.thresholds, self.display_cap),
            ports: store.ports().value().cloned().unwrap_or_default(),
            stats: store.stats().value().cloned(),
            host: self.host_info(),
            process_error: store.processes().last_error().map(ToString::to_string),
            stats_error: store.stats().last_error().map(ToString::to_string),
            port_error: store.ports().last_error().map(ToString::to_string),
            processes_updated: store.processes().last_updated(),
            ports_updated: store.ports().last_updated(),
            filter,
        }
    }

    /// Name of `pid` in the current process list, if present
    fn process_name(&self, pid: u32) -> Option<String> {
        let store = self.store.read().ok()?;
        store
            .processes()
            .value()?
            .iter()
            .find(|p| p.pid == pid)
            .map(|p| p.name.clone())
    }

    /// Look up a process in the current (unfiltered) list
    pub fn find_process(&self, pid: u32) -> Option<ProcessRecord> {
        let store = self.store.read().ok()?;
        store
            .processes()
            .value()?
            .iter()
            .find(|p| p.pid == pid)
            .cloned()
    }

    // === Lifecycle ===

    /// Receiver that changes whenever a commit or filter change happens
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn notify(&self) {
        self.changes.send_modify(|revision| *revision += 1);
    }

    /// Stop accepting fetch results. Fetches still running are discarded
    /// when they complete.
    pub fn shutdown(&self) {
        if let Ok(mut store) = self.store.write() {
            if !store.is_disposed() {
                store.dispose();
                info!("Controller stopped");
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.store.read().map(|s| s.is_disposed()).unwrap_or(true)
    }
}

impl Clone for Controller {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            store: Arc::clone(&self.store),
            filter: Arc::clone(&self.filter),
            host: Arc::clone(&self.host),
            thresholds: self.thresholds,
            display_cap: self.display_cap,
            history: self.history.clone(),
            history_retention: self.history_retention,
            changes: Arc::clone(&self.changes),
        }
    }
}

fn aborted(e: &tokio::task::JoinError) -> BackendError {
    BackendError::Aborted(e.to_string())
}
