//! State store - Applies fetch outcomes to the three slots

use thiserror::Error;
use tracing::trace;

use super::backend::BackendResult;
use super::resource::{PortBinding, ProcessRecord, SystemStats};
use super::slot::{AlreadyInFlight, FetchSlot};

/// Kind of periodic fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchKind {
    /// Process list plus system stats, fetched together as one tick
    Processes,
    /// Listening ports
    Ports,
}

impl FetchKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Processes => "processes",
            Self::Ports => "ports",
        }
    }
}

impl std::fmt::Display for FetchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.label())
    }
}

/// Why a fetch was not started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FetchRejected {
    #[error(transparent)]
    InFlight(#[from] AlreadyInFlight),
    #[error("controller has been stopped")]
    Disposed,
}

/// Last-known-good process list, stats snapshot and port list
///
/// The slots never read or write each other. A process tick guards both the
/// process and the stats slot, but their results are committed one call at a
/// time: a failed stats call does not discard a good process list.
#[derive(Debug, Default)]
pub struct StateStore {
    processes: FetchSlot<Vec<ProcessRecord>>,
    stats: FetchSlot<SystemStats>,
    ports: FetchSlot<Vec<PortBinding>>,
    disposed: bool,
    revision: u64,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a fetch of the given kind, marking its slots in flight
    pub fn begin_fetch(&mut self, kind: FetchKind) -> Result<(), FetchRejected> {
        if self.disposed {
            return Err(FetchRejected::Disposed);
        }
        match kind {
            FetchKind::Processes => {
                if self.processes.is_in_flight() || self.stats.is_in_flight() {
                    return Err(AlreadyInFlight.into());
                }
                self.processes.begin_fetch()?;
                self.stats.begin_fetch()?;
            }
            FetchKind::Ports => self.ports.begin_fetch()?,
        }
        Ok(())
    }

    /// Apply the process-list half of a process tick. Returns false if the
    /// result was discarded.
    pub fn commit_processes(&mut self, result: BackendResult<Vec<ProcessRecord>>) -> bool {
        if self.discard_after_dispose(FetchKind::Processes) {
            return false;
        }
        match result {
            Ok(processes) => self.processes.commit_success(processes),
            Err(e) => self.processes.commit_failure(e),
        }
        self.revision += 1;
        true
    }

    /// Apply the stats half of a process tick
    pub fn commit_stats(&mut self, result: BackendResult<SystemStats>) -> bool {
        if self.discard_after_dispose(FetchKind::Processes) {
            return false;
        }
        match result {
            Ok(stats) => self.stats.commit_success(stats),
            Err(e) => self.stats.commit_failure(e),
        }
        self.revision += 1;
        true
    }

    pub fn commit_ports(&mut self, result: BackendResult<Vec<PortBinding>>) -> bool {
        if self.discard_after_dispose(FetchKind::Ports) {
            return false;
        }
        match result {
            Ok(ports) => self.ports.commit_success(ports),
            Err(e) => self.ports.commit_failure(e),
        }
        self.revision += 1;
        true
    }

    fn discard_after_dispose(&self, kind: FetchKind) -> bool {
        if self.disposed {
            trace!("Discarding {} result that arrived after shutdown", kind);
        }
        self.disposed
    }

    /// Stop accepting fetches and commits
    pub fn dispose(&mut self) {
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn is_in_flight(&self, kind: FetchKind) -> bool {
        match kind {
            FetchKind::Processes => self.processes.is_in_flight() || self.stats.is_in_flight(),
            FetchKind::Ports => self.ports.is_in_flight(),
        }
    }

    /// Counter bumped on every accepted commit
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn processes(&self) -> &FetchSlot<Vec<ProcessRecord>> {
        &self.processes
    }

    pub fn stats(&self) -> &FetchSlot<SystemStats> {
        &self.stats
    }

    pub fn ports(&self) -> &FetchSlot<Vec<PortBinding>> {
        &self.ports
    }
}
