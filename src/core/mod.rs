//! Core module - Polled process/port state, filtering and the kill gateway

pub mod backend;
mod controller;
pub mod filter;
mod monitor;
mod ports;
pub mod resource;
mod scheduler;
pub mod settings;
mod slot;
mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{Backend, BackendError, BackendResult};
pub use controller::{ConsoleSnapshot, Controller};
pub use filter::{FilterState, FilteredView, ProcessFilter};
pub use monitor::SystemBackend;
pub use resource::{HostInfo, KillRecord, PortBinding, ProcessRecord, SystemStats};
pub use scheduler::PollScheduler;
pub use settings::Settings;
pub use store::FetchKind;
