//! ProcConsole - Watch processes and listening ports, and stop the ones you don't want
//!
//! A terminal console that polls the process table every few seconds and the
//! listening sockets on a faster cadence, filters the process list, and kills
//! a process on request.

#![allow(dead_code)] // Part of the controller API is only used by tests and the snapshot type

mod core;
mod persistence;
mod platform;
mod ui;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

use crate::core::{Controller, PollScheduler, Settings, SystemBackend};
use crate::persistence::Database;
use crate::ui::Console;

/// Application name constant
pub const APP_NAME: &str = "ProcConsole";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

type LogHandle = reload::Handle<EnvFilter, Registry>;

#[tokio::main]
async fn main() -> Result<()> {
    let log = init_logging();
    info!("{} v{} starting...", APP_NAME, APP_VERSION);

    let (settings, database) = load_settings();
    if settings.debug_logging {
        if let Some(log) = &log {
            set_log_filter(log, "proc_console=debug");
        }
    }

    let backend = Arc::new(SystemBackend::new(&settings));
    let mut controller = Controller::new(backend, &settings);
    match database {
        Some(db) => controller = controller.with_history(Arc::new(db)),
        None => warn!("Kill history is disabled for this session"),
    }
    if let Err(e) = controller.load_host_info().await {
        warn!("Failed to read host information: {}", e);
    }

    let mut scheduler = PollScheduler::start(controller.clone(), &settings);

    let outcome = Console::new(controller).run().await;

    scheduler.stop();
    info!("{} shutting down", APP_NAME);
    outcome
}

/// Open the settings database and load the stored settings
///
/// The database is first opened in the default location (or the one named by
/// `PROC_CONSOLE_DATA_DIR`). If the stored settings point at another data
/// directory, the database there is used instead. Any failure falls back to
/// defaults with kill history disabled.
fn load_settings() -> (Settings, Option<Database>) {
    let path = Settings::default().get_database_path();
    let db = match open_database(&path) {
        Ok(db) => db,
        Err(e) => {
            warn!("Failed to open database at {:?}: {:#}", path, e);
            return (Settings::default(), None);
        }
    };

    let mut settings = match db.load_settings() {
        Ok(Some(settings)) => settings,
        Ok(None) => {
            let settings = Settings::default();
            if let Err(e) = db.save_settings(&settings) {
                warn!("Failed to store default settings: {:#}", e);
            }
            settings
        }
        Err(e) => {
            warn!("Failed to load settings, using defaults: {:#}", e);
            Settings::default()
        }
    };
    settings.validate();

    let stored_path = settings.get_database_path();
    if stored_path == path {
        return (settings, Some(db));
    }

    info!("Settings point at data directory {:?}", settings.get_data_directory());
    match open_database(&stored_path) {
        Ok(relocated) => {
            if let Err(e) = relocated.save_settings(&settings) {
                warn!("Failed to store settings at {:?}: {:#}", stored_path, e);
            }
            (settings, Some(relocated))
        }
        Err(e) => {
            warn!(
                "Failed to open database at {:?}, staying at {:?}: {:#}",
                stored_path, path, e
            );
            (settings, Some(db))
        }
    }
}

fn open_database(path: &Path) -> Result<Database> {
    let db = Database::open(path)?;
    db.initialize()?;
    Ok(db)
}

/// Initialize the logging system
///
/// Logs go to stderr so they don't interleave with console output on stdout.
/// Returns a handle for adjusting the filter once settings are loaded, or
/// `None` when `RUST_LOG` decides.
fn init_logging() -> Option<LogHandle> {
    let (filter, from_env) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (EnvFilter::new("proc_console=info"), false),
    };
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    (!from_env).then_some(handle)
}

fn set_log_filter(handle: &LogHandle, directive: &str) {
    if let Err(e) = handle.modify(|filter| *filter = EnvFilter::new(directive)) {
        warn!("Failed to change log level: {}", e);
    }
}
