//! Console settings management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::filter::Thresholds;

/// Environment variable naming the directory that holds the settings
/// database. Read before any settings are loaded.
pub const DATA_DIR_ENV: &str = "PROC_CONSOLE_DATA_DIR";

/// Console settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Polling
    /// Process list + stats refresh period in ms
    pub process_interval_ms: u32,
    /// Listening ports refresh period in ms
    pub port_interval_ms: u32,

    // Filtering
    /// CPU percentage above which a process counts as "high CPU"
    pub cpu_threshold_percent: f32,
    /// Resident memory above which a process counts as "high memory"
    pub memory_threshold_bytes: u64,
    /// Maximum number of process rows shown at once
    pub display_cap: usize,

    // Ports
    /// Lowest port number reported
    pub port_range_start: u16,
    /// Highest port number reported
    pub port_range_end: u16,

    // Advanced
    /// Custom data directory
    pub data_directory: Option<PathBuf>,
    /// Enable debug logging
    pub debug_logging: bool,
    /// Kill history entries to keep (0 = forever)
    pub history_retention: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            process_interval_ms: 5000,
            port_interval_ms: 3000,

            cpu_threshold_percent: 5.0,
            memory_threshold_bytes: 100 * 1024 * 1024,
            display_cap: 100,

            port_range_start: 1,
            port_range_end: u16::MAX,

            data_directory: None,
            debug_logging: false,
            history_retention: 500,
        }
    }
}

impl Settings {
    /// Get the data directory: the stored setting, then `PROC_CONSOLE_DATA_DIR`,
    /// then the platform data directory
    pub fn get_data_directory(&self) -> PathBuf {
        self.resolve_data_directory(std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))
    }

    fn resolve_data_directory(&self, env_override: Option<PathBuf>) -> PathBuf {
        self.data_directory
            .clone()
            .or(env_override.filter(|p| !p.as_os_str().is_empty()))
            .unwrap_or_else(|| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(crate::APP_NAME)
            })
    }

    pub fn get_database_path(&self) -> PathBuf {
        self.get_data_directory().join("proc-console.db")
    }

    pub fn process_interval(&self) -> Duration {
        Duration::from_millis(self.process_interval_ms as u64)
    }

    pub fn port_interval(&self) -> Duration {
        Duration::from_millis(self.port_interval_ms as u64)
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            cpu_percent: self.cpu_threshold_percent,
            memory_bytes: self.memory_threshold_bytes,
        }
    }

    /// Validate settings and fix any invalid values
    pub fn validate(&mut self) {
        self.process_interval_ms = self.process_interval_ms.max(100);
        self.port_interval_ms = self.port_interval_ms.max(100);
        self.display_cap = self.display_cap.max(1);
        if !self.cpu_threshold_percent.is_finite() || self.cpu_threshold_percent < 0.0 {
            self.cpu_threshold_percent = 0.0;
        }
        if self.port_range_end == 0 {
            self.port_range_start = 1;
            self.port_range_end = u16::MAX;
        }
        if self.port_range_end < self.port_range_start {
            std::mem::swap(&mut self.port_range_start, &mut self.port_range_end);
        }
        self.port_range_start = self.port_range_start.max(1);
    }
}
