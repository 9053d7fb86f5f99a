//! SQLite database implementation for persistent storage

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::core::{KillRecord, Settings};

/// Database wrapper for SQLite operations
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file at `path`
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn =
            Connection::open(path).context(format!("Failed to open database at {:?}", path))?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        info!("Database opened at {:?}", path);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Throwaway database, used by tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Database lock poisoned: {}", e))
    }

    /// Initialize database schema
    pub fn initialize(&self) -> Result<()> {
        self.conn()?.execute_batch(
            r#"
            -- Settings table
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            -- Kill requests issued from the console
            CREATE TABLE IF NOT EXISTS kill_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pid INTEGER NOT NULL,
                process_name TEXT NOT NULL,
                requested_at TEXT NOT NULL,
                success INTEGER NOT NULL,
                message TEXT
            );
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }

    // === Settings ===

    /// Load settings from database
    pub fn load_settings(&self) -> Result<Option<Settings>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT value FROM settings WHERE key = 'console_settings'")?;
        let result: Option<String> = stmt.query_row([], |row| row.get(0)).optional()?;

        match result {
            Some(json) => {
                let mut settings: Settings =
                    serde_json::from_str(&json).context("Failed to deserialize settings")?;
                // Validate and fix any invalid values after deserialization
                settings.validate();
                Ok(Some(settings))
            }
            None => Ok(None),
        }
    }

    /// Save settings to database
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        let json = serde_json::to_string(settings)?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES ('console_settings', ?1)",
            params![json],
        )?;
        debug!("Settings saved");
        Ok(())
    }

    // === Kill history ===

    pub fn record_kill(&self, record: &KillRecord) -> Result<()> {
        self.conn()?.execute(
            r#"
            INSERT INTO kill_history (pid, process_name, requested_at, success, message)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                record.pid,
                record.process_name,
                record.requested_at.to_rfc3339(),
                record.success,
                record.message,
            ],
        )?;
        debug!("Kill of PID {} recorded", record.pid);
        Ok(())
    }

    /// Most recent kill requests, newest first
    pub fn recent_kills(&self, limit: usize) -> Result<Vec<KillRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT pid, process_name, requested_at, success, message
            FROM kill_history
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, bool>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (pid, process_name, requested_at, success, message) = row?;
            let requested_at = DateTime::parse_from_rfc3339(&requested_at)
                .context("Invalid timestamp in kill history")?
                .with_timezone(&Utc);
            records.push(KillRecord {
                pid,
                process_name,
                requested_at,
                success,
                message,
            });
        }
        Ok(records)
    }

    /// Drop all but the newest `keep` entries
    pub fn prune_kills(&self, keep: usize) -> Result<usize> {
        let removed = self.conn()?.execute(
            r#"
            DELETE FROM kill_history
            WHERE id NOT IN (SELECT id FROM kill_history ORDER BY id DESC LIMIT ?1)
            "#,
            params![keep as i64],
        )?;
        if removed > 0 {
            debug!("Pruned {} kill history entries", removed);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn database() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    fn record(pid: u32, success: bool) -> KillRecord {
        KillRecord {
            pid,
            process_name: format!("proc-{}", pid),
            requested_at: Utc::now(),
            success,
            message: (!success).then(|| "no such process".to_string()),
        }
    }

    #[test]
    fn settings_round_trip() {
        let db = database();
        assert!(db.load_settings().unwrap().is_none());

        let settings = Settings {
            port_interval_ms: 1500,
            display_cap: 25,
            ..Default::default()
        };
        db.save_settings(&settings).unwrap();
        assert_eq!(db.load_settings().unwrap(), Some(settings));
    }

    #[test]
    fn loaded_settings_are_validated() {
        let db = database();
        db.save_settings(&Settings {
            process_interval_ms: 1,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(db.load_settings().unwrap().unwrap().process_interval_ms, 100);
    }

    #[test]
    fn kill_history_is_newest_first_and_prunable() {
        let db = database();
        for pid in 1..=5 {
            db.record_kill(&record(pid, pid % 2 == 0)).unwrap();
        }

        let recent = db.recent_kills(3).unwrap();
        let pids: Vec<u32> = recent.iter().map(|r| r.pid).collect();
        assert_eq!(pids, vec![5, 4, 3]);
        assert!(recent[1].success);
        assert_eq!(recent[0].message.as_deref(), Some("no such process"));

        assert_eq!(db.prune_kills(2).unwrap(), 3);
        let pids: Vec<u32> = db.recent_kills(10).unwrap().iter().map(|r| r.pid).collect();
        assert_eq!(pids, vec![5, 4]);
    }
}
