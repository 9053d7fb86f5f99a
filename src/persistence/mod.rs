//! Persistence layer - Settings and kill history in SQLite

mod database;

pub use database::Database;
