//! SQLite-backed relational store.
//!
//! Every persisted entity lives in one SQLite database:
//!
//! ```text
//! profiles ──< template_versions ──< template_groups ──< template_properties
//!
//! slides          reports ──< report_property_values
//!   ▲                │                    │
//!   └── linked_object_id (weak)           └── property_id (weak)
//! ```
//!
//! Ownership edges cascade on delete. The two weak edges are plain values,
//! resolved by lookup, so a report can outlive the slide or the template
//! version it points at.
//!
//! The connection sits behind a [`std::sync::Mutex`]; callers run queries
//! from blocking contexts (`spawn_blocking` in the HTTP layer) and open a
//! transaction with [`Database::with_conn_mut`] whenever an operation spans
//! more than one statement.

pub mod profiles;
pub mod reports;
pub mod schema;
pub mod slides;
pub mod templates;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::StoreError;

/// Handle to the application database.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database file at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        info!(path = %path.display(), "Opening SQLite database");

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        Self::from_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        debug!("Opening in-memory SQLite database");
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run read-only work against the connection.
    pub fn with_conn<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<StoreError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        f(&conn)
    }

    /// Run work that needs exclusive access, typically to open a transaction.
    pub fn with_conn_mut<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Connection) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        f(&mut conn)
    }
}

/// Current UTC time as an RFC 3339 string, the format of every timestamp column.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_creates_schema() {
        let db = Database::open_in_memory().unwrap();
        let tables: Vec<String> = db
            .with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                )?;
                let rows = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok::<_, StoreError>(rows)
            })
            .unwrap();

        for expected in [
            "profiles",
            "report_property_values",
            "reports",
            "slides",
            "template_groups",
            "template_properties",
            "template_versions",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }
    }

    #[test]
    fn test_open_file_database_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pathway.db");

        Database::open(&path).unwrap();
        // Reopening must not fail on the existing schema
        Database::open(&path).unwrap();
    }
}
