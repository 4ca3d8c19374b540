//! SQLite persistence for builds, layers, and boots.
//!
//! Builds and their layer cache keys survive across runs so a rebuild can
//! reuse unchanged layers; boot attempts are recorded so the terminal state
//! of a container instance is inspectable after the fact.

mod records;
mod schema;

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OptionalExtension};

use crate::errors::{ShipwrightError, ShipwrightResult};

pub use records::{BootRecord, BuildRecord, BuildStore};

/// Helper macro to convert rusqlite errors to ShipwrightError.
macro_rules! db_err {
    ($result:expr) => {
        $result.map_err(|e| crate::errors::ShipwrightError::Database(e.to_string()))
    };
}

pub(crate) use db_err;

/// SQLite database handle.
///
/// Thread-safe via `parking_lot::Mutex`; `BuildStore` wraps this to provide
/// the domain API.
#[derive(Clone, Debug)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database.
    pub fn open(db_path: &Path) -> ShipwrightResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = db_err!(Connection::open(db_path))?;

        // WAL for concurrent reads, FULL sync for durability, busy timeout
        // to ride out long-running builds sharing the home directory.
        db_err!(conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=FULL;
            PRAGMA foreign_keys=ON;
            PRAGMA busy_timeout=100000;
            "
        ))?;

        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Acquire the database connection.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    fn init_schema(conn: &Connection) -> ShipwrightResult<()> {
        for sql in schema::all_schemas() {
            db_err!(conn.execute_batch(sql))?;
        }

        let current_version: Option<i32> = db_err!(
            conn.query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
        )?;

        match current_version {
            None => {
                let now = Utc::now().to_rfc3339();
                db_err!(conn.execute(
                    "INSERT INTO schema_version (id, version, updated_at) VALUES (1, ?1, ?2)",
                    rusqlite::params![schema::SCHEMA_VERSION, now],
                ))?;
                tracing::info!(
                    "Initialized store schema version {}",
                    schema::SCHEMA_VERSION
                );
            }
            Some(v) if v > schema::SCHEMA_VERSION => {
                return Err(ShipwrightError::Database(format!(
                    "store schema version {} is newer than supported {}; upgrade shipwright",
                    v,
                    schema::SCHEMA_VERSION
                )));
            }
            Some(_) => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_failure_maps_to_database_error() {
        let temp_dir = TempDir::new().unwrap();
        // A directory is not a valid database file.
        let err = Database::open(temp_dir.path()).unwrap_err();
        assert!(matches!(err, ShipwrightError::Database(_)));
    }

    #[test]
    fn open_creates_parent_and_schema() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("db").join("test.db");
        let db = Database::open(&db_path).unwrap();
        // Re-open is fine (schema init is idempotent).
        drop(db);
        let _db = Database::open(&db_path).unwrap();
    }
}
