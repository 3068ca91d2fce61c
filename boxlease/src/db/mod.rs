//! SQLite-backed persistence for box records.
//!
//! Records outlive the process that created them; that is what lets a later
//! lease holder reattach to boxes it did not create.

mod boxes;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;

use boxlease_shared::errors::{BoxleaseError, BoxleaseResult};

pub(crate) use boxes::BoxStore;

/// Map a rusqlite result into `BoxleaseError::Database`.
macro_rules! db_err {
    ($expr:expr) => {
        $expr.map_err(|e| boxlease_shared::errors::BoxleaseError::Database(e.to_string()))
    };
}
pub(crate) use db_err;

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS boxes (
    id          TEXT PRIMARY KEY,
    name        TEXT UNIQUE,
    created_at  TEXT NOT NULL,
    status      TEXT NOT NULL,
    config      TEXT NOT NULL,
    state       TEXT NOT NULL
);
"#;

/// Shared connection handle. Cloning shares the connection.
#[derive(Clone)]
pub(crate) struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub(crate) fn open(path: &Path) -> BoxleaseResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                BoxleaseError::Storage(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }

        let conn = db_err!(Connection::open(path))?;
        db_err!(conn.busy_timeout(Duration::from_secs(5)))?;
        db_err!(conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;"))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    #[cfg(test)]
    pub(crate) fn open_in_memory() -> BoxleaseResult<Self> {
        let conn = db_err!(Connection::open_in_memory())?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    fn init_schema(&self) -> BoxleaseResult<()> {
        let conn = self.conn();
        db_err!(conn.execute_batch(SCHEMA))?;

        let current: Option<i64> = db_err!(conn.query_row(
            "SELECT MAX(version) FROM schema_version",
            [],
            |row| row.get(0)
        ))?;

        match current {
            None => {
                db_err!(conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?1)",
                    [SCHEMA_VERSION]
                ))?;
            }
            Some(v) if v > SCHEMA_VERSION => {
                return Err(BoxleaseError::Database(format!(
                    "database schema version {} is newer than supported version {}",
                    v, SCHEMA_VERSION
                )));
            }
            Some(_) => {}
        }
        Ok(())
    }
}
