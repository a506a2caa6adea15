//! SQLite-backed store for consents, leads, audit entries and content.
//!
//! One connection in WAL mode behind a mutex. Every multi-statement
//! operation goes through [`SqliteStore::write`] or [`SqliteStore::read`],
//! which run the closure inside a single transaction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};
use tracing::info;

use crate::schema::{CACHE_SCHEMA_SQL, CONTENT_SCHEMA_SQL, PD_SCHEMA_SQL};
use transcargo_core::{Error, Result};

/// SQLite store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

/// An open transaction. Domain queries are implemented on this type.
pub struct StoreTx<'a> {
    pub(crate) tx: Transaction<'a>,
}

impl SqliteStore {
    /// Open or create the SQLite store.
    ///
    /// `db_dir` is the directory (e.g., `data/db/`). The file will be `db_dir/transcargo.db`.
    pub fn open(db_dir: impl AsRef<Path>) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir).map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        let db_path = db_dir.join("transcargo.db");

        let conn = Self::create_connection(&db_path)?;
        Self::init_schema(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };

        let (consents, leads) = store.read(|tx| Ok((tx.count_consents()?, tx.count_leads()?)))?;
        info!(
            "SqliteStore initialized: {} consents, {} leads, path={}",
            consents,
            leads,
            store.db_path.display()
        );

        Ok(store)
    }

    fn create_connection(db_path: &Path) -> Result<Connection> {
        let conn = Connection::open(db_path).map_err(db_err)?;
        conn.busy_timeout(Duration::from_secs(5)).map_err(db_err)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(db_err)?;
        Ok(conn)
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        let full_schema = format!("{}\n{}\n{}", PD_SCHEMA_SQL, CONTENT_SCHEMA_SQL, CACHE_SCHEMA_SQL);
        conn.execute_batch(&full_schema)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run `f` in a write transaction. Commits on `Ok`, rolls back on `Err`.
    pub fn write<T>(&self, f: impl FnOnce(&StoreTx<'_>) -> Result<T>) -> Result<T> {
        self.run(TransactionBehavior::Immediate, f)
    }

    /// Run `f` in a read transaction so all reads see one snapshot.
    pub fn read<T>(&self, f: impl FnOnce(&StoreTx<'_>) -> Result<T>) -> Result<T> {
        self.run(TransactionBehavior::Deferred, f)
    }

    fn run<T>(
        &self,
        behavior: TransactionBehavior,
        f: impl FnOnce(&StoreTx<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(behavior).map_err(db_err)?;
        let stx = StoreTx { tx };
        let out = f(&stx)?;
        stx.tx.commit().map_err(db_err)?;
        Ok(out)
    }
}

/// Map a rusqlite error, separating "store not reachable" from query errors.
pub(crate) fn db_err(e: rusqlite::Error) -> Error {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(
                err.code,
                ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::CannotOpen
                    | ErrorCode::DiskFull
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::ReadOnly
            ) =>
        {
            Error::StoreUnavailable(e.to_string())
        }
        _ => Error::Database(e.to_string()),
    }
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn json_col(row: &rusqlite::Row<'_>, col: &str) -> serde_json::Value {
    row.get::<_, Option<String>>(col)
        .ok()
        .flatten()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(serde_json::Value::Null)
}

pub(crate) fn list_col(row: &rusqlite::Row<'_>, col: &str) -> Vec<String> {
    serde_json::from_value(json_col(row, col)).unwrap_or_default()
}

pub(crate) fn ts_col(row: &rusqlite::Row<'_>, col: &str) -> chrono::DateTime<chrono::Utc> {
    let raw: String = row.get(col).unwrap_or_default();
    transcargo_core::time::from_db(&raw)
}

pub(crate) fn opt_ts_col(
    row: &rusqlite::Row<'_>,
    col: &str,
) -> Option<chrono::DateTime<chrono::Utc>> {
    row.get::<_, Option<String>>(col)
        .ok()
        .flatten()
        .map(|s| transcargo_core::time::from_db(&s))
}

/// Parse an enum column, falling back to `default` for unknown text.
pub(crate) fn enum_col<T: std::str::FromStr>(row: &rusqlite::Row<'_>, col: &str, default: T) -> T {
    row.get::<_, String>(col)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
