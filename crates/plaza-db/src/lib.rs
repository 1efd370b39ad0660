pub mod migrations;
pub mod models;
pub mod queries;

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use tracing::info;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let db = Self::init(conn)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    /// Private in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    /// Exclusive access for multi-statement writes that must not interleave.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|e| anyhow!("DB lock poisoned: {}", e))?;
        f(&mut conn)
    }

    /// Run a blocking closure against the database off the async runtime.
    pub async fn call<F, T>(self: &Arc<Self>, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| anyhow!("spawn_blocking join error: {}", e))?
    }
}

/// The `table.column` named by a UNIQUE constraint failure, if that is what
/// `err` is. Lets callers map a lost check-then-write race to a client error.
pub fn unique_violation(err: &anyhow::Error) -> Option<&str> {
    match err.downcast_ref::<rusqlite::Error>()? {
        rusqlite::Error::SqliteFailure(e, Some(msg))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            msg.strip_prefix("UNIQUE constraint failed: ")
        }
        _ => None,
    }
}

/// Current time as stored in every `created_at`/`updated_at` column.
/// Fixed-width RFC 3339, so string order is time order.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_sort_lexicographically() {
        let a = now_timestamp();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = now_timestamp();
        assert!(a < b);
        assert_eq!(a.len(), b.len());
    }

    #[test]
    fn unique_violation_names_the_column() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "alice", "alice@example.com", "Alice", "hash").unwrap();

        let err = db
            .create_user("u2", "alice", "other@example.com", "Alice", "hash")
            .unwrap_err();
        assert_eq!(unique_violation(&err), Some("users.username"));

        let err = db
            .create_user("u3", "alice2", "alice@example.com", "Alice", "hash")
            .unwrap_err();
        assert_eq!(unique_violation(&err), Some("users.email"));

        assert_eq!(unique_violation(&anyhow!("unrelated")), None);
    }

    #[tokio::test]
    async fn call_runs_off_the_runtime() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let n: i64 = db
            .call(|db| db.with_conn(|conn| Ok(conn.query_row("SELECT 41 + 1", [], |r| r.get(0))?)))
            .await
            .unwrap();
        assert_eq!(n, 42);
    }
}
