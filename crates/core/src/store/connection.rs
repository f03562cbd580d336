//! SQLite store connection management with pragma configuration.
//!
//! This module handles opening the SQLite database, applying required pragmas
//! for concurrency (WAL mode, busy timeout), and running migrations.

use super::migrations;
use crate::Error;
use std::path::Path;
use std::time::Duration;
use tokio_rusqlite::Connection;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed shared store handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread. Cloning shares the connection.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pub(crate) conn: Connection,
    pub(crate) ttl: Duration,
}

impl SqliteStore {
    /// Open a store at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies pragmas, and runs any
    /// pending migrations. `timeout` bounds how long a write waits on a lock
    /// held by another process.
    pub async fn open(path: impl AsRef<Path>, ttl: Duration, timeout: Duration) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)
            .await
            .map_err(|e| Error::StoreUnavailable(format!("{}: {e}", path.display())))?;

        Self::configure(conn, ttl, timeout).await
    }

    /// Open an in-memory store for testing.
    pub async fn open_in_memory(ttl: Duration) -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;

        Self::configure(conn, ttl, DEFAULT_BUSY_TIMEOUT).await
    }

    async fn configure(conn: Connection, ttl: Duration, timeout: Duration) -> Result<Self, Error> {
        conn.call(move |conn| -> Result<(), Error> {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA synchronous=NORMAL;
                 PRAGMA temp_store=MEMORY;",
            )?;
            conn.busy_timeout(timeout)?;
            Ok(())
        })
        .await
        .map_err(Error::from)?;

        migrations::run(&conn).await?;

        tracing::debug!(ttl_secs = ttl.as_secs(), "sqlite store ready");
        Ok(Self { conn, ttl })
    }

    /// Table TTL applied on every write.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let store = SqliteStore::open_in_memory(Duration::from_secs(60)).await.unwrap();
        let version = store
            .conn
            .call(|conn| conn.query_row("SELECT sqlite_version()", [], |row| row.get::<_, String>(0)))
            .await
            .unwrap();
        assert!(!version.is_empty());
        assert_eq!(store.ttl(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_open_file_reuses_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.sqlite");
        let timeout = Duration::from_millis(500);

        SqliteStore::open(&path, Duration::from_secs(60), timeout).await.unwrap();
        let reopened = SqliteStore::open(&path, Duration::from_secs(60), timeout).await;
        assert!(reopened.is_ok());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_open_unwritable_path_is_store_fault() {
        let result =
            SqliteStore::open("/nonexistent-dir/store.sqlite", Duration::from_secs(60), DEFAULT_BUSY_TIMEOUT).await;
        assert!(matches!(result, Err(Error::StoreUnavailable(_))));
    }
}
