//! Hash table operations for the SQLite store.
//!
//! Expiry is enforced lazily: every operation first purges its table when
//! the stored deadline has passed, so an idle table reads as empty once its
//! window lapses.

use std::collections::BTreeMap;
use std::time::Duration;

use super::SharedStore;
use super::connection::SqliteStore;
use crate::Error;
use tokio_rusqlite::{params, rusqlite};

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

fn purge_if_expired(conn: &rusqlite::Connection, table: &str, now: i64) -> rusqlite::Result<()> {
    let expired: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM store_tables WHERE name = ?1 AND expires_at <= ?2)",
        params![table, now],
        |row| row.get(0),
    )?;
    if expired {
        conn.execute("DELETE FROM store_fields WHERE tbl = ?1", params![table])?;
        conn.execute("DELETE FROM store_tables WHERE name = ?1", params![table])?;
        tracing::debug!(table, "purged expired table");
    }
    Ok(())
}

fn refresh_expiry(conn: &rusqlite::Connection, table: &str, expires_at: i64) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO store_tables (name, expires_at) VALUES (?1, ?2)
         ON CONFLICT(name) DO UPDATE SET expires_at = excluded.expires_at",
        params![table, expires_at],
    )?;
    Ok(())
}

impl SqliteStore {
    fn expiry_from(&self, now: i64) -> i64 {
        now.saturating_add(i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX))
    }
}

#[async_trait::async_trait]
impl SharedStore for SqliteStore {
    async fn exists(&self, table: &str, field: &str) -> Result<bool, Error> {
        let table = table.to_string();
        let field = field.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                purge_if_expired(conn, &table, now_secs())?;
                let found: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM store_fields WHERE tbl = ?1 AND field = ?2)",
                    params![table, field],
                    |row| row.get(0),
                )?;
                Ok(found)
            })
            .await
            .map_err(Error::from)
    }

    async fn read_all(&self, table: &str) -> Result<BTreeMap<String, String>, Error> {
        let table = table.to_string();
        self.conn
            .call(move |conn| -> Result<BTreeMap<String, String>, Error> {
                purge_if_expired(conn, &table, now_secs())?;
                let mut stmt = conn.prepare("SELECT field, value FROM store_fields WHERE tbl = ?1")?;
                let rows = stmt.query_map(params![table], |row| Ok((row.get(0)?, row.get(1)?)))?;
                let mut fields = BTreeMap::new();
                for row in rows {
                    let (field, value): (String, String) = row?;
                    fields.insert(field, value);
                }
                Ok(fields)
            })
            .await
            .map_err(Error::from)
    }

    async fn write_field(&self, table: &str, field: &str, value: &str) -> Result<(), Error> {
        let table = table.to_string();
        let field = field.to_string();
        let value = value.to_string();
        let now = now_secs();
        let expires_at = self.expiry_from(now);
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                purge_if_expired(&tx, &table, now)?;
                tx.execute(
                    "INSERT INTO store_fields (tbl, field, value) VALUES (?1, ?2, ?3)
                     ON CONFLICT(tbl, field) DO UPDATE SET value = excluded.value",
                    params![table, field, value],
                )?;
                refresh_expiry(&tx, &table, expires_at)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn write_field_if_absent(&self, table: &str, field: &str, value: &str) -> Result<bool, Error> {
        let table = table.to_string();
        let field = field.to_string();
        let value = value.to_string();
        let now = now_secs();
        let expires_at = self.expiry_from(now);
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                purge_if_expired(&tx, &table, now)?;
                let inserted = tx.execute(
                    "INSERT OR IGNORE INTO store_fields (tbl, field, value) VALUES (?1, ?2, ?3)",
                    params![table, field, value],
                )?;
                refresh_expiry(&tx, &table, expires_at)?;
                tx.commit()?;
                Ok(inserted == 1)
            })
            .await
            .map_err(Error::from)
    }

    async fn time_to_live(&self, table: &str) -> Result<Option<Duration>, Error> {
        let table = table.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Duration>, Error> {
                let now = now_secs();
                purge_if_expired(conn, &table, now)?;
                let expires_at: Option<i64> = match conn.query_row(
                    "SELECT expires_at FROM store_tables WHERE name = ?1",
                    params![table],
                    |row| row.get(0),
                ) {
                    Ok(at) => Some(at),
                    Err(rusqlite::Error::QueryReturnedNoRows) => None,
                    Err(e) => return Err(e.into()),
                };
                Ok(expires_at.map(|at| Duration::from_secs(u64::try_from(at - now).unwrap_or(0))))
            })
            .await
            .map_err(Error::from)
    }

    async fn clear(&self, table: &str) -> Result<(), Error> {
        let table = table.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM store_fields WHERE tbl = ?1", params![table])?;
                tx.execute("DELETE FROM store_tables WHERE name = ?1", params![table])?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn remove_fields(&self, table: &str, fields: &[String]) -> Result<(), Error> {
        let table = table.to_string();
        let fields = fields.to_vec();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                purge_if_expired(&tx, &table, now_secs())?;
                for field in &fields {
                    tx.execute("DELETE FROM store_fields WHERE tbl = ?1 AND field = ?2", params![table, field])?;
                }
                tx.execute(
                    "DELETE FROM store_tables WHERE name = ?1
                     AND NOT EXISTS(SELECT 1 FROM store_fields WHERE tbl = ?1)",
                    params![table],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}
