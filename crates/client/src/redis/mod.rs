//! Redis backend for the shared store.
//!
//! ### Mapping
//! - table → Redis hash key, field → hash field
//! - write → `MULTI; HSET; EXPIRE; EXEC`
//! - write-if-absent → `MULTI; HSETNX; EXPIRE; EXEC`
//! - read → `HGETALL`, existence → `HEXISTS`, clear → `DEL`, TTL → `TTL`
//! - remove drained fields → `HDEL` (Redis drops a hash left empty)
//!
//! ### Timeouts
//! Every call, connect included, is bounded by the configured timeout.
//! Expiry and transport faults both surface as `StoreUnavailable`.

pub mod url;

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisError, RedisResult};
use tracelabel_core::config::RedisSettings;
use tracelabel_core::{Error, SharedStore};

pub use self::url::{UrlError, connection_url, redacted};

/// Shared store backed by a Redis (or compatible) server.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    ttl: Duration,
    timeout: Duration,
}

fn unavailable(err: RedisError) -> Error {
    Error::StoreUnavailable(err.to_string())
}

async fn bounded<T, F>(timeout: Duration, op: F) -> Result<T, Error>
where
    F: Future<Output = RedisResult<T>>,
{
    match tokio::time::timeout(timeout, op).await {
        Ok(result) => result.map_err(unavailable),
        Err(elapsed) => Err(elapsed.into()),
    }
}

impl RedisStore {
    /// Connect using `settings`, selecting the configured database.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` when the host is missing, the URL is invalid, or
    /// the server cannot be reached within `timeout`.
    pub async fn connect(settings: &RedisSettings, ttl: Duration, timeout: Duration) -> Result<Self, Error> {
        let url = connection_url(settings).map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        let client = redis::Client::open(url.as_str()).map_err(unavailable)?;
        let conn = bounded(timeout, client.get_multiplexed_async_connection()).await?;

        tracing::debug!(url = %redacted(&url), "connected to redis");
        Ok(Self { conn, ttl, timeout })
    }

    fn ttl_secs(&self) -> i64 {
        i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX)
    }
}

#[async_trait::async_trait]
impl SharedStore for RedisStore {
    async fn exists(&self, table: &str, field: &str) -> Result<bool, Error> {
        let mut conn = self.conn.clone();
        bounded(self.timeout, conn.hexists(table, field)).await
    }

    async fn read_all(&self, table: &str) -> Result<BTreeMap<String, String>, Error> {
        let mut conn = self.conn.clone();
        let fields: BTreeMap<String, String> = bounded(self.timeout, conn.hgetall(table)).await?;
        Ok(fields)
    }

    async fn write_field(&self, table: &str, field: &str, value: &str) -> Result<(), Error> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset(table, field, value)
            .ignore()
            .expire(table, self.ttl_secs())
            .ignore();
        let () = bounded(self.timeout, pipe.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn write_field_if_absent(&self, table: &str, field: &str, value: &str) -> Result<bool, Error> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset_nx(table, field, value)
            .expire(table, self.ttl_secs())
            .ignore();
        let (created,): (bool,) = bounded(self.timeout, pipe.query_async(&mut conn)).await?;
        Ok(created)
    }

    async fn time_to_live(&self, table: &str) -> Result<Option<Duration>, Error> {
        let mut conn = self.conn.clone();
        let secs: i64 = bounded(self.timeout, conn.ttl(table)).await?;
        Ok(match secs {
            -2 => None,
            -1 => Some(Duration::MAX),
            secs => Some(Duration::from_secs(u64::try_from(secs).unwrap_or(0))),
        })
    }

    async fn clear(&self, table: &str) -> Result<(), Error> {
        let mut conn = self.conn.clone();
        let () = bounded(self.timeout, conn.del(table)).await?;
        Ok(())
    }

    async fn remove_fields(&self, table: &str, fields: &[String]) -> Result<(), Error> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let () = bounded(self.timeout, conn.hdel(table, fields)).await?;
        Ok(())
    }

    /// The multiplexed connection is shared by every clone and closes when
    /// the last one is dropped.
    async fn close(&self) -> Result<(), Error> {
        tracing::debug!("releasing redis connection handle");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::net::TcpListener;

    const TTL: Duration = Duration::from_secs(100_800);

    fn local(port: u16) -> RedisSettings {
        RedisSettings { host: Some("127.0.0.1".into()), port, db: 1, ..Default::default() }
    }

    #[tokio::test]
    async fn test_connect_without_host_is_unavailable() {
        let result = RedisStore::connect(&RedisSettings::default(), TTL, Duration::from_millis(200)).await;
        assert!(matches!(result, Err(Error::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_connect_refused_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = RedisStore::connect(&local(port), TTL, Duration::from_millis(500)).await;
        assert!(matches!(result, Err(Error::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_connect_times_out_on_silent_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let silent = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let started = Instant::now();
        let result = RedisStore::connect(&local(port), TTL, Duration::from_millis(200)).await;

        assert!(matches!(result, Err(Error::StoreUnavailable(_))));
        assert!(started.elapsed() < Duration::from_secs(3));
        silent.abort();
    }
}
