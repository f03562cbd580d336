//! Shared store abstraction: named hash tables with a table-level TTL.
//!
//! Each table maps a field (a request fingerprint or a snapshot digest) to a
//! serialized value. Every write refreshes the whole table's expiry in the
//! same transaction, so a busy table never lapses and an idle one clears
//! itself after the configured window.
//!
//! Two backends implement [`SharedStore`]:
//!
//! - [`SqliteStore`] in this crate, for single-host deployments and tests
//! - `RedisStore` in `tracelabel-client`, for production

pub mod connection;
pub mod migrations;
pub mod tables;

use std::collections::BTreeMap;
use std::time::Duration;

pub use crate::Error;

pub use connection::SqliteStore;

/// TTL-capable hash-map key-value store.
///
/// All failures (connect, auth, transport, timeout) surface as
/// [`Error::StoreUnavailable`].
#[async_trait::async_trait]
pub trait SharedStore: Send + Sync {
    /// Whether `field` is present in `table`.
    async fn exists(&self, table: &str, field: &str) -> Result<bool, Error>;

    /// Snapshot of every field in `table`, ordered by field name.
    async fn read_all(&self, table: &str) -> Result<BTreeMap<String, String>, Error>;

    /// Set `field` and refresh the table TTL in one transaction.
    async fn write_field(&self, table: &str, field: &str, value: &str) -> Result<(), Error>;

    /// Set `field` only if absent, refreshing the table TTL either way.
    ///
    /// Returns `true` when this call created the field.
    async fn write_field_if_absent(&self, table: &str, field: &str, value: &str) -> Result<bool, Error>;

    /// Remaining TTL of `table`, or `None` when the table does not exist.
    async fn time_to_live(&self, table: &str) -> Result<Option<Duration>, Error>;

    /// Drop `table` and all of its fields.
    async fn clear(&self, table: &str) -> Result<(), Error>;

    /// Delete `fields` from `table`, leaving any other field in place.
    ///
    /// A table left with no fields is dropped, TTL included.
    async fn remove_fields(&self, table: &str, fields: &[String]) -> Result<(), Error>;

    /// Signal that this handle is done with the store.
    ///
    /// Both backends share one connection across clones, so this only logs;
    /// the connection itself is released when the last clone is dropped.
    async fn close(&self) -> Result<(), Error> {
        Ok(())
    }
}
