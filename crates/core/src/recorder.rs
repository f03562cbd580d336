//! Writes request records and dependency snapshots into the shared store.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::config::StoreTables;
use crate::request::{RequestContext, RequestFingerprint, RequestRecord, content_digest};
use crate::store::SharedStore;

/// Files resolved while serving a request, content-addressed by their JSON encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySnapshot {
    pub digest: String,
    pub files: Vec<String>,
}

impl DependencySnapshot {
    /// Build a snapshot and the JSON text it is stored as.
    pub fn from_files<S: AsRef<str>>(files: &[S]) -> Result<(Self, String), Error> {
        let files: Vec<String> = files.iter().map(|f| f.as_ref().to_string()).collect();
        let encoded = serde_json::to_string(&files)?;
        let digest = content_digest(&encoded);
        Ok((Self { digest, files }, encoded))
    }
}

/// Dedup and dependency recorder bound to one store and its table names.
#[derive(Clone)]
pub struct Recorder {
    store: Arc<dyn SharedStore>,
    tables: StoreTables,
    max_field_bytes: usize,
}

impl Recorder {
    pub fn new(store: Arc<dyn SharedStore>, tables: StoreTables, max_field_bytes: usize) -> Self {
        Self { store, tables, max_field_bytes }
    }

    pub fn store(&self) -> &Arc<dyn SharedStore> {
        &self.store
    }

    pub fn tables(&self) -> &StoreTables {
        &self.tables
    }

    /// Whether `fingerprint` already has a record in the current window.
    pub async fn is_recorded(&self, fingerprint: &RequestFingerprint) -> Result<bool, Error> {
        self.store.exists(&self.tables.requests, fingerprint.as_str()).await
    }

    /// Persist the record for `ctx` unless `fingerprint` was already seen.
    ///
    /// The existence check skips sanitizing and encoding for known requests.
    /// The write itself is set-if-absent, so concurrent first sightings of
    /// the same request produce one record and one `true`.
    pub async fn record_if_absent(&self, fingerprint: &RequestFingerprint, ctx: &RequestContext) -> Result<bool, Error> {
        if self.is_recorded(fingerprint).await? {
            return Ok(false);
        }

        let record = RequestRecord::from_context(ctx, self.max_field_bytes);
        let encoded = serde_json::to_string(&record)?;
        let written = self
            .store
            .write_field_if_absent(&self.tables.requests, fingerprint.as_str(), &encoded)
            .await?;

        if written {
            tracing::debug!(%fingerprint, entry_point = %ctx.entry_point, "recorded request");
        }
        Ok(written)
    }

    /// Store the dependency file list under its content digest.
    ///
    /// Always writes; an identical list lands on the same field.
    pub async fn record_dependency_snapshot<S: AsRef<str>>(&self, files: &[S]) -> Result<DependencySnapshot, Error> {
        let (snapshot, encoded) = DependencySnapshot::from_files(files)?;
        self.store
            .write_field(&self.tables.dependencies, &snapshot.digest, &encoded)
            .await?;
        tracing::debug!(digest = %snapshot.digest, files = snapshot.files.len(), "recorded dependency snapshot");
        Ok(snapshot)
    }
}
