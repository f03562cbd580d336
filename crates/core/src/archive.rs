//! Drains the request-log table into an append-only text log.
//!
//! Each record becomes one line, `Hash: <fingerprint>, Details: <json>`, with
//! the stored JSON copied verbatim. Appends hold an exclusive `flock` so
//! overlapping archivers and other log writers never interleave bytes.
//!
//! Delivery is at-most-once: records read but not yet appended when the
//! process dies are gone once the table expires. A failed append leaves the
//! table untouched for the next run. Only the drained fields are deleted, so
//! records written while an archive runs wait for the next one.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::{Value, json};

use crate::Error;
use crate::store::SharedStore;

/// Outcome of one archive run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReport {
    pub path: PathBuf,
    /// Number of lines appended; zero means the file was not touched.
    pub records: usize,
    pub structured_path: Option<PathBuf>,
}

/// Per-day archive file: `<dir>/<prefix>YYYY-MM-DD.log`.
pub fn daily_archive_path(dir: &Path, prefix: &str, date: NaiveDate) -> PathBuf {
    dir.join(format!("{prefix}{}.log", date.format("%Y-%m-%d")))
}

/// Render one archived line, newline included.
pub fn archived_line(fingerprint: &str, details: &str) -> String {
    format!("Hash: {fingerprint}, Details: {details}\n")
}

fn structured_line(fingerprint: &str, details: &str) -> String {
    let details = serde_json::from_str::<Value>(details).unwrap_or_else(|_| Value::String(details.to_string()));
    format!("{}\n", json!({ "hash": fingerprint, "details": details }))
}

fn ends_mid_line(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// Append `content` to `path` under an exclusive advisory lock.
///
/// Existing content that lacks a final newline (the log filter writes none)
/// gets one first, so appended lines always start a line of their own.
pub fn append_exclusive(path: &Path, content: &str) -> Result<(), Error> {
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::file_access(path, e))?;

    #[cfg(unix)]
    let mut file = nix::fcntl::Flock::lock(file, nix::fcntl::FlockArg::LockExclusive)
        .map_err(|(_, errno)| Error::file_access(path, errno.into()))?;
    #[cfg(not(unix))]
    let mut file = file;

    if ends_mid_line(&mut file).map_err(|e| Error::file_access(path, e))? {
        file.write_all(b"\n").map_err(|e| Error::file_access(path, e))?;
    }
    file.write_all(content.as_bytes()).map_err(|e| Error::file_access(path, e))?;
    file.flush().map_err(|e| Error::file_access(path, e))
}

/// [`append_exclusive`] on the blocking pool; waiting on the lock must not stall the runtime.
async fn append_exclusive_blocking(path: PathBuf, content: String) -> Result<(), Error> {
    let target = path.clone();
    tokio::task::spawn_blocking(move || append_exclusive(&path, &content))
        .await
        .map_err(|e| Error::file_access(&target, io::Error::other(e)))?
}

/// Moves request records from the store into archive files.
#[derive(Clone)]
pub struct Archiver {
    store: Arc<dyn SharedStore>,
    table: String,
    structured: bool,
}

impl Archiver {
    pub fn new(store: Arc<dyn SharedStore>, table: impl Into<String>) -> Self {
        Self { store, table: table.into(), structured: false }
    }

    /// Also append a JSON-lines sibling (`<stem>.jsonl`) next to the text archive.
    pub fn with_structured_sibling(mut self, enabled: bool) -> Self {
        self.structured = enabled;
        self
    }

    /// Drain the request table into `path` and delete the drained records.
    ///
    /// An empty table leaves `path` untouched but is still cleared.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` when the table cannot be read or cleared,
    /// `FileAccessDenied` when the append fails (the table is kept).
    pub async fn archive(&self, path: &Path) -> Result<ArchiveReport, Error> {
        let entries = self.store.read_all(&self.table).await?;
        let mut report = ArchiveReport { path: path.to_path_buf(), records: entries.len(), structured_path: None };

        if !entries.is_empty() {
            let content: String = entries.iter().map(|(hash, details)| archived_line(hash, details)).collect();
            append_exclusive_blocking(path.to_path_buf(), content).await?;

            if self.structured {
                let sibling = path.with_extension("jsonl");
                let lines: String = entries.iter().map(|(hash, details)| structured_line(hash, details)).collect();
                match append_exclusive_blocking(sibling.clone(), lines).await {
                    Ok(()) => report.structured_path = Some(sibling),
                    Err(e) => tracing::warn!(error = %e, "structured archive sibling not written"),
                }
            }

            let drained: Vec<String> = entries.into_keys().collect();
            self.store.remove_fields(&self.table, &drained).await?;
        } else {
            self.store.clear(&self.table).await?;
        }

        tracing::info!(path = %path.display(), records = report.records, "archived request log");
        Ok(report)
    }
}
