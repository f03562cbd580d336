//! Core types and shared functionality for tracelabel.
//!
//! This crate provides:
//! - Request fingerprints and body sanitizing
//! - The shared store trait with a SQLite backend
//! - Dedup and dependency recorders, the archiver and the log filter
//! - The per-request labeler
//! - Unified error types
//! - Configuration structures

pub mod archive;
pub mod config;
pub mod error;
pub mod filter;
pub mod labeler;
pub mod profiler;
pub mod recorder;
pub mod request;
pub mod store;

pub use archive::{ArchiveReport, Archiver, daily_archive_path};
pub use config::{AppConfig, ConfigError, StoreBackend, StoreTables};
pub use error::Error;
pub use filter::{LogFilter, NoiseReport, delete_matching_lines};
pub use labeler::Labeler;
pub use profiler::Profiler;
pub use recorder::{DependencySnapshot, Recorder};
pub use request::{RequestContext, RequestFingerprint, RequestRecord, fingerprint, sanitize};
pub use store::{SharedStore, SqliteStore};
