//! Network clients for tracelabel.
//!
//! This crate provides the Redis backend of the shared store used by the
//! CLI and by hosts embedding the labeler.

pub mod redis;

pub use crate::redis::{RedisStore, UrlError, connection_url};
