//! Shared key-value state.
//!
//! A [`SharedStateStore`] is a hash-of-hashes: each bucket maps string
//! fields to string values. Every operation is atomic for a single field
//! only; nothing here offers multi-field transactions.

mod memory;
mod sqlite;
mod stream_state;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use stream_state::StreamStateStore;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::Result;

/// Write behaviour for [`SharedStateStore::hash_set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// Write only when the field does not exist yet.
    OnlyIfAbsent,
    /// Write unconditionally, replacing any existing value.
    AlwaysReplace,
}

#[async_trait]
pub trait SharedStateStore: Send + Sync {
    /// Set `field` in `bucket`. Returns whether the value was written.
    async fn hash_set(&self, bucket: &str, field: &str, value: &str, mode: SetMode)
    -> Result<bool>;

    /// Delete `field` from `bucket`. Returns whether it existed.
    async fn hash_delete(&self, bucket: &str, field: &str) -> Result<bool>;

    /// All fields of `bucket`; empty when the bucket does not exist.
    async fn hash_get_all(&self, bucket: &str) -> Result<HashMap<String, String>>;

    /// Delete the whole bucket. Returns whether it existed.
    async fn key_delete(&self, bucket: &str) -> Result<bool>;
}
