//! Typed view of the shared store for stream snapshots.

use std::collections::HashMap;
use std::sync::Arc;

use stream_platforms::{StreamData, StreamDataKey};
use tracing::warn;

use super::{SetMode, SharedStateStore};
use crate::Result;

/// Stream snapshots stored as `"<platform>:<name>" -> JSON` fields of one
/// bucket.
#[derive(Clone)]
pub struct StreamStateStore {
    store: Arc<dyn SharedStateStore>,
    bucket: String,
}

impl StreamStateStore {
    pub fn new(store: Arc<dyn SharedStateStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Write `data` only if its key is not tracked yet. Returns whether it
    /// was written.
    pub async fn seed(&self, data: &StreamData) -> Result<bool> {
        let value = serde_json::to_string(data)?;
        self.store
            .hash_set(&self.bucket, &data.key().to_string(), &value, SetMode::OnlyIfAbsent)
            .await
    }

    /// Replace the snapshot for `data`'s key.
    pub async fn put(&self, data: &StreamData) -> Result<()> {
        let value = serde_json::to_string(data)?;
        self.store
            .hash_set(&self.bucket, &data.key().to_string(), &value, SetMode::AlwaysReplace)
            .await?;
        Ok(())
    }

    pub async fn remove(&self, key: &StreamDataKey) -> Result<bool> {
        self.store.hash_delete(&self.bucket, &key.to_string()).await
    }

    /// Every tracked key with its last snapshot.
    ///
    /// A field with an undecodable name is logged and skipped. A field whose
    /// value is empty or undecodable is still tracked, with no snapshot.
    pub async fn load_tracked(&self) -> Result<HashMap<StreamDataKey, Option<StreamData>>> {
        let raw = self.store.hash_get_all(&self.bucket).await?;
        let mut tracked = HashMap::with_capacity(raw.len());

        for (field, value) in raw {
            let key = match field.parse::<StreamDataKey>() {
                Ok(key) => key,
                Err(e) => {
                    warn!(
                        bucket = %self.bucket,
                        field = %field,
                        error = %e,
                        "skipping undecodable stream key"
                    );
                    continue;
                }
            };
            let snapshot = if value.is_empty() {
                None
            } else {
                match serde_json::from_str::<StreamData>(&value) {
                    Ok(data) => Some(data),
                    Err(e) => {
                        warn!(
                            bucket = %self.bucket,
                            key = %key,
                            error = %e,
                            "undecodable stream snapshot, treating as unseen"
                        );
                        None
                    }
                }
            };
            tracked.insert(key, snapshot);
        }

        Ok(tracked)
    }

    /// Delete every tracked snapshot.
    pub async fn clear(&self) -> Result<bool> {
        self.store.key_delete(&self.bucket).await
    }
}
