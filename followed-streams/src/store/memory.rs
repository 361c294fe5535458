use std::collections::HashMap;
use std::collections::hash_map::Entry;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{SetMode, SharedStateStore};
use crate::Result;

/// In-process store for single-process deployments and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    buckets: DashMap<String, HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedStateStore for MemoryStore {
    async fn hash_set(
        &self,
        bucket: &str,
        field: &str,
        value: &str,
        mode: SetMode,
    ) -> Result<bool> {
        let mut fields = self.buckets.entry(bucket.to_string()).or_default();
        match (fields.entry(field.to_string()), mode) {
            (Entry::Occupied(_), SetMode::OnlyIfAbsent) => Ok(false),
            (Entry::Occupied(mut entry), SetMode::AlwaysReplace) => {
                entry.insert(value.to_string());
                Ok(true)
            }
            (Entry::Vacant(entry), _) => {
                entry.insert(value.to_string());
                Ok(true)
            }
        }
    }

    async fn hash_delete(&self, bucket: &str, field: &str) -> Result<bool> {
        let removed = match self.buckets.get_mut(bucket) {
            Some(mut fields) => fields.remove(field).is_some(),
            None => false,
        };
        // An empty hash does not exist.
        self.buckets.remove_if(bucket, |_, fields| fields.is_empty());
        Ok(removed)
    }

    async fn hash_get_all(&self, bucket: &str) -> Result<HashMap<String, String>> {
        Ok(self
            .buckets
            .get(bucket)
            .map(|fields| fields.clone())
            .unwrap_or_default())
    }

    async fn key_delete(&self, bucket: &str) -> Result<bool> {
        Ok(self.buckets.remove(bucket).is_some())
    }
}
