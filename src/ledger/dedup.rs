//! Content-hash index shared by every work
//!
//! The first page to reserve a hash becomes the canonical copy; later pages
//! with the same normalized bytes point at it instead of storing again.

use std::sync::Arc;

use chrono::Utc;

use super::error::{LedgerError, Result};
use super::partitions::{EntityKey, EntityKind};
use super::store::MetadataStore;
use crate::models::DedupRecord;

/// Result of a reservation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupLookup {
    /// This caller won the reservation and should store the bytes
    pub is_new: bool,
    pub canonical_key: String,
    pub thumbnail_key: String,
}

#[derive(Clone)]
pub struct DuplicateIndex {
    store: Arc<dyn MetadataStore>,
}

impl DuplicateIndex {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Atomically claim `content_hash` for `object_key`, or return the
    /// existing claim. Exactly one concurrent caller sees `is_new`.
    pub fn lookup_or_reserve(
        &self,
        content_hash: &str,
        object_key: &str,
        thumbnail_key: &str,
    ) -> Result<DedupLookup> {
        let key = EntityKey::dedup(content_hash);
        let record = DedupRecord {
            content_hash: content_hash.to_string(),
            canonical_key: object_key.to_string(),
            thumbnail_key: thumbnail_key.to_string(),
            created_at: Utc::now(),
        };

        if self
            .store
            .conditional_insert(EntityKind::DedupRecord, &key, serde_json::to_value(&record)?)?
        {
            return Ok(DedupLookup {
                is_new: true,
                canonical_key: record.canonical_key,
                thumbnail_key: record.thumbnail_key,
            });
        }

        let existing = self.get(content_hash)?.ok_or_else(|| {
            LedgerError::Unavailable(format!("dedup record {} vanished", content_hash))
        })?;
        Ok(DedupLookup {
            is_new: false,
            canonical_key: existing.canonical_key,
            thumbnail_key: existing.thumbnail_key,
        })
    }

    pub fn get(&self, content_hash: &str) -> Result<Option<DedupRecord>> {
        self.store
            .get(EntityKind::DedupRecord, &EntityKey::dedup(content_hash))?
            .map(|record| serde_json::from_value(record.fields).map_err(LedgerError::from))
            .transpose()
    }
}
