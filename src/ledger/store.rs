use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::error::{LedgerError, Result};
use super::partitions::{
    EntityKey, EntityKind, decode_kind_index_key, encode_kind_index_key, encode_kind_prefix,
    encode_record_key, encode_sort_prefix, work_pk,
};

/// One row of the single-table layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub pk: String,
    pub sk: String,
    pub kind: EntityKind,
    /// Secondary index: kind name
    pub gsi_pk: String,
    /// Secondary index: `{pk}|{sk}`
    pub gsi_sk: String,
    pub fields: Value,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    pub fn new(kind: EntityKind, key: &EntityKey, fields: Value) -> Self {
        Self {
            pk: key.pk.clone(),
            sk: key.sk.clone(),
            kind,
            gsi_pk: kind.as_str().to_string(),
            gsi_sk: key.joined(),
            fields,
            updated_at: Utc::now(),
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.pk.clone(), self.sk.clone())
    }
}

/// Durable structured records with idempotent writes.
///
/// `upsert` replaces whatever is stored under the key, so replaying a write
/// never creates a second record. `conditional_insert` is insert-if-absent and
/// is atomic with respect to every other write on the same store.
pub trait MetadataStore: Send + Sync {
    fn upsert(&self, kind: EntityKind, key: &EntityKey, fields: Value) -> Result<()>;

    fn get(&self, kind: EntityKind, key: &EntityKey) -> Result<Option<Record>>;

    /// Chapters and pages of one work, in key order
    fn query_by_work(&self, work_id: &str) -> Result<Vec<Record>>;

    /// Records under one partition key whose sort key starts with `sk_prefix`
    fn query_prefix(&self, pk: &str, sk_prefix: &str) -> Result<Vec<Record>>;

    /// Highest-sorting record under `pk` with the given sort key prefix
    fn last_in_prefix(&self, pk: &str, sk_prefix: &str) -> Result<Option<Record>>;

    /// Returns `false` without writing when the key is already taken
    fn conditional_insert(&self, kind: EntityKind, key: &EntityKey, fields: Value) -> Result<bool>;

    fn list_by_kind(&self, kind: EntityKind) -> Result<Vec<Record>>;

    /// Make every acknowledged write durable
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Fjall-backed metadata store
#[derive(Clone)]
pub struct FjallStore {
    keyspace: Keyspace,
    records: PartitionHandle,
    kind_index: PartitionHandle,
    // insert-if-absent must not interleave with another write
    write_lock: Arc<Mutex<()>>,
}

impl FjallStore {
    /// Open or create a Fjall store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening Fjall store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let records = keyspace.open_partition("records", PartitionCreateOptions::default())?;
        let kind_index = keyspace.open_partition("kind_index", PartitionCreateOptions::default())?;

        info!("Fjall store opened successfully");
        Ok(Self {
            keyspace,
            records,
            kind_index,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn write(&self, record: &Record) -> Result<()> {
        let key = record.key();
        let value = serde_json::to_vec(record)?;
        let mut batch = self.keyspace.batch();
        batch.insert(&self.records, encode_record_key(&key), value);
        batch.insert(&self.kind_index, encode_kind_index_key(record.kind, &key), Vec::new());
        batch.commit()?;
        Ok(())
    }

    fn read(&self, key: &EntityKey) -> Result<Option<Record>> {
        match self.records.get(encode_record_key(key))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn scan(&self, prefix: Vec<u8>) -> Result<Vec<Record>> {
        let mut out = Vec::new();
        for item in self.records.prefix(prefix) {
            let (_, value) = item?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }

    /// Record counts per kind (for debugging/monitoring)
    pub fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();
        for item in self.kind_index.iter() {
            let (key, _) = item?;
            let Some((kind, _)) = decode_kind_index_key(&key) else {
                continue;
            };
            stats.total += 1;
            match kind.as_str() {
                "WORK" => stats.works += 1,
                "CHAPTER" => stats.chapters += 1,
                "PAGE" => stats.pages += 1,
                "DEDUP_RECORD" => stats.dedup_records += 1,
                "JOB_RUN" => stats.job_runs += 1,
                _ => {}
            }
        }
        Ok(stats)
    }
}

impl MetadataStore for FjallStore {
    fn upsert(&self, kind: EntityKind, key: &EntityKey, fields: Value) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.write(&Record::new(kind, key, fields))?;
        debug!(kind = kind.as_str(), pk = %key.pk, sk = %key.sk, "Upserted record");
        Ok(())
    }

    fn get(&self, kind: EntityKind, key: &EntityKey) -> Result<Option<Record>> {
        match self.read(key)? {
            Some(record) if record.kind != kind => Err(LedgerError::KindMismatch {
                key: key.joined(),
                expected: kind,
                actual: record.kind,
            }),
            other => Ok(other),
        }
    }

    fn query_by_work(&self, work_id: &str) -> Result<Vec<Record>> {
        let records = self.scan(encode_sort_prefix(&work_pk(work_id), "CHAPTER#"))?;
        Ok(records
            .into_iter()
            .filter(|r| matches!(r.kind, EntityKind::Chapter | EntityKind::Page))
            .collect())
    }

    fn query_prefix(&self, pk: &str, sk_prefix: &str) -> Result<Vec<Record>> {
        self.scan(encode_sort_prefix(pk, sk_prefix))
    }

    fn last_in_prefix(&self, pk: &str, sk_prefix: &str) -> Result<Option<Record>> {
        match self.records.prefix(encode_sort_prefix(pk, sk_prefix)).next_back() {
            Some(item) => {
                let (_, value) = item?;
                Ok(Some(serde_json::from_slice(&value)?))
            }
            None => Ok(None),
        }
    }

    fn conditional_insert(&self, kind: EntityKind, key: &EntityKey, fields: Value) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.records.contains_key(encode_record_key(key))? {
            return Ok(false);
        }
        self.write(&Record::new(kind, key, fields))?;
        debug!(kind = kind.as_str(), pk = %key.pk, "Inserted record");
        Ok(true)
    }

    fn list_by_kind(&self, kind: EntityKind) -> Result<Vec<Record>> {
        let mut out = Vec::new();
        for item in self.kind_index.prefix(encode_kind_prefix(kind)) {
            let (key, _) = item?;
            let Some((_, record_key)) = decode_kind_index_key(&key) else {
                return Err(LedgerError::InvalidKey(
                    String::from_utf8_lossy(&key).into_owned(),
                ));
            };
            if let Some(record) = self.read(&record_key)? {
                out.push(record);
            }
        }
        Ok(out)
    }

    fn flush(&self) -> Result<()> {
        self.persist()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub total: usize,
    pub works: usize,
    pub chapters: usize,
    pub pages: usize,
    pub dedup_records: usize,
    pub job_runs: usize,
}
