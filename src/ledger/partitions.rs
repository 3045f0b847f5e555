//! Single-table key layout for the Fjall partitions
//!
//! Every entity is addressed by a partition key / sort key pair:
//! - SystemConfig: `CONFIG#{name}` / `CONFIG`
//! - Source:       `SOURCE#{id}` / `METADATA`
//! - Work:         `WORK#{id}` / `METADATA`
//! - Chapter:      `WORK#{id}` / `CHAPTER#{number:012.4}`
//! - Page:         `WORK#{id}` / `CHAPTER#{number:012.4}#PAGE#{index:04}`
//! - DedupRecord:  `HASH#{sha256}` / `DEDUP`
//! - JobRun:       `WORK#{id}` / `RUN#{uuidv7}`
//!
//! Partition structure:
//! - `records`: {pk}|{sk} -> Record (JSON)
//! - `kind_index`: {KIND}|{pk}|{sk} -> empty, for listing by kind

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ChapterNumber;

const SEPARATOR: char = '|';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    SystemConfig,
    Source,
    Work,
    Chapter,
    Page,
    DedupRecord,
    JobRun,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::SystemConfig => "SYSTEM_CONFIG",
            EntityKind::Source => "SOURCE",
            EntityKind::Work => "WORK",
            EntityKind::Chapter => "CHAPTER",
            EntityKind::Page => "PAGE",
            EntityKind::DedupRecord => "DEDUP_RECORD",
            EntityKind::JobRun => "JOB_RUN",
        }
    }
}

/// Composite primary key of a record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub pk: String,
    pub sk: String,
}

impl EntityKey {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }

    pub fn system_config(name: &str) -> Self {
        Self::new(format!("CONFIG#{}", name), "CONFIG")
    }

    pub fn source(source_id: &str) -> Self {
        Self::new(format!("SOURCE#{}", source_id), "METADATA")
    }

    pub fn work(work_id: &str) -> Self {
        Self::new(work_pk(work_id), "METADATA")
    }

    pub fn chapter(work_id: &str, number: ChapterNumber) -> Self {
        Self::new(work_pk(work_id), chapter_sk(number))
    }

    pub fn page(work_id: &str, number: ChapterNumber, index: u32) -> Self {
        Self::new(
            work_pk(work_id),
            format!("{}#PAGE#{:04}", chapter_sk(number), index),
        )
    }

    pub fn dedup(content_hash: &str) -> Self {
        Self::new(format!("HASH#{}", content_hash), "DEDUP")
    }

    pub fn job_run(work_id: &str, run_id: Uuid) -> Self {
        Self::new(work_pk(work_id), format!("{}{}", RUN_SK_PREFIX, run_id))
    }

    /// Secondary index sort key
    pub fn joined(&self) -> String {
        format!("{}{}{}", self.pk, SEPARATOR, self.sk)
    }
}

pub const RUN_SK_PREFIX: &str = "RUN#";

pub fn work_pk(work_id: &str) -> String {
    format!("WORK#{}", work_id)
}

fn chapter_sk(number: ChapterNumber) -> String {
    format!("CHAPTER#{}", number.sort_key())
}

/// Sort key prefix of every page in one chapter
pub fn chapter_pages_sk_prefix(number: ChapterNumber) -> String {
    format!("{}#PAGE#", chapter_sk(number))
}

/// Encode a record key: {pk}|{sk}
pub fn encode_record_key(key: &EntityKey) -> Vec<u8> {
    key.joined().into_bytes()
}

/// Decode a record key: {pk}|{sk} -> EntityKey
pub fn decode_record_key(key: &[u8]) -> Option<EntityKey> {
    let key_str = std::str::from_utf8(key).ok()?;
    let (pk, sk) = key_str.split_once(SEPARATOR)?;
    Some(EntityKey::new(pk, sk))
}

/// Encode a range-scan prefix within one partition key: {pk}|{sk_prefix}
pub fn encode_sort_prefix(pk: &str, sk_prefix: &str) -> Vec<u8> {
    format!("{}{}{}", pk, SEPARATOR, sk_prefix).into_bytes()
}

/// Encode a kind index key: {KIND}|{pk}|{sk}
pub fn encode_kind_index_key(kind: EntityKind, key: &EntityKey) -> Vec<u8> {
    format!("{}{}{}", kind.as_str(), SEPARATOR, key.joined()).into_bytes()
}

/// Encode a kind index prefix: {KIND}|
pub fn encode_kind_prefix(kind: EntityKind) -> Vec<u8> {
    format!("{}{}", kind.as_str(), SEPARATOR).into_bytes()
}

/// Decode a kind index key back into the record key
pub fn decode_kind_index_key(key: &[u8]) -> Option<(String, EntityKey)> {
    let key_str = std::str::from_utf8(key).ok()?;
    let (kind, rest) = key_str.split_once(SEPARATOR)?;
    let record_key = decode_record_key(rest.as_bytes())?;
    Some((kind.to_string(), record_key))
}
