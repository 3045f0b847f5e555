//! Catalog entities persisted in the metadata store and surfaced in run reports

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::observability::RunCountersSnapshot;

#[derive(Debug, Error)]
#[error("invalid chapter number: {0}")]
pub struct InvalidChapterNumber(pub String);

/// Position of a chapter within its work. Ordered, not necessarily contiguous
/// (`12.5` extras are common).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct ChapterNumber(f64);

impl ChapterNumber {
    pub fn new(value: f64) -> Result<Self, InvalidChapterNumber> {
        if value.is_finite() && value >= 0.0 {
            Ok(Self(value))
        } else {
            Err(InvalidChapterNumber(value.to_string()))
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Fixed-width rendering that sorts lexicographically in numeric order
    pub fn sort_key(&self) -> String {
        format!("{:012.4}", self.0)
    }
}

impl PartialEq for ChapterNumber {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ChapterNumber {}

impl PartialOrd for ChapterNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChapterNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl TryFrom<f64> for ChapterNumber {
    type Error = InvalidChapterNumber;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChapterNumber> for f64 {
    fn from(value: ChapterNumber) -> Self {
        value.0
    }
}

impl FromStr for ChapterNumber {
    type Err = InvalidChapterNumber;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f64 = s
            .trim()
            .parse()
            .map_err(|_| InvalidChapterNumber(s.to_string()))?;
        Self::new(value)
    }
}

impl fmt::Display for ChapterNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkStatus {
    Ongoing,
    Completed,
    Hiatus,
    Cancelled,
    Upcoming,
}

impl WorkStatus {
    /// Map free-form status text scraped from a site onto a known status.
    pub fn parse_loose(text: &str) -> Option<Self> {
        let text = text.to_lowercase();
        if text.contains("ongoing") || text.contains("updating") || text.contains("publishing") {
            Some(Self::Ongoing)
        } else if text.contains("complete") || text.contains("finished") {
            Some(Self::Completed)
        } else if text.contains("hiatus") {
            Some(Self::Hiatus)
        } else if text.contains("cancelled") || text.contains("canceled") || text.contains("dropped")
        {
            Some(Self::Cancelled)
        } else if text.contains("upcoming") || text.contains("not yet") {
            Some(Self::Upcoming)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChapterStatus {
    Pending,
    InProgress,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    Fetched,
    Processed,
    Stored,
    Duplicate,
}

impl PageStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Stored | Self::Duplicate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Aborted,
}

/// Machine-readable cause recorded against a failed page or chapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureCause {
    FetchError,
    ParseError,
    DecodeError,
    EncodeError,
    StorageError,
    EmptyChapter,
}

impl FailureCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchError => "fetch-error",
            Self::ParseError => "parse-error",
            Self::DecodeError => "decode-error",
            Self::EncodeError => "encode-error",
            Self::StorageError => "storage-error",
            Self::EmptyChapter => "empty-chapter",
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Work {
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub status: Option<WorkStatus>,
    #[serde(default)]
    pub genres: BTreeSet<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    #[serde(default)]
    pub alt_titles: Vec<String>,
    pub source_id: String,
    pub source_url: String,
    pub created_at: DateTime<Utc>,
    pub last_scraped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageFailure {
    pub index: u32,
    pub cause: FailureCause,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub work_id: String,
    pub number: ChapterNumber,
    pub title: Option<String>,
    pub source_url: String,
    pub page_count: u32,
    pub release_date: Option<String>,
    pub status: ChapterStatus,
    /// Chapter-level cause when the page listing itself failed
    pub failure: Option<FailureCause>,
    #[serde(default)]
    pub failed_pages: Vec<PageFailure>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub work_id: String,
    pub chapter: ChapterNumber,
    pub index: u32,
    pub source_url: String,
    pub status: PageStatus,
    pub object_key: Option<String>,
    pub thumbnail_key: Option<String>,
    pub content_hash: Option<String>,
    pub byte_size: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    #[serde(default)]
    pub oversized: bool,
    pub updated_at: DateTime<Utc>,
}

impl Page {
    pub fn fetched(work_id: &str, chapter: ChapterNumber, index: u32, source_url: &str) -> Self {
        Self {
            work_id: work_id.to_string(),
            chapter,
            index,
            source_url: source_url.to_string(),
            status: PageStatus::Fetched,
            object_key: None,
            thumbnail_key: None,
            content_hash: None,
            byte_size: None,
            width: None,
            height: None,
            oversized: false,
            updated_at: Utc::now(),
        }
    }
}

/// Content hash -> the one object key holding those bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupRecord {
    pub content_hash: String,
    pub canonical_key: String,
    pub thumbnail_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedChapter {
    pub number: ChapterNumber,
    pub reason: FailureCause,
    #[serde(default)]
    pub pages: Vec<PageFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortReason {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRun {
    pub run_id: Uuid,
    pub work_id: String,
    pub source_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub chapters_requested: u32,
    pub chapters_completed: u32,
    pub chapters_failed: u32,
    #[serde(default)]
    pub failed_chapters: Vec<FailedChapter>,
    /// Last chapter known to be fully persisted
    pub cursor: Option<ChapterNumber>,
    #[serde(default)]
    pub counters: RunCountersSnapshot,
    pub abort: Option<AbortReason>,
}

impl JobRun {
    pub fn start(work_id: &str, source_id: &str, cursor: Option<ChapterNumber>) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            work_id: work_id.to_string(),
            source_id: source_id.to_string(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
            chapters_requested: 0,
            chapters_completed: 0,
            chapters_failed: 0,
            failed_chapters: Vec::new(),
            cursor,
            counters: RunCountersSnapshot::default(),
            abort: None,
        }
    }

    /// Move the cursor forward, never backward
    pub fn advance_cursor(&mut self, number: ChapterNumber) {
        self.cursor = Some(match self.cursor {
            Some(current) if current >= number => current,
            _ => number,
        });
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub requests_per_second: f64,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfigRecord {
    pub name: String,
    pub values: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(value: f64) -> ChapterNumber {
        ChapterNumber::new(value).unwrap()
    }

    #[test]
    fn test_chapter_number_ordering() {
        let mut numbers = vec![num(10.0), num(2.0), num(2.5), num(1.0)];
        numbers.sort();
        let values: Vec<f64> = numbers.iter().map(ChapterNumber::value).collect();
        assert_eq!(values, vec![1.0, 2.0, 2.5, 10.0]);
    }

    #[test]
    fn test_chapter_number_display_and_sort_key() {
        assert_eq!(num(3.0).to_string(), "3");
        assert_eq!(num(12.5).to_string(), "12.5");
        assert_eq!(num(3.0).sort_key(), "0000003.0000");
        assert!(num(2.0).sort_key() < num(10.0).sort_key());
    }

    #[test]
    fn test_chapter_number_rejects_invalid() {
        assert!(ChapterNumber::new(f64::NAN).is_err());
        assert!(ChapterNumber::new(-1.0).is_err());
        assert!("abc".parse::<ChapterNumber>().is_err());
        assert_eq!("7.5".parse::<ChapterNumber>().unwrap(), num(7.5));
    }

    #[test]
    fn test_chapter_number_serde() {
        let json = serde_json::to_string(&num(4.5)).unwrap();
        assert_eq!(json, "4.5");
        let parsed: ChapterNumber = serde_json::from_str("4.5").unwrap();
        assert_eq!(parsed, num(4.5));
        assert!(serde_json::from_str::<ChapterNumber>("-2").is_err());
    }

    #[test]
    fn test_work_status_parse_loose() {
        assert_eq!(WorkStatus::parse_loose("Status : Ongoing"), Some(WorkStatus::Ongoing));
        assert_eq!(WorkStatus::parse_loose("Completed"), Some(WorkStatus::Completed));
        assert_eq!(WorkStatus::parse_loose("on hiatus"), Some(WorkStatus::Hiatus));
        assert_eq!(WorkStatus::parse_loose("Dropped"), Some(WorkStatus::Cancelled));
        assert_eq!(WorkStatus::parse_loose("unknown"), None);
    }

    #[test]
    fn test_cursor_never_moves_backward() {
        let mut run = JobRun::start("w", "s", Some(num(5.0)));
        run.advance_cursor(num(3.0));
        assert_eq!(run.cursor, Some(num(5.0)));
        run.advance_cursor(num(6.0));
        assert_eq!(run.cursor, Some(num(6.0)));
    }

    #[test]
    fn test_failure_cause_codes() {
        let json = serde_json::to_string(&FailureCause::DecodeError).unwrap();
        assert_eq!(json, "\"decode-error\"");
        assert_eq!(FailureCause::EmptyChapter.to_string(), "empty-chapter");
    }
}
