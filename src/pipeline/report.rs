use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AbortReason, ChapterNumber, ChapterStatus, FailedChapter, JobRun, RunStatus};
use crate::observability::RunCountersSnapshot;

/// What a caller gets back from one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub work_id: String,
    pub status: RunStatus,
    pub chapters_requested: u32,
    pub chapters_completed: u32,
    pub chapters_failed: u32,
    pub failed_chapters: Vec<FailedChapter>,
    pub cursor: Option<ChapterNumber>,
    pub counters: RunCountersSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort: Option<AbortReason>,
}

impl RunReport {
    pub fn is_aborted(&self) -> bool {
        self.status == RunStatus::Aborted
    }
}

impl From<&JobRun> for RunReport {
    fn from(run: &JobRun) -> Self {
        Self {
            run_id: run.run_id,
            work_id: run.work_id.clone(),
            status: run.status,
            chapters_requested: run.chapters_requested,
            chapters_completed: run.chapters_completed,
            chapters_failed: run.chapters_failed,
            failed_chapters: run.failed_chapters.clone(),
            cursor: run.cursor,
            counters: run.counters,
            abort: run.abort.clone(),
        }
    }
}

/// Outcome of a single-chapter scrape. No run record or cursor is involved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterReport {
    pub work_id: String,
    pub number: ChapterNumber,
    pub status: ChapterStatus,
    pub page_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailedChapter>,
    pub counters: RunCountersSnapshot,
}
