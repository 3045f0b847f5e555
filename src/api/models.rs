//! Wire types of the inbound API
//!
//! Everything goes through `POST /invoke`:
//!
//! ```json
//! {
//!   "action": "scrape_work",
//!   "work_url": "https://mangadex.org/title/a1c7c817-4e59-43b7-9365-09675a149a6f",
//!   "max_chapters": 5
//! }
//! ```
//!
//! `scrape_work` answers with the run report once the run ends;
//! `scrape_chapter` scrapes one chapter of a known work (`work_id`,
//! `chapter_url`, `chapter_number`) and answers with a chapter report;
//! `list_works` returns work URLs from one page of a source's latest-updates
//! listing (`source_id`, optional `page`, default 1);
//! `health_check` answers immediately without touching any backend.

use serde::{Deserialize, Serialize};

use super::validation::InvokeValidationError;
use crate::models::{Chapter, ChapterNumber, Work};
use crate::observability::MetricsSnapshot;
use crate::pipeline::{ChapterRequest, ScrapeRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvokeAction {
    ScrapeWork,
    ScrapeChapter,
    #[serde(alias = "list_manga")]
    ListWorks,
    HealthCheck,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeRequest {
    pub action: InvokeAction,
    #[serde(default)]
    pub work_url: Option<String>,
    #[serde(default)]
    pub work_id: Option<String>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub max_chapters: Option<u32>,
    #[serde(default)]
    pub chapter_url: Option<String>,
    #[serde(default)]
    pub chapter_number: Option<f64>,
    /// Listing page for `list_works`, 1-based
    #[serde(default)]
    pub page: Option<u32>,
}

impl InvokeRequest {
    pub fn scrape_request(&self) -> ScrapeRequest {
        ScrapeRequest {
            work_url: self.work_url.clone(),
            work_id: self.work_id.clone(),
            source_id: self.source_id.clone(),
            max_chapters: self.max_chapters,
        }
    }

    pub fn chapter_request(&self) -> Result<ChapterRequest, InvokeValidationError> {
        let work_id = self
            .work_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or(InvokeValidationError::MissingWorkId)?;
        let chapter_url = self
            .chapter_url
            .clone()
            .ok_or(InvokeValidationError::MissingChapterUrl)?;
        let raw_number = self
            .chapter_number
            .ok_or(InvokeValidationError::MissingChapterNumber)?;
        let chapter_number = ChapterNumber::new(raw_number)
            .map_err(|e| InvokeValidationError::InvalidChapterNumber(e.0))?;

        Ok(ChapterRequest {
            work_id,
            chapter_url,
            chapter_number,
            source_id: self.source_id.clone(),
        })
    }

    pub fn listing_page(&self) -> u32 {
        self.page.unwrap_or(1)
    }
}

/// Answer of the `list_works` action
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkListResponse {
    pub source_id: String,
    pub page: u32,
    pub work_count: usize,
    pub work_urls: Vec<String>,
}

/// Liveness answer of the `health_check` action
#[derive(Debug, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub status: String,
    pub version: String,
}

impl LivenessResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// `GET /health`: liveness plus process-wide run totals
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sources: Vec<String>,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkResponse {
    pub work: Work,
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}
