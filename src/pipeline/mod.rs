//! Scrape runs: one work at a time, chapters in order, pages in parallel
//!
//! A run resolves work metadata, lists chapters past the resume cursor and
//! walks them sequentially. Each chapter's pages go through a bounded worker
//! pool: fetch, normalize, dedup, store, record. A failed page fails its
//! chapter; only backend outages and cancellation abort the run.
//!
//! A single chapter can also be scraped on its own through the same page
//! path, and a source's latest-updates listing can be read for work URLs.

mod error;
mod locks;
mod orchestrator;
mod report;
mod request;

pub use error::RunError;
pub use locks::WorkLocks;
pub use orchestrator::{RunOptions, ScrapeOrchestrator, derive_work_id, select_chapters};
pub use report::{ChapterReport, RunReport};
pub use request::{ChapterRequest, ScrapeRequest};
