use async_trait::async_trait;
use scraper::Selector;
use thiserror::Error;

use super::types::{ChapterRef, PageRef, WorkMetadata};
use crate::fetch::{FetchError, PoliteClient, RetryError};
use crate::models::FailureCause;

/// Source adapter errors
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{url} does not belong to source {source_id}")]
    UnsupportedUrl { source_id: String, url: String },

    #[error("fetch failed: {0}")]
    Fetch(#[from] RetryError<FetchError>),

    #[error("unexpected markup: {0}")]
    Parse(String),
}

impl SourceError {
    pub fn cause(&self) -> FailureCause {
        match self {
            SourceError::Fetch(_) => FailureCause::FetchError,
            SourceError::UnsupportedUrl { .. } | SourceError::Parse(_) => FailureCause::ParseError,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SourceError::Fetch(err) if err.is_cancelled())
    }
}

/// Capability set of one source site
///
/// Implementations must reach the network only through the [`PoliteClient`]
/// they are handed, so every request is rate limited and retried.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &str;

    fn display_name(&self) -> &str;

    fn base_url(&self) -> &str;

    /// Politeness rate used when the configuration does not override it
    fn requests_per_second(&self) -> f64;

    /// Hosts serving this source's work pages; subdomains match too
    fn hosts(&self) -> Vec<String>;

    fn owns_url(&self, url: &str) -> bool {
        let Some(host) = url::Url::parse(url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))
        else {
            return false;
        };
        self.hosts()
            .iter()
            .any(|owned| host == *owned || host.ends_with(&format!(".{owned}")))
    }

    /// Stable slug identifying the work on this source
    fn work_slug(&self, work_url: &str) -> Result<String, SourceError>;

    async fn parse_work_metadata(
        &self,
        client: &PoliteClient,
        work_url: &str,
    ) -> Result<WorkMetadata, SourceError>;

    /// Chapters in source order; the orchestrator sorts and dedupes them
    async fn list_chapters(
        &self,
        client: &PoliteClient,
        work_url: &str,
    ) -> Result<Vec<ChapterRef>, SourceError>;

    async fn list_pages(
        &self,
        client: &PoliteClient,
        chapter: &ChapterRef,
    ) -> Result<Vec<PageRef>, SourceError>;

    /// Work URLs on one page (1-based) of the source's latest-updates listing,
    /// in listing order without repeats
    async fn list_works(&self, client: &PoliteClient, page: u32) -> Result<Vec<String>, SourceError>;

    /// Extra headers for image downloads, e.g. a `Referer` hotlink check
    fn image_headers(&self, _chapter: &ChapterRef) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    fn ensure_owned(&self, url: &str) -> Result<(), SourceError> {
        if self.owns_url(url) {
            Ok(())
        } else {
            Err(SourceError::UnsupportedUrl {
                source_id: self.source_id().to_string(),
                url: url.to_string(),
            })
        }
    }
}

/// Compile a CSS selector, reporting bad selectors as parse failures
pub(crate) fn selector(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|e| SourceError::Parse(format!("selector {css}: {e}")))
}

/// Host of a base URL, for adapters whose base is overridden
pub(crate) fn host_of(base_url: &str) -> Option<String> {
    url::Url::parse(base_url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))
}
