use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::models::ChapterNumber;

/// One scrape invocation. Either `work_url` or `work_id` must be set; a bare
/// `work_id` re-scrapes a work already in the catalog from its stored URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Builder, Serialize, Deserialize)]
pub struct ScrapeRequest {
    #[builder(into)]
    pub work_url: Option<String>,
    #[builder(into)]
    pub work_id: Option<String>,
    #[builder(into)]
    pub source_id: Option<String>,
    /// Cap on chapters attempted in this run, after the cursor is applied
    pub max_chapters: Option<u32>,
}

/// Scrape one chapter of a work already in the catalog, outside any run
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct ChapterRequest {
    #[builder(into)]
    pub work_id: String,
    #[builder(into)]
    pub chapter_url: String,
    pub chapter_number: ChapterNumber,
    /// Overrides the work's recorded source
    #[builder(into)]
    pub source_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_accepts_str() {
        let request = ScrapeRequest::builder()
            .work_url("https://mangadex.org/title/abc")
            .max_chapters(3)
            .build();

        assert_eq!(request.work_url.as_deref(), Some("https://mangadex.org/title/abc"));
        assert_eq!(request.max_chapters, Some(3));
        assert!(request.source_id.is_none());
    }
}
