use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::models::{ChapterNumber, WorkStatus};

/// Work fields scraped from a source's title page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkMetadata {
    pub title: String,
    pub author: Option<String>,
    pub status: Option<WorkStatus>,
    pub genres: BTreeSet<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub alt_titles: Vec<String>,
}

/// One chapter as listed by a source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterRef {
    pub number: ChapterNumber,
    pub title: Option<String>,
    /// Reader page for HTML sources, chapter id URL for API sources
    pub url: String,
    pub release_date: Option<String>,
}

/// One page image within a chapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRef {
    /// 1-based
    pub index: u32,
    pub url: String,
}

impl PageRef {
    /// Number image URLs 1..=n in reader order
    pub fn numbered(urls: impl IntoIterator<Item = String>) -> Vec<PageRef> {
        urls.into_iter()
            .zip(1u32..)
            .map(|(url, index)| PageRef { index, url })
            .collect()
    }
}
