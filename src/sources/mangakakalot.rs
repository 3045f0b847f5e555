//! MangaKakalot and its Manganato mirrors (server-rendered HTML)

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html};
use tracing::{debug, info, warn};
use url::Url;

use super::traits::{SourceAdapter, SourceError, host_of, selector};
use super::types::{ChapterRef, PageRef, WorkMetadata};
use crate::fetch::PoliteClient;
use crate::models::{ChapterNumber, WorkStatus};

pub const SOURCE_ID: &str = "mangakakalot";
const DEFAULT_BASE_URL: &str = "https://mangakakalot.com";
const DEFAULT_RATE: f64 = 0.3;
const SITE_HOSTS: &[&str] = &[
    "mangakakalot.com",
    "manganato.com",
    "chapmanganato.to",
    "chapmanganato.com",
];

const TITLE: &str = "h1, h2.story-name";
const AUTHOR: &str = r#"a[href*="author"]"#;
const DESCRIPTION: &str = "div#noidungm, div.panel-story-info-description";
const COVER: &str = "div.manga-info-pic img, div.story-info-left img";
const GENRES: &str = r#"a[href*="genre"], span.info-genres a"#;
const ALT_TITLES: &str = "h2.story-alternative";
const INFO_ROWS: &str = "li, tr";
const CHAPTER_LINKS: &str = "div.chapter-list a, div.row-content-chapter a";
const CHAPTER_TIME: &str = "span.chapter-time, span[title]";
const PAGE_IMAGES: &str = "div.container-chapter-reader img, div.vung-doc img";
const WORK_LINKS: &str = r#"a[href*="/manga/"], a[href*="/read-"]"#;

pub struct MangaKakalot {
    base_url: String,
    slug_patterns: Vec<Regex>,
    chapter_patterns: Vec<Regex>,
    first_number: Regex,
}

impl MangaKakalot {
    pub fn new() -> Result<Self, SourceError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| SourceError::Parse(format!("pattern {pattern}: {e}")))
        };
        Ok(Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            slug_patterns: vec![compile(r"/manga/([^/?#]+)")?, compile(r"/read-([^/?#]+)")?],
            chapter_patterns: vec![
                compile(r"(?i)Chapter\s+([0-9]+(?:\.[0-9]+)?)[\s:]+(.+)")?,
                compile(r"(?i)Ch\.?\s*([0-9]+(?:\.[0-9]+)?)[\s:-]+(.+)")?,
                compile(r"(?i)Chapter\s+([0-9]+(?:\.[0-9]+)?)")?,
            ],
            first_number: compile(r"[0-9]+(?:\.[0-9]+)?")?,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// "Chapter 12.5: The Duel" -> (12.5, Some("The Duel"))
    pub fn parse_chapter_text(&self, text: &str) -> Option<(ChapterNumber, Option<String>)> {
        for pattern in &self.chapter_patterns {
            if let Some(captures) = pattern.captures(text) {
                let number = captures.get(1)?.as_str().parse().ok()?;
                let title = captures
                    .get(2)
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|t| !t.is_empty());
                return Some((number, title));
            }
        }
        let number = self.first_number.find(text)?.as_str().parse().ok()?;
        Some((number, Some(text.trim().to_string())))
    }

    fn parse_work_page(&self, html: &str) -> Result<WorkMetadata, SourceError> {
        let document = Html::parse_document(html);

        let title = document
            .select(&selector(TITLE)?)
            .map(text_of)
            .find(|t| !t.is_empty())
            .ok_or_else(|| SourceError::Parse("work page has no title".into()))?;

        let author = document
            .select(&selector(AUTHOR)?)
            .map(text_of)
            .find(|t| !t.is_empty())
            .or_else(|| labelled_value(&document, "Author"));

        let description = document
            .select(&selector(DESCRIPTION)?)
            .map(text_of)
            .find(|t| !t.is_empty())
            .map(|d| strip_label(&d, "Description").to_string());

        let cover_url = document
            .select(&selector(COVER)?)
            .find_map(|img| img.value().attr("src"))
            .and_then(|src| self.absolute(src));

        let genres = document
            .select(&selector(GENRES)?)
            .map(text_of)
            .filter(|g| !g.is_empty())
            .collect();

        let status = document
            .select(&selector(INFO_ROWS)?)
            .map(text_of)
            .find(|row| row.contains("Status"))
            .and_then(|row| WorkStatus::parse_loose(strip_label(&row, "Status")));

        let alt_titles = document
            .select(&selector(ALT_TITLES)?)
            .next()
            .map(|el| {
                strip_label(&text_of(el), "Alternative")
                    .split(';')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(WorkMetadata {
            title,
            author,
            status,
            genres,
            description,
            cover_url,
            alt_titles,
        })
    }

    fn parse_chapter_list(&self, html: &str) -> Result<Vec<ChapterRef>, SourceError> {
        let document = Html::parse_document(html);
        let time = selector(CHAPTER_TIME)?;
        let mut chapters = Vec::new();

        for link in document.select(&selector(CHAPTER_LINKS)?) {
            let Some(url) = link.value().attr("href").and_then(|h| self.absolute(h)) else {
                continue;
            };
            let text = text_of(link);
            let Some((number, title)) = self.parse_chapter_text(&text) else {
                warn!(source = SOURCE_ID, text = %text, url = %url, "Skipping chapter without a number");
                continue;
            };
            let release_date = link
                .ancestors()
                .filter_map(ElementRef::wrap)
                .take(2)
                .find_map(|row| row.select(&time).next())
                .map(|span| {
                    span.value()
                        .attr("title")
                        .map(str::to_string)
                        .unwrap_or_else(|| text_of(span))
                });

            chapters.push(ChapterRef {
                number,
                title,
                url,
                release_date,
            });
        }

        Ok(chapters)
    }

    fn parse_page_list(&self, html: &str) -> Result<Vec<PageRef>, SourceError> {
        let document = Html::parse_document(html);
        let urls = document
            .select(&selector(PAGE_IMAGES)?)
            .filter_map(|img| {
                let value = img.value();
                value
                    .attr("src")
                    .filter(|src| !src.trim().is_empty())
                    .or_else(|| value.attr("data-src"))
            })
            .filter_map(|src| self.absolute(src))
            .collect::<Vec<_>>();

        Ok(PageRef::numbered(urls))
    }

    fn parse_work_list(&self, html: &str) -> Result<Vec<String>, SourceError> {
        let document = Html::parse_document(html);
        let mut urls: Vec<String> = Vec::new();
        for link in document.select(&selector(WORK_LINKS)?) {
            let Some(url) = link.value().attr("href").and_then(|href| self.absolute(href)) else {
                continue;
            };
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
        Ok(urls)
    }

    fn absolute(&self, href: &str) -> Option<String> {
        let base = Url::parse(&format!("{}/", self.base_url)).ok()?;
        base.join(href.trim()).ok().map(String::from)
    }
}

#[async_trait]
impl SourceAdapter for MangaKakalot {
    fn source_id(&self) -> &str {
        SOURCE_ID
    }

    fn display_name(&self) -> &str {
        "MangaKakalot"
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn requests_per_second(&self) -> f64 {
        DEFAULT_RATE
    }

    fn hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = SITE_HOSTS.iter().map(|h| h.to_string()).collect();
        hosts.extend(host_of(&self.base_url));
        hosts
    }

    fn work_slug(&self, work_url: &str) -> Result<String, SourceError> {
        self.ensure_owned(work_url)?;
        let path = Url::parse(work_url)
            .map(|u| u.path().to_string())
            .map_err(|e| SourceError::Parse(e.to_string()))?;

        let slug = self
            .slug_patterns
            .iter()
            .find_map(|p| p.captures(&path).and_then(|c| c.get(1)))
            .map(|m| m.as_str().to_string())
            .or_else(|| {
                path.trim_end_matches('/')
                    .rsplit('/')
                    .next()
                    .map(str::to_string)
            })
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SourceError::Parse(format!("no work slug in {work_url}")))?;
        Ok(slug)
    }

    async fn parse_work_metadata(
        &self,
        client: &PoliteClient,
        work_url: &str,
    ) -> Result<WorkMetadata, SourceError> {
        self.ensure_owned(work_url)?;
        let html = client.get_text(SOURCE_ID, work_url).await?;
        let metadata = self.parse_work_page(&html)?;
        info!(source = SOURCE_ID, title = %metadata.title, "Parsed work metadata");
        Ok(metadata)
    }

    async fn list_chapters(
        &self,
        client: &PoliteClient,
        work_url: &str,
    ) -> Result<Vec<ChapterRef>, SourceError> {
        self.ensure_owned(work_url)?;
        let html = client.get_text(SOURCE_ID, work_url).await?;
        let chapters = self.parse_chapter_list(&html)?;
        info!(source = SOURCE_ID, count = chapters.len(), "Listed chapters");
        Ok(chapters)
    }

    async fn list_pages(
        &self,
        client: &PoliteClient,
        chapter: &ChapterRef,
    ) -> Result<Vec<PageRef>, SourceError> {
        self.ensure_owned(&chapter.url)?;
        let html = client.get_text(SOURCE_ID, &chapter.url).await?;
        let pages = self.parse_page_list(&html)?;
        debug!(source = SOURCE_ID, chapter = %chapter.number, count = pages.len(), "Listed pages");
        Ok(pages)
    }

    async fn list_works(&self, client: &PoliteClient, page: u32) -> Result<Vec<String>, SourceError> {
        let url = format!(
            "{}/manga_list?type=latest&category=all&state=all&page={page}",
            self.base_url
        );
        let html = client.get_text(SOURCE_ID, &url).await?;
        let works = self.parse_work_list(&html)?;
        info!(source = SOURCE_ID, page, count = works.len(), "Listed works");
        Ok(works)
    }

    /// The image CDN rejects hotlinks without the reader page as referer
    fn image_headers(&self, chapter: &ChapterRef) -> Vec<(&'static str, String)> {
        vec![("Referer", chapter.url.clone())]
    }
}

fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// "Status : Ongoing" -> "Ongoing"
fn strip_label<'a>(text: &'a str, label: &str) -> &'a str {
    match text.split_once(':') {
        Some((head, rest)) if head.contains(label) => rest.trim(),
        _ => text.trim(),
    }
}

/// Value cell following a `<td>Label</td>` header cell
fn labelled_value(document: &Html, label: &str) -> Option<String> {
    let cells = selector("td").ok()?;
    let mut cells = document.select(&cells);
    while let Some(cell) = cells.next() {
        if text_of(cell).contains(label) {
            return cells.next().map(text_of).filter(|v| !v.is_empty());
        }
    }
    None
}
