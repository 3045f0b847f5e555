//! MangaDex through its public JSON API
//!
//! - `/manga/{id}` with author and cover relationships for work metadata
//! - `/manga/{id}/feed` (paged) for English chapters
//! - `/at-home/server/{chapterId}` for the page image URLs

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::traits::{SourceAdapter, SourceError, host_of};
use super::types::{ChapterRef, PageRef, WorkMetadata};
use crate::fetch::PoliteClient;
use crate::models::{ChapterNumber, WorkStatus};

pub const SOURCE_ID: &str = "mangadex";
const DEFAULT_API_URL: &str = "https://api.mangadex.org";
const SITE_URL: &str = "https://mangadex.org";
const COVER_URL: &str = "https://uploads.mangadex.org/covers";
const DEFAULT_RATE: f64 = 0.5;
const FEED_PAGE_SIZE: u32 = 100;
/// Stop paging the feed after this many requests
const MAX_FEED_PAGES: u32 = 100;
const LIST_PAGE_SIZE: u32 = 20;

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ListedManga {
    id: String,
}

#[derive(Deserialize)]
struct MangaData {
    id: String,
    attributes: MangaAttributes,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MangaAttributes {
    #[serde(default)]
    title: HashMap<String, String>,
    #[serde(default)]
    alt_titles: Vec<HashMap<String, String>>,
    #[serde(default)]
    description: HashMap<String, String>,
    status: Option<String>,
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Deserialize)]
struct Tag {
    attributes: TagAttributes,
}

#[derive(Deserialize)]
struct TagAttributes {
    #[serde(default)]
    name: HashMap<String, String>,
}

#[derive(Deserialize)]
struct Relationship {
    #[serde(rename = "type")]
    rel_type: String,
    attributes: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct FeedPage {
    data: Vec<FeedChapter>,
    total: u32,
}

#[derive(Deserialize)]
struct FeedChapter {
    id: String,
    attributes: FeedChapterAttributes,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedChapterAttributes {
    chapter: Option<String>,
    title: Option<String>,
    publish_at: Option<String>,
    external_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AtHome {
    base_url: String,
    chapter: AtHomeChapter,
}

#[derive(Deserialize)]
struct AtHomeChapter {
    hash: String,
    data: Vec<String>,
}

pub struct MangaDex {
    api_url: String,
    title_id: Regex,
    chapter_id: Regex,
}

impl MangaDex {
    pub fn new() -> Result<Self, SourceError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| SourceError::Parse(format!("pattern {pattern}: {e}")))
        };
        Ok(Self {
            api_url: DEFAULT_API_URL.to_string(),
            title_id: compile(r"/title/([^/?#]+)")?,
            chapter_id: compile(r"/chapter/([^/?#]+)")?,
        })
    }

    /// Point at another API root; work URLs on that host are accepted too
    pub fn with_base_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    fn manga_id(&self, work_url: &str) -> Result<String, SourceError> {
        self.ensure_owned(work_url)?;
        self.title_id
            .captures(work_url)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| SourceError::Parse(format!("no title id in {work_url}")))
    }

    fn chapter_id<'a>(&self, chapter_url: &'a str) -> Result<&'a str, SourceError> {
        self.chapter_id
            .captures(chapter_url)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| SourceError::Parse(format!("no chapter id in {chapter_url}")))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        client: &PoliteClient,
        url: &str,
    ) -> Result<T, SourceError> {
        let body = client.get(SOURCE_ID, url, &[]).await?;
        serde_json::from_slice(&body).map_err(|e| SourceError::Parse(format!("{url}: {e}")))
    }

    fn to_metadata(manga: MangaData) -> WorkMetadata {
        let attributes = manga.attributes;
        let title = pick_english(&attributes.title).unwrap_or_default();

        let mut alt_titles: Vec<String> = Vec::new();
        for names in &attributes.alt_titles {
            for name in names.values() {
                if !name.is_empty() && *name != title && !alt_titles.contains(name) {
                    alt_titles.push(name.clone());
                }
            }
        }

        let genres: BTreeSet<String> = attributes
            .tags
            .iter()
            .filter_map(|tag| pick_english(&tag.attributes.name))
            .collect();

        let relationship_attr = |kind: &str, field: &str| {
            manga
                .relationships
                .iter()
                .find(|r| r.rel_type == kind)
                .and_then(|r| r.attributes.as_ref())
                .and_then(|attrs| attrs.get(field))
                .and_then(|value| value.as_str())
                .map(str::to_string)
        };

        WorkMetadata {
            author: relationship_attr("author", "name"),
            cover_url: relationship_attr("cover_art", "fileName")
                .map(|file| format!("{COVER_URL}/{}/{file}", manga.id)),
            description: pick_english(&attributes.description).filter(|d| !d.is_empty()),
            status: attributes.status.as_deref().and_then(WorkStatus::parse_loose),
            title,
            genres,
            alt_titles,
        }
    }

    fn to_chapter_ref(chapter: FeedChapter) -> Option<ChapterRef> {
        let attributes = chapter.attributes;
        if attributes.external_url.is_some() {
            debug!(chapter_id = %chapter.id, "Skipping externally hosted chapter");
            return None;
        }
        let Some(number) = attributes
            .chapter
            .as_deref()
            .and_then(|n| n.parse::<ChapterNumber>().ok())
        else {
            warn!(chapter_id = %chapter.id, "Skipping chapter without a number");
            return None;
        };
        Some(ChapterRef {
            number,
            title: attributes.title.filter(|t| !t.is_empty()),
            url: format!("{SITE_URL}/chapter/{}", chapter.id),
            release_date: attributes.publish_at,
        })
    }
}

fn pick_english(names: &HashMap<String, String>) -> Option<String> {
    names
        .get("en")
        .or_else(|| names.get("ja-ro"))
        .or_else(|| names.values().next())
        .cloned()
}

#[async_trait]
impl SourceAdapter for MangaDex {
    fn source_id(&self) -> &str {
        SOURCE_ID
    }

    fn display_name(&self) -> &str {
        "MangaDex"
    }

    fn base_url(&self) -> &str {
        &self.api_url
    }

    fn requests_per_second(&self) -> f64 {
        DEFAULT_RATE
    }

    fn hosts(&self) -> Vec<String> {
        let mut hosts = vec!["mangadex.org".to_string()];
        hosts.extend(host_of(&self.api_url));
        hosts
    }

    fn work_slug(&self, work_url: &str) -> Result<String, SourceError> {
        self.manga_id(work_url)
    }

    async fn parse_work_metadata(
        &self,
        client: &PoliteClient,
        work_url: &str,
    ) -> Result<WorkMetadata, SourceError> {
        let id = self.manga_id(work_url)?;
        let url = format!(
            "{}/manga/{id}?includes[]=author&includes[]=cover_art",
            self.api_url
        );
        let envelope: Envelope<MangaData> = self.get_json(client, &url).await?;
        let metadata = Self::to_metadata(envelope.data);
        if metadata.title.is_empty() {
            return Err(SourceError::Parse(format!("manga {id} has no title")));
        }
        info!(source = SOURCE_ID, title = %metadata.title, "Parsed work metadata");
        Ok(metadata)
    }

    async fn list_chapters(
        &self,
        client: &PoliteClient,
        work_url: &str,
    ) -> Result<Vec<ChapterRef>, SourceError> {
        let id = self.manga_id(work_url)?;
        let mut chapters = Vec::new();
        let mut offset = 0u32;

        for _ in 0..MAX_FEED_PAGES {
            let url = format!(
                "{}/manga/{id}/feed?translatedLanguage[]=en&order[chapter]=asc&limit={FEED_PAGE_SIZE}&offset={offset}",
                self.api_url
            );
            let page: FeedPage = self.get_json(client, &url).await?;
            let received = page.data.len() as u32;
            chapters.extend(page.data.into_iter().filter_map(Self::to_chapter_ref));

            offset += received;
            if received == 0 || offset >= page.total {
                break;
            }
        }

        info!(source = SOURCE_ID, count = chapters.len(), "Listed chapters");
        Ok(chapters)
    }

    async fn list_pages(
        &self,
        client: &PoliteClient,
        chapter: &ChapterRef,
    ) -> Result<Vec<PageRef>, SourceError> {
        let chapter_id = self.chapter_id(&chapter.url)?;
        let url = format!("{}/at-home/server/{chapter_id}", self.api_url);
        let at_home: AtHome = self.get_json(client, &url).await?;

        let base = at_home.base_url.trim_end_matches('/');
        let hash = &at_home.chapter.hash;
        let pages = PageRef::numbered(
            at_home
                .chapter
                .data
                .iter()
                .map(|file| format!("{base}/data/{hash}/{file}")),
        );
        debug!(source = SOURCE_ID, chapter = %chapter.number, count = pages.len(), "Listed pages");
        Ok(pages)
    }

    async fn list_works(&self, client: &PoliteClient, page: u32) -> Result<Vec<String>, SourceError> {
        let offset = page.saturating_sub(1) * LIST_PAGE_SIZE;
        let url = format!(
            "{}/manga?limit={LIST_PAGE_SIZE}&offset={offset}&order[latestUploadedChapter]=desc",
            self.api_url
        );
        let listed: Envelope<Vec<ListedManga>> = self.get_json(client, &url).await?;

        let mut works: Vec<String> = Vec::with_capacity(listed.data.len());
        for manga in listed.data {
            let url = format!("{SITE_URL}/title/{}", manga.id);
            if !works.contains(&url) {
                works.push(url);
            }
        }
        info!(source = SOURCE_ID, page, count = works.len(), "Listed works");
        Ok(works)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{HttpClient, HttpConfig, RateLimiter, RetryPolicy};
    use axum::extract::{Path, Query};
    use axum::{Json, Router, routing::get};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::time::Duration;

    const MANGA_ID: &str = "a1c7c817-4e59-43b7-9365-09675a149a6f";

    fn manga_json() -> Value {
        json!({
            "result": "ok",
            "data": {
                "id": MANGA_ID,
                "type": "manga",
                "attributes": {
                    "title": {"en": "Sky Pirates"},
                    "altTitles": [{"ja": "空の海賊"}, {"en": "Sky Pirates"}],
                    "description": {"en": "Airships and treasure."},
                    "status": "completed",
                    "tags": [
                        {"attributes": {"name": {"en": "Adventure"}}},
                        {"attributes": {"name": {"en": "Comedy"}}}
                    ]
                },
                "relationships": [
                    {"id": "x", "type": "author", "attributes": {"name": "Kei Sora"}},
                    {"id": "y", "type": "cover_art", "attributes": {"fileName": "cover.png"}}
                ]
            }
        })
    }

    fn feed_chapter(id: &str, number: Option<&str>) -> Value {
        json!({
            "id": id,
            "attributes": {"chapter": number, "title": "", "publishAt": "2024-01-01T00:00:00+00:00"}
        })
    }

    async fn start_server() -> String {
        let router = Router::new()
            .route("/manga/{id}", get(|| async { Json(manga_json()) }))
            .route(
                "/manga",
                get(|Query(query): Query<HashMap<String, String>>| async move {
                    let data = match query.get("offset").map(String::as_str) {
                        Some("20") => vec![json!({"id": "m3"})],
                        _ => vec![json!({"id": "m1"}), json!({"id": "m2"}), json!({"id": "m1"})],
                    };
                    Json(json!({"result": "ok", "data": data}))
                }),
            )
            .route(
                "/manga/{id}/feed",
                get(|Query(query): Query<HashMap<String, String>>| async move {
                    let offset: u32 = query.get("offset").and_then(|o| o.parse().ok()).unwrap_or(0);
                    let data = if offset == 0 {
                        vec![feed_chapter("c1", Some("1")), feed_chapter("c2", Some("2"))]
                    } else {
                        vec![feed_chapter("c3", Some("2.5")), feed_chapter("c4", None)]
                    };
                    Json(json!({"result": "ok", "data": data, "limit": 2, "offset": offset, "total": 4}))
                }),
            )
            .route(
                "/at-home/server/{id}",
                get(|Path(id): Path<String>| async move {
                    Json(json!({
                        "result": "ok",
                        "baseUrl": "https://uploads.example.org",
                        "chapter": {"hash": format!("hash-{id}"), "data": ["1-a.png", "2-b.png"]}
                    }))
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        base
    }

    fn client() -> PoliteClient {
        PoliteClient::new(
            Arc::new(HttpClient::new(&HttpConfig::default()).unwrap()),
            Arc::new(RateLimiter::new(Duration::from_millis(1))),
            RetryPolicy::new(2, Duration::from_millis(5)),
        )
    }

    #[test]
    fn test_metadata_mapping() {
        let envelope: Envelope<MangaData> = serde_json::from_value(manga_json()).unwrap();
        let metadata = MangaDex::to_metadata(envelope.data);

        assert_eq!(metadata.title, "Sky Pirates");
        assert_eq!(metadata.author.as_deref(), Some("Kei Sora"));
        assert_eq!(metadata.status, Some(WorkStatus::Completed));
        assert_eq!(metadata.alt_titles, vec!["空の海賊"]);
        assert_eq!(metadata.genres.len(), 2);
        assert_eq!(
            metadata.cover_url,
            Some(format!("https://uploads.mangadex.org/covers/{MANGA_ID}/cover.png"))
        );
    }

    #[test]
    fn test_work_slug_is_title_id() {
        let adapter = MangaDex::new().unwrap();
        let url = format!("https://mangadex.org/title/{MANGA_ID}/sky-pirates");

        assert!(adapter.owns_url(&url));
        assert_eq!(adapter.work_slug(&url).unwrap(), MANGA_ID);
        assert!(matches!(
            adapter.work_slug("https://mangadex.org/about"),
            Err(SourceError::Parse(_))
        ));
        assert!(matches!(
            adapter.work_slug("https://mangakakalot.com/title/x"),
            Err(SourceError::UnsupportedUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_api_flow() {
        let base = start_server().await;
        let adapter = MangaDex::new().unwrap().with_base_url(base.clone());
        let client = client();
        let work_url = format!("{base}/title/{MANGA_ID}");

        let metadata = adapter.parse_work_metadata(&client, &work_url).await.unwrap();
        assert_eq!(metadata.title, "Sky Pirates");

        let chapters = adapter.list_chapters(&client, &work_url).await.unwrap();
        let numbers: Vec<f64> = chapters.iter().map(|c| c.number.value()).collect();
        assert_eq!(numbers, vec![1.0, 2.0, 2.5]);
        assert_eq!(chapters[0].url, "https://mangadex.org/chapter/c1");
        assert_eq!(chapters[0].title, None);

        let pages = adapter.list_pages(&client, &chapters[2]).await.unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].index, 1);
        assert_eq!(pages[1].url, "https://uploads.example.org/data/hash-c3/2-b.png");
    }

    #[tokio::test]
    async fn test_list_works_pages_by_offset() {
        let base = start_server().await;
        let adapter = MangaDex::new().unwrap().with_base_url(base);
        let client = client();

        let first = adapter.list_works(&client, 1).await.unwrap();
        assert_eq!(
            first,
            vec![
                "https://mangadex.org/title/m1".to_string(),
                "https://mangadex.org/title/m2".to_string(),
            ]
        );

        let second = adapter.list_works(&client, 2).await.unwrap();
        assert_eq!(second, vec!["https://mangadex.org/title/m3".to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_json_is_parse_error() {
        let router = Router::new().route("/manga/{id}", get(|| async { "<html>maintenance</html>" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let adapter = MangaDex::new().unwrap().with_base_url(base.clone());
        let err = adapter
            .parse_work_metadata(&client(), &format!("{base}/title/{MANGA_ID}"))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }
}
