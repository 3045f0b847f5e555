use std::io::Cursor;
use std::sync::Arc;

use axum::{
    Router,
    body::{Body, Bytes},
    http::{Request, StatusCode, header},
    routing::get,
};
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt; // for `oneshot`

use mangabox::api::models::{HealthResponse, LivenessResponse, WorkListResponse, WorkResponse};
use mangabox::api::{AppState, router};
use mangabox::config::Config;
use mangabox::ledger::FjallStore;
use mangabox::models::{ChapterStatus, JobRun, RunStatus};
use mangabox::pipeline::{ChapterReport, RunReport};
use mangabox::storage::StorageClient;

const WORK_PAGE: &str = r#"
<html><body>
<ul class="manga-info-text">
  <li><h1>Demo Quest</h1></li>
  <li>Author(s) : <a href="/search/author/anon">Anon</a></li>
  <li>Status : Completed</li>
</ul>
<div class="chapter-list">
  <div class="row"><span><a href="/chapter/demo/chapter_2">Chapter 2: Return</a></span></div>
  <div class="row"><span><a href="/chapter/demo/chapter_1">Chapter 1: Departure</a></span></div>
</div>
</body></html>
"#;

const CHAPTER_ONE: &str = r#"
<div class="container-chapter-reader">
  <img src="/img/1.png"><img src="/img/2.png">
</div>
"#;

const CHAPTER_TWO: &str = r#"
<div class="container-chapter-reader"><img src="/img/3.png"></div>
"#;

const LATEST_PAGE: &str = r#"
<div class="truyen-list">
  <div class="list-truyen-item-wrap">
    <a href="/manga/demo"><img src="/covers/demo.jpg"></a>
    <h3><a href="/manga/demo">Demo Quest</a></h3>
  </div>
  <div class="list-truyen-item-wrap"><h3><a href="/manga/sequel">Demo Quest II</a></h3></div>
</div>
"#;

fn png(seed: u8) -> Bytes {
    let img = RgbImage::from_fn(40, 60, |x, y| Rgb([x as u8 ^ seed, y as u8, seed]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    Bytes::from(out.into_inner())
}

/// Serves a two-chapter work in the site's markup, images included
async fn start_site() -> String {
    let router = Router::new()
        .route("/manga/demo", get(|| async { WORK_PAGE }))
        .route("/chapter/demo/chapter_1", get(|| async { CHAPTER_ONE }))
        .route("/chapter/demo/chapter_2", get(|| async { CHAPTER_TWO }))
        .route("/manga_list", get(|| async { LATEST_PAGE }))
        .route("/img/1.png", get(|| async { png(1) }))
        .route("/img/2.png", get(|| async { png(2) }))
        .route("/img/3.png", get(|| async { png(3) }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    base
}

/// Minimal config pointing the mangakakalot adapter at `site`
fn create_test_config(site: &str) -> Config {
    let config_toml = format!(
        r#"
[storage]
provider = "memory"

[sources.mangakakalot]
requests_per_second = 200.0
base_url = "{site}"

[retry]
max_attempts = 2
base_delay_ms = 5
max_delay_ms = 20

[pipeline]
page_concurrency = 2
"#
    );

    toml::from_str(&config_toml).expect("Failed to parse test config")
}

/// Builds a test app with isolated dependencies
fn build_test_app(site: &str) -> (Router, AppState, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = FjallStore::open(temp_dir.path().join("ledger"))
        .expect("Failed to open test Fjall store");

    let state = AppState::new(
        create_test_config(site),
        Arc::new(store),
        StorageClient::in_memory(),
    )
    .expect("Failed to build app state");

    (router(state.clone()), state, temp_dir)
}

fn invoke_request(payload: Value) -> Request<Body> {
    Request::builder()
        .uri("/invoke")
        .method("POST")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_lists_sources() {
    let (app, _state, _temp_dir) = build_test_app("http://127.0.0.1:1");

    let response = app.oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health: HealthResponse = body_json(response).await;
    assert_eq!(health.status, "ok");
    assert_eq!(health.sources, vec!["mangadex", "mangakakalot"]);
    assert_eq!(health.metrics.runs_started, 0);
}

#[tokio::test]
async fn test_invoke_health_check() {
    let (app, _state, _temp_dir) = build_test_app("http://127.0.0.1:1");

    let response = app
        .oneshot(invoke_request(json!({ "action": "health_check" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let liveness: LivenessResponse = body_json(response).await;
    assert_eq!(liveness.status, "ok");
}

#[tokio::test]
async fn test_startup_records_sources_and_settings() {
    let (_app, state, _temp_dir) = build_test_app("http://127.0.0.1:1");

    let source = state.catalog.get_source("mangakakalot").unwrap().unwrap();
    assert_eq!(source.base_url, "http://127.0.0.1:1");
    assert_eq!(source.requests_per_second, 200.0);
    assert!(state.catalog.get_source("mangadex").unwrap().is_some());

    let settings = state
        .catalog
        .get_system_config(mangabox::api::state::PIPELINE_CONFIG_NAME)
        .unwrap()
        .unwrap();
    assert_eq!(settings.values["pipeline"]["page_concurrency"], 2);
}

#[tokio::test]
async fn test_scrape_without_target_is_rejected() {
    let (app, _state, _temp_dir) = build_test_app("http://127.0.0.1:1");

    let response = app
        .oneshot(invoke_request(json!({ "action": "scrape_work" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let error: Value = body_json(response).await;
    assert_eq!(error["code"], "invalid-payload");
}

#[tokio::test]
async fn test_malformed_json_is_rejected() {
    let (app, _state, _temp_dir) = build_test_app("http://127.0.0.1:1");

    let request = Request::builder()
        .uri("/invoke")
        .method("POST")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let error: Value = body_json(response).await;
    assert_eq!(error["code"], "invalid-payload");
}

#[tokio::test]
async fn test_unknown_work_id_is_rejected() {
    let (app, _state, _temp_dir) = build_test_app("http://127.0.0.1:1");

    let response = app
        .oneshot(invoke_request(json!({
            "action": "scrape_work",
            "work_id": "mangadex-never-seen"
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let error: Value = body_json(response).await;
    assert_eq!(error["code"], "unknown-work");
}

#[tokio::test]
async fn test_unsupported_site_is_rejected() {
    let (app, _state, _temp_dir) = build_test_app("http://127.0.0.1:1");

    let response = app
        .oneshot(invoke_request(json!({
            "action": "scrape_work",
            "work_url": "https://example.com/manga/elsewhere"
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let error: Value = body_json(response).await;
    assert_eq!(error["code"], "unsupported-source");
}

#[tokio::test]
async fn test_missing_work_is_not_found() {
    let (app, _state, _temp_dir) = build_test_app("http://127.0.0.1:1");

    let response = app.clone().oneshot(get_request("/works/missing")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.oneshot(get_request("/runs/missing/latest")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let error: Value = body_json(response).await;
    assert_eq!(error["code"], "not-found");
}

#[tokio::test]
async fn test_scrape_work_end_to_end() {
    let site = start_site().await;
    let (app, state, _temp_dir) = build_test_app(&site);

    let response = app
        .clone()
        .oneshot(invoke_request(json!({
            "action": "scrape_work",
            "work_url": format!("{site}/manga/demo")
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let report: RunReport = body_json(response).await;
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.work_id, "mangakakalot-demo");
    assert_eq!(report.chapters_requested, 2);
    assert_eq!(report.chapters_completed, 2);
    assert_eq!(report.counters.pages_stored, 3);
    assert_eq!(report.cursor.map(|c| c.value()), Some(2.0));

    let response = app
        .clone()
        .oneshot(get_request("/works/mangakakalot-demo"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let work: WorkResponse = body_json(response).await;
    assert_eq!(work.work.title, "Demo Quest");
    assert_eq!(work.chapters.len(), 2);
    assert!(work.chapters.iter().all(|c| c.status == ChapterStatus::Complete));

    let response = app
        .clone()
        .oneshot(get_request("/runs/mangakakalot-demo/latest"))
        .await
        .unwrap();
    let run: JobRun = body_json(response).await;
    assert_eq!(run.run_id, report.run_id);

    // a rerun by id finds nothing past the cursor
    let response = app
        .clone()
        .oneshot(invoke_request(json!({
            "action": "scrape_work",
            "work_id": "mangakakalot-demo"
        })))
        .await
        .unwrap();
    let rerun: RunReport = body_json(response).await;
    assert_eq!(rerun.status, RunStatus::Completed);
    assert_eq!(rerun.chapters_requested, 0);

    let health: HealthResponse = body_json(app.oneshot(get_request("/health")).await.unwrap()).await;
    assert_eq!(health.metrics.runs_completed, 2);
    assert_eq!(health.metrics.pages_stored, 3);
    assert_eq!(state.metrics.snapshot().runs_aborted, 0);
}

#[tokio::test]
async fn test_scrape_chapter_keeps_cursor() {
    let site = start_site().await;
    let (app, _state, _temp_dir) = build_test_app(&site);

    let response = app
        .clone()
        .oneshot(invoke_request(json!({
            "action": "scrape_work",
            "work_url": format!("{site}/manga/demo"),
            "max_chapters": 1
        })))
        .await
        .unwrap();
    let first: RunReport = body_json(response).await;
    assert_eq!(first.cursor.map(|c| c.value()), Some(1.0));

    let response = app
        .clone()
        .oneshot(invoke_request(json!({
            "action": "scrape_chapter",
            "work_id": "mangakakalot-demo",
            "chapter_url": format!("{site}/chapter/demo/chapter_2"),
            "chapter_number": 2
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let chapter: ChapterReport = body_json(response).await;
    assert_eq!(chapter.status, ChapterStatus::Complete);
    assert_eq!(chapter.page_count, 1);
    assert_eq!(chapter.counters.pages_stored, 1);

    let response = app
        .oneshot(get_request("/runs/mangakakalot-demo/latest"))
        .await
        .unwrap();
    let run: JobRun = body_json(response).await;
    assert_eq!(run.run_id, first.run_id);
    assert_eq!(run.cursor.map(|c| c.value()), Some(1.0));
}

#[tokio::test]
async fn test_scrape_chapter_requires_fields() {
    let (app, _state, _temp_dir) = build_test_app("http://127.0.0.1:1");

    let response = app
        .clone()
        .oneshot(invoke_request(json!({
            "action": "scrape_chapter",
            "work_id": "mangakakalot-demo",
            "chapter_number": 2
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: Value = body_json(response).await;
    assert_eq!(error["code"], "invalid-payload");

    let response = app
        .oneshot(invoke_request(json!({
            "action": "scrape_chapter",
            "work_id": "mangakakalot-unknown",
            "chapter_url": "http://127.0.0.1:1/chapter/x/chapter_1",
            "chapter_number": 1
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: Value = body_json(response).await;
    assert_eq!(error["code"], "unknown-work");
}

#[tokio::test]
async fn test_list_works_from_latest_listing() {
    let site = start_site().await;
    let (app, _state, _temp_dir) = build_test_app(&site);

    let response = app
        .clone()
        .oneshot(invoke_request(json!({
            "action": "list_works",
            "source_id": "mangakakalot"
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listing: WorkListResponse = body_json(response).await;
    assert_eq!(listing.page, 1);
    assert_eq!(listing.work_count, 2);
    assert_eq!(
        listing.work_urls,
        vec![format!("{site}/manga/demo"), format!("{site}/manga/sequel")]
    );

    // the older action name is accepted too
    let response = app
        .clone()
        .oneshot(invoke_request(json!({
            "action": "list_manga",
            "source_id": "mangakakalot",
            "page": 2
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listing: WorkListResponse = body_json(response).await;
    assert_eq!(listing.page, 2);

    let response = app
        .oneshot(invoke_request(json!({ "action": "list_works" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: Value = body_json(response).await;
    assert_eq!(error["code"], "invalid-payload");
}
