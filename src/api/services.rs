use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::info;

use super::{
    models::{
        HealthResponse, InvokeAction, InvokeRequest, LivenessResponse, WorkListResponse,
        WorkResponse,
    },
    state::AppState,
    validation::validate_invoke,
};
use crate::api::error::ApiError;

/// Single invocation endpoint (POST /invoke)
///
/// `scrape_work` runs one scrape to completion and returns its report. The
/// run listens to the server's shutdown signal, so a shutdown mid-run ends
/// with an aborted report whose cursor sits on the last complete chapter.
/// `scrape_chapter` and `list_works` share that shutdown signal.
/// `health_check` returns straight away.
pub async fn invoke(
    State(state): State<AppState>,
    payload: Result<Json<InvokeRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::InvalidPayload(e.body_text()))?;
    validate_invoke(&request)?;

    match request.action {
        InvokeAction::HealthCheck => Ok(Json(LivenessResponse::ok()).into_response()),
        InvokeAction::ScrapeWork => {
            info!(
                work_url = ?request.work_url,
                work_id = ?request.work_id,
                source = ?request.source_id,
                "Scrape requested"
            );
            let report = state
                .orchestrator
                .run(&request.scrape_request(), state.shutdown.child_token())
                .await?;
            Ok((StatusCode::OK, Json(report)).into_response())
        }
        InvokeAction::ScrapeChapter => {
            let chapter = request.chapter_request()?;
            info!(
                work_id = %chapter.work_id,
                chapter_url = %chapter.chapter_url,
                chapter = %chapter.chapter_number,
                "Chapter scrape requested"
            );
            let report = state
                .orchestrator
                .run_chapter(&chapter, state.shutdown.child_token())
                .await?;
            Ok((StatusCode::OK, Json(report)).into_response())
        }
        InvokeAction::ListWorks => {
            let source_id = request.source_id.clone().unwrap_or_default();
            let page = request.listing_page();
            let work_urls = state
                .orchestrator
                .list_works(&source_id, page, state.shutdown.child_token())
                .await?;
            info!(source = %source_id, page, count = work_urls.len(), "Works listed");
            Ok(Json(WorkListResponse {
                source_id,
                page,
                work_count: work_urls.len(),
                work_urls,
            })
            .into_response())
        }
    }
}

/// Work with its chapters (GET /works/{work_id})
pub async fn get_work(
    State(state): State<AppState>,
    Path(work_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let work = state
        .catalog
        .get_work(&work_id)?
        .ok_or_else(|| ApiError::NotFound(format!("work {work_id}")))?;
    let chapters = state.catalog.list_chapters(&work_id)?;

    Ok(Json(WorkResponse { work, chapters }))
}

/// Most recent run of a work (GET /runs/{work_id}/latest)
pub async fn latest_run(
    State(state): State<AppState>,
    Path(work_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let run = state
        .catalog
        .latest_run(&work_id)?
        .ok_or_else(|| ApiError::NotFound(format!("no runs for work {work_id}")))?;

    Ok(Json(run))
}

/// Health check endpoint (GET /health)
///
/// No backend I/O: reports the registered sources and in-memory run totals.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sources: state.registry.ids(),
        metrics: state.metrics.snapshot(),
    };

    (StatusCode::OK, Json(response))
}
