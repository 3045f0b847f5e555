use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::RunError;
use super::locks::WorkLocks;
use super::report::{ChapterReport, RunReport};
use super::request::{ChapterRequest, ScrapeRequest};
use crate::config::Config;
use crate::fetch::{PoliteClient, RetryError, RetryPolicy};
use crate::imaging::ImageProcessor;
use crate::ledger::{Catalog, DuplicateIndex, MetadataStore};
use crate::models::{
    Chapter, ChapterNumber, ChapterStatus, FailedChapter, FailureCause, JobRun, Page,
    PageFailure, PageStatus, RunStatus, Work,
};
use crate::observability::{Metrics, RunCounters};
use crate::sources::{
    ChapterRef, PageRef, RegistryError, SourceAdapter, SourceError, SourceRegistry, WorkMetadata,
};
use crate::storage::{PutOutcome, StorageClient, StorageError, keys};

/// Behaviour switches for every run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub dedup_enabled: bool,
    pub resume_enabled: bool,
    pub page_concurrency: usize,
    /// Backoff for object store calls
    pub storage_retry: RetryPolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dedup_enabled: true,
            resume_enabled: true,
            page_concurrency: 4,
            storage_retry: RetryPolicy::default(),
        }
    }
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            dedup_enabled: config.pipeline.dedup_enabled,
            resume_enabled: config.pipeline.resume_enabled,
            page_concurrency: config.pipeline.page_concurrency.max(1),
            storage_retry: config.retry.policy(),
        }
    }
}

/// `{source}-{slug}` lowercased, with every run of other characters folded
/// into a single dash.
pub fn derive_work_id(source_id: &str, slug: &str) -> String {
    let mut id = String::with_capacity(source_id.len() + slug.len() + 1);
    for c in format!("{source_id}-{slug}").chars() {
        if c.is_ascii_alphanumeric() {
            id.push(c.to_ascii_lowercase());
        } else if !id.is_empty() && !id.ends_with('-') {
            id.push('-');
        }
    }
    id.trim_end_matches('-').to_string()
}

/// Order chapters by number, drop repeated numbers, skip everything at or
/// before the cursor and cap the count.
pub fn select_chapters(
    mut chapters: Vec<ChapterRef>,
    cursor: Option<ChapterNumber>,
    max_chapters: Option<u32>,
) -> Vec<ChapterRef> {
    chapters.sort_by(|a, b| a.number.cmp(&b.number));
    chapters.dedup_by(|later, earlier| later.number == earlier.number);
    if let Some(cursor) = cursor {
        chapters.retain(|chapter| chapter.number > cursor);
    }
    if let Some(max) = max_chapters {
        chapters.truncate(max as usize);
    }
    chapters
}

/// How one page ended up
#[derive(Debug)]
enum PageOutcome {
    Stored,
    Duplicate,
    /// Finished by an earlier run
    AlreadyDone,
    Failed(PageFailure),
}

/// How one chapter ended up
enum ChapterOutcome {
    Complete,
    Failed(FailedChapter),
}

/// Work the run resolved before touching the network
struct Target {
    adapter: Arc<dyn SourceAdapter>,
    work_id: String,
    work_url: String,
}

/// Drives one work through list, fetch, process, dedup and store
pub struct ScrapeOrchestrator {
    registry: Arc<SourceRegistry>,
    client: PoliteClient,
    processor: ImageProcessor,
    storage: StorageClient,
    catalog: Catalog,
    dedup: DuplicateIndex,
    locks: Arc<WorkLocks>,
    metrics: Arc<Metrics>,
    options: RunOptions,
}

#[bon::bon]
impl ScrapeOrchestrator {
    #[builder]
    pub fn new(
        registry: Arc<SourceRegistry>,
        client: PoliteClient,
        processor: ImageProcessor,
        storage: StorageClient,
        store: Arc<dyn MetadataStore>,
        #[builder(default)] options: RunOptions,
        #[builder(default)] metrics: Arc<Metrics>,
        #[builder(default)] locks: Arc<WorkLocks>,
    ) -> Self {
        Self {
            registry,
            client,
            processor,
            storage,
            catalog: Catalog::new(store.clone()),
            dedup: DuplicateIndex::new(store),
            locks,
            metrics,
            options,
        }
    }
}

impl ScrapeOrchestrator {
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Scrape one work. Failures after the run record exists come back as an
    /// aborted report; `Err` means the run never started.
    pub async fn run(
        &self,
        request: &ScrapeRequest,
        cancel: CancellationToken,
    ) -> Result<RunReport, RunError> {
        let target = self.resolve_target(request)?;

        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RunError::Cancelled),
            guard = self.locks.lock(&target.work_id) => guard,
        };

        // the persisted cursor only moves forward; resume only decides
        // whether chapters at or before it are walked again
        let cursor = self
            .catalog
            .latest_run(&target.work_id)?
            .and_then(|previous| previous.cursor);
        let resume_from = cursor.filter(|_| self.options.resume_enabled);

        let mut run = JobRun::start(&target.work_id, target.adapter.source_id(), cursor);
        self.catalog.put_run(&run)?;
        self.metrics.run_started();
        info!(
            run_id = %run.run_id,
            work_id = %run.work_id,
            source = %run.source_id,
            cursor = ?cursor,
            resume = self.options.resume_enabled,
            "Scrape started"
        );

        let counters = Arc::new(RunCounters::new());
        let client = self.client.with_cancellation(cancel.clone());
        let result = self
            .execute(&target, request, resume_from, &mut run, &client, &counters, &cancel)
            .await;

        run.ended_at = Some(Utc::now());
        run.counters = counters.snapshot();
        match result {
            Ok(()) => run.status = RunStatus::Completed,
            Err(err) => {
                error!(run_id = %run.run_id, code = err.code(), error = %err, "Scrape aborted");
                run.status = RunStatus::Aborted;
                run.abort = Some(err.abort_reason());
            }
        }
        if let Err(err) = self.catalog.put_run(&run) {
            error!(run_id = %run.run_id, error = %err, "Failed to persist final run state");
        }
        self.metrics
            .run_finished(run.status == RunStatus::Aborted, &run.counters);

        info!(
            run_id = %run.run_id,
            work_id = %run.work_id,
            status = ?run.status,
            requested = run.chapters_requested,
            completed = run.chapters_completed,
            failed = run.chapters_failed,
            pages_stored = run.counters.pages_stored,
            duplicates = run.counters.duplicates_skipped,
            bytes = run.counters.bytes_written,
            "Scrape completed"
        );
        Ok(RunReport::from(&run))
    }

    /// Scrape one chapter of a catalogued work through the same page path a
    /// run uses. No run record is written and the cursor stays where it is.
    pub async fn run_chapter(
        &self,
        request: &ChapterRequest,
        cancel: CancellationToken,
    ) -> Result<ChapterReport, RunError> {
        let work = self
            .catalog
            .get_work(&request.work_id)?
            .ok_or_else(|| RunError::UnknownWork(request.work_id.clone()))?;
        let source_id = request.source_id.as_deref().unwrap_or(&work.source_id);
        let adapter = self.registry.resolve(Some(source_id), &request.chapter_url)?;

        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RunError::Cancelled),
            guard = self.locks.lock(&work.id) => guard,
        };

        let mut chapter_ref = ChapterRef {
            number: request.chapter_number,
            title: None,
            url: request.chapter_url.clone(),
            release_date: None,
        };
        if let Some(known) = self.catalog.get_chapter(&work.id, request.chapter_number)? {
            chapter_ref.title = known.title;
            chapter_ref.release_date = known.release_date;
        }
        info!(
            work_id = %work.id,
            chapter = %chapter_ref.number,
            source = adapter.source_id(),
            "Chapter scrape started"
        );

        let counters = Arc::new(RunCounters::new());
        let client = self.client.with_cancellation(cancel);
        let outcome = self
            .scrape_chapter(adapter.as_ref(), &work.id, &chapter_ref, &client, &counters)
            .await;
        let snapshot = counters.snapshot();
        self.metrics.pages_finished(&snapshot);

        let (status, failure) = match outcome? {
            ChapterOutcome::Complete => (ChapterStatus::Complete, None),
            ChapterOutcome::Failed(failed) => {
                warn!(
                    work_id = %work.id,
                    chapter = %failed.number,
                    reason = %failed.reason,
                    "Chapter failed"
                );
                (ChapterStatus::Failed, Some(failed))
            }
        };
        let page_count = self
            .catalog
            .get_chapter(&work.id, chapter_ref.number)?
            .map_or(0, |chapter| chapter.page_count);

        Ok(ChapterReport {
            work_id: work.id,
            number: chapter_ref.number,
            status,
            page_count,
            failure,
            counters: snapshot,
        })
    }

    /// Work URLs from one page (1-based) of a source's latest-updates listing
    pub async fn list_works(
        &self,
        source_id: &str,
        page: u32,
        cancel: CancellationToken,
    ) -> Result<Vec<String>, RunError> {
        if page == 0 {
            return Err(RunError::InvalidRequest("page must be at least 1".to_string()));
        }
        let adapter = self.registry.get(source_id)?;
        let client = self.client.with_cancellation(cancel);
        adapter
            .list_works(&client, page)
            .await
            .map_err(|err| {
                if err.is_cancelled() {
                    RunError::Cancelled
                } else {
                    RunError::WorkListing(err)
                }
            })
    }

    fn resolve_target(&self, request: &ScrapeRequest) -> Result<Target, RunError> {
        if request.max_chapters == Some(0) {
            return Err(RunError::InvalidRequest(
                "max_chapters must be at least 1".to_string(),
            ));
        }

        if let Some(work_url) = request.work_url.as_deref().filter(|u| !u.trim().is_empty()) {
            let adapter = self
                .registry
                .resolve(request.source_id.as_deref(), work_url)?;
            let slug = adapter.work_slug(work_url).map_err(RegistryError::from)?;
            let work_id = derive_work_id(adapter.source_id(), &slug);
            if let Some(requested) = request.work_id.as_deref() {
                if requested != work_id {
                    return Err(RunError::InvalidRequest(format!(
                        "work_id {requested} does not match {work_url} ({work_id})"
                    )));
                }
            }
            return Ok(Target {
                adapter,
                work_id,
                work_url: work_url.to_string(),
            });
        }

        let Some(work_id) = request.work_id.as_deref() else {
            return Err(RunError::InvalidRequest(
                "either work_url or work_id is required".to_string(),
            ));
        };
        let work = self
            .catalog
            .get_work(work_id)?
            .ok_or_else(|| RunError::UnknownWork(work_id.to_string()))?;
        let source_id = request.source_id.as_deref().unwrap_or(&work.source_id);
        let adapter = self.registry.resolve(Some(source_id), &work.source_url)?;
        Ok(Target {
            adapter,
            work_id: work.id,
            work_url: work.source_url,
        })
    }

    async fn execute(
        &self,
        target: &Target,
        request: &ScrapeRequest,
        resume_from: Option<ChapterNumber>,
        run: &mut JobRun,
        client: &PoliteClient,
        counters: &Arc<RunCounters>,
        cancel: &CancellationToken,
    ) -> Result<(), RunError> {
        let adapter = target.adapter.as_ref();

        let metadata = adapter
            .parse_work_metadata(client, &target.work_url)
            .await
            .map_err(metadata_error)?;
        let (work, known) = self.merge_work(target, metadata)?;
        // a new work is only recorded once one of its chapters completes
        let mut work_saved = known;
        if known {
            self.catalog.put_work(&work)?;
        }

        let listed = adapter
            .list_chapters(client, &target.work_url)
            .await
            .map_err(metadata_error)?;
        let chapters = select_chapters(listed, resume_from, request.max_chapters);
        run.chapters_requested = chapters.len() as u32;
        self.catalog.put_run(run)?;
        debug!(work_id = %target.work_id, count = chapters.len(), "Selected chapters");

        for chapter_ref in &chapters {
            if cancel.is_cancelled() {
                return Err(RunError::Cancelled);
            }

            match self
                .scrape_chapter(adapter, &target.work_id, chapter_ref, client, counters)
                .await?
            {
                ChapterOutcome::Complete => {
                    run.chapters_completed += 1;
                    run.advance_cursor(chapter_ref.number);
                    if !work_saved {
                        self.catalog.put_work(&work)?;
                        work_saved = true;
                    }
                }
                ChapterOutcome::Failed(failed) => {
                    let indices: Vec<u32> = failed.pages.iter().map(|p| p.index).collect();
                    let causes: Vec<&str> = failed.pages.iter().map(|p| p.cause.as_str()).collect();
                    warn!(
                        work_id = %target.work_id,
                        chapter = %failed.number,
                        reason = %failed.reason,
                        pages = ?indices,
                        causes = ?causes,
                        "Chapter failed"
                    );
                    run.chapters_failed += 1;
                    run.failed_chapters.push(failed);
                }
            }

            run.counters = counters.snapshot();
            self.catalog.put_run(run)?;
        }

        Ok(())
    }

    /// Work record refreshed from fresh metadata, and whether the catalog
    /// already knew it
    fn merge_work(&self, target: &Target, metadata: WorkMetadata) -> Result<(Work, bool), RunError> {
        let now = Utc::now();
        let existing = self.catalog.get_work(&target.work_id)?;
        let known = existing.is_some();
        let work = Work {
            id: target.work_id.clone(),
            title: metadata.title,
            author: metadata.author,
            status: metadata.status,
            genres: metadata.genres,
            description: metadata.description,
            cover_url: metadata.cover_url,
            alt_titles: metadata.alt_titles,
            source_id: target.adapter.source_id().to_string(),
            source_url: target.work_url.clone(),
            created_at: existing.map_or(now, |w| w.created_at),
            last_scraped_at: now,
        };
        Ok((work, known))
    }

    async fn scrape_chapter(
        &self,
        adapter: &dyn SourceAdapter,
        work_id: &str,
        chapter_ref: &ChapterRef,
        client: &PoliteClient,
        counters: &Arc<RunCounters>,
    ) -> Result<ChapterOutcome, RunError> {
        let mut chapter = Chapter {
            work_id: work_id.to_string(),
            number: chapter_ref.number,
            title: chapter_ref.title.clone(),
            source_url: chapter_ref.url.clone(),
            page_count: 0,
            release_date: chapter_ref.release_date.clone(),
            status: ChapterStatus::InProgress,
            failure: None,
            failed_pages: Vec::new(),
            updated_at: Utc::now(),
        };
        self.catalog.put_chapter(&chapter)?;

        let pages = match adapter.list_pages(client, chapter_ref).await {
            Ok(pages) => pages,
            Err(err) if err.is_cancelled() => {
                self.reset_chapter(&mut chapter)?;
                return Err(RunError::Cancelled);
            }
            Err(err) => {
                debug!(chapter = %chapter.number, error = %err, "Page listing failed");
                return self.fail_chapter(chapter, err.cause(), Vec::new());
            }
        };
        if pages.is_empty() {
            return self.fail_chapter(chapter, FailureCause::EmptyChapter, Vec::new());
        }
        chapter.page_count = pages.len() as u32;
        self.catalog.put_chapter(&chapter)?;

        let chapter_cancel = client.cancellation().child_token();
        let worker = PageWorker {
            client: client.with_cancellation(chapter_cancel.clone()),
            processor: self.processor.clone(),
            storage: self.storage.clone(),
            catalog: self.catalog.clone(),
            dedup: self.dedup.clone(),
            counters: counters.clone(),
            storage_retry: self.options.storage_retry.clone(),
            dedup_enabled: self.options.dedup_enabled,
            source_id: Arc::from(adapter.source_id()),
            work_id: Arc::from(work_id),
            chapter: chapter.number,
            headers: Arc::new(adapter.image_headers(chapter_ref)),
        };

        let (failures, run_error) = self.run_pages(worker, pages, &chapter_cancel).await;
        if let Some(err) = run_error {
            self.reset_chapter(&mut chapter)?;
            return Err(err);
        }

        if failures.is_empty() {
            chapter.status = ChapterStatus::Complete;
            chapter.updated_at = Utc::now();
            self.catalog.put_chapter(&chapter)?;
            info!(work_id, chapter = %chapter.number, pages = chapter.page_count, "Chapter complete");
            Ok(ChapterOutcome::Complete)
        } else {
            let reason = failures[0].cause;
            self.fail_chapter(chapter, reason, failures)
        }
    }

    /// Fan the pages out over a bounded worker pool. The first run-level
    /// error cancels the remaining pages.
    async fn run_pages(
        &self,
        worker: PageWorker,
        pages: Vec<PageRef>,
        chapter_cancel: &CancellationToken,
    ) -> (Vec<PageFailure>, Option<RunError>) {
        let permits = Arc::new(Semaphore::new(self.options.page_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut indices = HashMap::new();

        for page in pages {
            let worker = worker.clone();
            let permits = permits.clone();
            let index = page.index;
            let handle = tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| RunError::Cancelled)?;
                worker.process_page(page).await
            });
            indices.insert(handle.id(), index);
        }

        let mut failures = Vec::new();
        let mut run_error = None;
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, Ok(PageOutcome::Failed(failure)))) => {
                    worker.counters.page_failed();
                    failures.push(failure);
                }
                Ok((_, Ok(outcome))) => {
                    debug!(chapter = %worker.chapter, outcome = ?outcome, "Page finished");
                }
                Ok((_, Err(err))) => {
                    chapter_cancel.cancel();
                    // cancellation triggered by an earlier error is not the root cause
                    if run_error.is_none() || matches!(run_error, Some(RunError::Cancelled)) {
                        run_error = Some(err);
                    }
                }
                Err(join_error) => {
                    let index = indices.get(&join_error.id()).copied().unwrap_or_default();
                    error!(chapter = %worker.chapter, index, error = %join_error, "Page task panicked");
                    worker.counters.page_failed();
                    failures.push(PageFailure {
                        index,
                        cause: FailureCause::EncodeError,
                        message: join_error.to_string(),
                    });
                }
            }
        }

        failures.sort_by_key(|failure| failure.index);
        (failures, run_error)
    }

    fn fail_chapter(
        &self,
        mut chapter: Chapter,
        reason: FailureCause,
        pages: Vec<PageFailure>,
    ) -> Result<ChapterOutcome, RunError> {
        chapter.status = ChapterStatus::Failed;
        chapter.failure = pages.is_empty().then_some(reason);
        chapter.failed_pages = pages.clone();
        chapter.updated_at = Utc::now();
        self.catalog.put_chapter(&chapter)?;
        Ok(ChapterOutcome::Failed(FailedChapter {
            number: chapter.number,
            reason,
            pages,
        }))
    }

    /// An interrupted chapter goes back to pending so the next run picks it up
    fn reset_chapter(&self, chapter: &mut Chapter) -> Result<(), RunError> {
        chapter.status = ChapterStatus::Pending;
        chapter.updated_at = Utc::now();
        self.catalog.put_chapter(chapter)?;
        Ok(())
    }
}

fn metadata_error(err: SourceError) -> RunError {
    if err.is_cancelled() {
        RunError::Cancelled
    } else {
        RunError::WorkMetadata(err)
    }
}

/// Everything one page task needs, cheap to clone per page
#[derive(Clone)]
struct PageWorker {
    client: PoliteClient,
    processor: ImageProcessor,
    storage: StorageClient,
    catalog: Catalog,
    dedup: DuplicateIndex,
    counters: Arc<RunCounters>,
    storage_retry: RetryPolicy,
    dedup_enabled: bool,
    source_id: Arc<str>,
    work_id: Arc<str>,
    chapter: ChapterNumber,
    headers: Arc<Vec<(&'static str, String)>>,
}

impl PageWorker {
    fn failure(index: u32, cause: FailureCause, message: impl ToString) -> PageOutcome {
        PageOutcome::Failed(PageFailure {
            index,
            cause,
            message: message.to_string(),
        })
    }

    async fn process_page(&self, page_ref: PageRef) -> Result<PageOutcome, RunError> {
        let index = page_ref.index;
        if let Some(existing) = self.catalog.get_page(&self.work_id, self.chapter, index)? {
            if existing.status.is_final() {
                return Ok(PageOutcome::AlreadyDone);
            }
        }

        let raw = match self
            .client
            .get(&self.source_id, &page_ref.url, &self.headers)
            .await
        {
            Ok(raw) => raw,
            Err(err) if err.is_cancelled() => return Err(RunError::Cancelled),
            Err(err) => return Ok(Self::failure(index, FailureCause::FetchError, err)),
        };

        let mut page = Page::fetched(&self.work_id, self.chapter, index, &page_ref.url);
        self.catalog.put_page(&page)?;

        let processed = match self.processor.process_blocking(raw).await {
            Ok(processed) => processed,
            Err(err) => return Ok(Self::failure(index, err.cause(), err)),
        };
        if processed.oversized {
            warn!(
                work_id = %self.work_id,
                chapter = %self.chapter,
                index,
                bytes = processed.bytes.len(),
                budget = self.processor.config().max_image_bytes.as_u64(),
                quality = processed.quality,
                "Image oversized"
            );
        }

        page.status = PageStatus::Processed;
        page.content_hash = Some(processed.content_hash.clone());
        page.byte_size = Some(processed.bytes.len() as u64);
        page.width = Some(processed.width);
        page.height = Some(processed.height);
        page.oversized = processed.oversized;
        page.updated_at = Utc::now();
        self.catalog.put_page(&page)?;

        let object_key = keys::page_key(&self.work_id, self.chapter, index);
        let thumbnail_key = keys::thumbnail_key(&self.work_id, self.chapter, index);

        let canonical = if self.dedup_enabled {
            let lookup = self.dedup.lookup_or_reserve(
                &processed.content_hash,
                &object_key,
                &thumbnail_key,
            )?;
            (!lookup.is_new && lookup.canonical_key != object_key).then_some(lookup)
        } else {
            None
        };

        let outcome = match canonical {
            Some(lookup) => {
                // the canonical upload may never have happened; write it now
                let mut repaired = 0;
                if !self.exists(&lookup.canonical_key).await? {
                    match self.put(&lookup.canonical_key, processed.bytes.clone()).await? {
                        Ok(written) => repaired += written,
                        Err(failure) => return Ok(Self::failure(index, FailureCause::StorageError, failure)),
                    }
                    match self.put(&lookup.thumbnail_key, processed.thumbnail.clone()).await? {
                        Ok(written) => repaired += written,
                        Err(failure) => return Ok(Self::failure(index, FailureCause::StorageError, failure)),
                    }
                    info!(key = %lookup.canonical_key, "Repaired canonical object");
                }
                self.counters.bytes_written(repaired);
                self.counters.duplicate_skipped();
                page.status = PageStatus::Duplicate;
                page.object_key = Some(lookup.canonical_key);
                page.thumbnail_key = Some(lookup.thumbnail_key);
                PageOutcome::Duplicate
            }
            None => {
                let mut written = 0;
                match self.put(&object_key, processed.bytes.clone()).await? {
                    Ok(bytes) => written += bytes,
                    Err(failure) => return Ok(Self::failure(index, FailureCause::StorageError, failure)),
                }
                match self.put(&thumbnail_key, processed.thumbnail.clone()).await? {
                    Ok(bytes) => written += bytes,
                    Err(failure) => return Ok(Self::failure(index, FailureCause::StorageError, failure)),
                }
                self.counters.page_stored(written);
                page.status = PageStatus::Stored;
                page.object_key = Some(object_key);
                page.thumbnail_key = Some(thumbnail_key);
                PageOutcome::Stored
            }
        };

        page.updated_at = Utc::now();
        self.catalog.put_page(&page)?;
        Ok(outcome)
    }

    /// Write with retry. The inner `Err` is a terminal per-page failure;
    /// the outer one ends the run. `Ok(n)` is the number of new bytes.
    async fn put(&self, key: &str, data: Bytes) -> Result<Result<u64, StorageError>, RunError> {
        let size = data.len() as u64;
        let cancel = self.client.cancellation();
        let result = self
            .storage_retry
            .execute(|| self.storage.put(key, data.clone()), StorageError::class, cancel)
            .await;
        match result {
            Ok(PutOutcome::Created) => Ok(Ok(size)),
            Ok(PutOutcome::Unchanged) => Ok(Ok(0)),
            Err(RetryError::Terminal(err)) => Ok(Err(err)),
            Err(err) => Err(storage_run_error(err)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, RunError> {
        self.storage_retry
            .execute(
                || self.storage.exists(key),
                StorageError::class,
                self.client.cancellation(),
            )
            .await
            .map_err(storage_run_error)
    }
}

fn storage_run_error(err: RetryError<StorageError>) -> RunError {
    match err {
        RetryError::Cancelled => RunError::Cancelled,
        RetryError::Exhausted { last, .. } | RetryError::Terminal(last) => RunError::ObjectStore(last),
    }
}
