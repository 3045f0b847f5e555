//! Typed access to catalog entities on top of a [`MetadataStore`]

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::error::Result;
use super::partitions::{EntityKey, EntityKind, RUN_SK_PREFIX, chapter_pages_sk_prefix, work_pk};
use super::store::{MetadataStore, Record};
use crate::models::{
    Chapter, ChapterNumber, JobRun, Page, SourceRecord, SystemConfigRecord, Work,
};

#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn MetadataStore>,
}

impl Catalog {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    fn put<T: Serialize>(&self, kind: EntityKind, key: &EntityKey, value: &T) -> Result<()> {
        self.store.upsert(kind, key, serde_json::to_value(value)?)
    }

    fn fetch<T: DeserializeOwned>(&self, kind: EntityKind, key: &EntityKey) -> Result<Option<T>> {
        self.store
            .get(kind, key)?
            .map(decode)
            .transpose()
    }

    pub fn put_work(&self, work: &Work) -> Result<()> {
        self.put(EntityKind::Work, &EntityKey::work(&work.id), work)
    }

    pub fn get_work(&self, work_id: &str) -> Result<Option<Work>> {
        self.fetch(EntityKind::Work, &EntityKey::work(work_id))
    }

    pub fn list_works(&self) -> Result<Vec<Work>> {
        self.store
            .list_by_kind(EntityKind::Work)?
            .into_iter()
            .map(decode)
            .collect()
    }

    pub fn put_chapter(&self, chapter: &Chapter) -> Result<()> {
        self.put(
            EntityKind::Chapter,
            &EntityKey::chapter(&chapter.work_id, chapter.number),
            chapter,
        )
    }

    pub fn get_chapter(&self, work_id: &str, number: ChapterNumber) -> Result<Option<Chapter>> {
        self.fetch(EntityKind::Chapter, &EntityKey::chapter(work_id, number))
    }

    /// Every known chapter of a work, ascending
    pub fn list_chapters(&self, work_id: &str) -> Result<Vec<Chapter>> {
        self.store
            .query_by_work(work_id)?
            .into_iter()
            .filter(|record| record.kind == EntityKind::Chapter)
            .map(decode)
            .collect()
    }

    pub fn put_page(&self, page: &Page) -> Result<()> {
        self.put(
            EntityKind::Page,
            &EntityKey::page(&page.work_id, page.chapter, page.index),
            page,
        )
    }

    pub fn get_page(&self, work_id: &str, chapter: ChapterNumber, index: u32) -> Result<Option<Page>> {
        self.fetch(EntityKind::Page, &EntityKey::page(work_id, chapter, index))
    }

    pub fn list_pages(&self, work_id: &str, chapter: ChapterNumber) -> Result<Vec<Page>> {
        self.store
            .query_prefix(&work_pk(work_id), &chapter_pages_sk_prefix(chapter))?
            .into_iter()
            .map(decode)
            .collect()
    }

    /// Persist a run snapshot and make it durable: the cursor must survive a crash.
    pub fn put_run(&self, run: &JobRun) -> Result<()> {
        self.put(
            EntityKind::JobRun,
            &EntityKey::job_run(&run.work_id, run.run_id),
            run,
        )?;
        self.store.flush()
    }

    pub fn latest_run(&self, work_id: &str) -> Result<Option<JobRun>> {
        self.store
            .last_in_prefix(&work_pk(work_id), RUN_SK_PREFIX)?
            .map(decode)
            .transpose()
    }

    pub fn put_source(&self, source: &SourceRecord) -> Result<()> {
        self.put(EntityKind::Source, &EntityKey::source(&source.id), source)
    }

    pub fn get_source(&self, source_id: &str) -> Result<Option<SourceRecord>> {
        self.fetch(EntityKind::Source, &EntityKey::source(source_id))
    }

    pub fn put_system_config(&self, config: &SystemConfigRecord) -> Result<()> {
        self.put(
            EntityKind::SystemConfig,
            &EntityKey::system_config(&config.name),
            config,
        )
    }

    pub fn get_system_config(&self, name: &str) -> Result<Option<SystemConfigRecord>> {
        self.fetch(EntityKind::SystemConfig, &EntityKey::system_config(name))
    }
}

fn decode<T: DeserializeOwned>(record: Record) -> Result<T> {
    Ok(serde_json::from_value(record.fields)?)
}
