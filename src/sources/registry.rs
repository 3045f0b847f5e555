use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use super::mangadex::MangaDex;
use super::mangakakalot::MangaKakalot;
use super::traits::{SourceAdapter, SourceError};
use crate::config::Config;
use crate::fetch::RateLimiter;
use crate::models::SourceRecord;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("source {0} is disabled")]
    Disabled(String),

    #[error("no registered source handles {0}")]
    NoSourceForUrl(String),

    #[error(transparent)]
    Adapter(#[from] SourceError),
}

#[derive(Clone)]
struct Entry {
    adapter: Arc<dyn SourceAdapter>,
    requests_per_second: f64,
    enabled: bool,
}

/// Source adapters keyed by source id
#[derive(Clone, Default)]
pub struct SourceRegistry {
    entries: BTreeMap<String, Entry>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an enabled adapter at its own politeness rate
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        let rate = adapter.requests_per_second();
        self.register_with(adapter, rate, true);
    }

    pub fn register_with(
        &mut self,
        adapter: Arc<dyn SourceAdapter>,
        requests_per_second: f64,
        enabled: bool,
    ) {
        self.entries.insert(
            adapter.source_id().to_string(),
            Entry {
                adapter,
                requests_per_second,
                enabled,
            },
        );
    }

    /// Build the registry of built-in adapters, applying `[sources.<id>]`
    /// overrides and installing each rate on the limiter.
    pub fn from_config(config: &Config, limiter: &RateLimiter) -> Result<Self, RegistryError> {
        let mut registry = Self::new();

        let mangadex = config.source(super::mangadex::SOURCE_ID);
        let mut adapter = MangaDex::new()?;
        if let Some(base_url) = &mangadex.base_url {
            adapter = adapter.with_base_url(base_url.clone());
        }
        let rate = mangadex
            .requests_per_second
            .unwrap_or(adapter.requests_per_second());
        registry.register_with(Arc::new(adapter), rate, mangadex.enabled);

        let kakalot = config.source(super::mangakakalot::SOURCE_ID);
        let mut adapter = MangaKakalot::new()?;
        if let Some(base_url) = &kakalot.base_url {
            adapter = adapter.with_base_url(base_url.clone());
        }
        let rate = kakalot
            .requests_per_second
            .unwrap_or(adapter.requests_per_second());
        registry.register_with(Arc::new(adapter), rate, kakalot.enabled);

        registry.apply_rates(limiter);
        Ok(registry)
    }

    pub fn apply_rates(&self, limiter: &RateLimiter) {
        for (source_id, entry) in &self.entries {
            limiter.set_rate(source_id, entry.requests_per_second);
            info!(
                source = %source_id,
                rps = entry.requests_per_second,
                enabled = entry.enabled,
                "Registered source"
            );
        }
    }

    pub fn get(&self, source_id: &str) -> Result<Arc<dyn SourceAdapter>, RegistryError> {
        let entry = self
            .entries
            .get(source_id)
            .ok_or_else(|| RegistryError::UnknownSource(source_id.to_string()))?;
        if !entry.enabled {
            return Err(RegistryError::Disabled(source_id.to_string()));
        }
        Ok(entry.adapter.clone())
    }

    /// Pick the adapter for a work URL. An explicit source id must also own
    /// the URL; without one the first enabled source owning it wins.
    pub fn resolve(
        &self,
        source_id: Option<&str>,
        work_url: &str,
    ) -> Result<Arc<dyn SourceAdapter>, RegistryError> {
        if let Some(source_id) = source_id {
            let adapter = self.get(source_id)?;
            adapter.ensure_owned(work_url)?;
            return Ok(adapter);
        }

        self.entries
            .values()
            .filter(|entry| entry.enabled)
            .find(|entry| entry.adapter.owns_url(work_url))
            .map(|entry| entry.adapter.clone())
            .ok_or_else(|| RegistryError::NoSourceForUrl(work_url.to_string()))
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Source records as persisted at start-up
    pub fn records(&self) -> Vec<SourceRecord> {
        let now = Utc::now();
        self.entries
            .iter()
            .map(|(id, entry)| SourceRecord {
                id: id.clone(),
                name: entry.adapter.display_name().to_string(),
                base_url: entry.adapter.base_url().to_string(),
                requests_per_second: entry.requests_per_second,
                enabled: entry.enabled,
                updated_at: now,
            })
            .collect()
    }
}
