use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::fetch::{FetchError, HttpClient, PoliteClient, RateLimiter, interval_for};
use crate::imaging::ImageProcessor;
use crate::ledger::{Catalog, FjallStore, LedgerError, MetadataStore};
use crate::models::SystemConfigRecord;
use crate::observability::Metrics;
use crate::pipeline::{RunOptions, ScrapeOrchestrator};
use crate::sources::{RegistryError, SourceRegistry};
use crate::storage::{StorageClient, StorageError};

/// Name of the system config record holding the effective pipeline settings
pub const PIPELINE_CONFIG_NAME: &str = "pipeline";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("cannot open metadata store: {0}")]
    Ledger(#[from] LedgerError),
    #[error("cannot open object store: {0}")]
    Storage(#[from] StorageError),
    #[error("cannot register sources: {0}")]
    Registry(#[from] RegistryError),
    #[error("cannot build HTTP client: {0}")]
    Http(#[from] FetchError),
    #[error("cannot encode configuration: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<SourceRegistry>,
    pub catalog: Catalog,
    pub orchestrator: Arc<ScrapeOrchestrator>,
    pub metrics: Arc<Metrics>,
    /// Fires on shutdown; every run started through the API listens to it
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Open the configured backends and wire the pipeline
    pub fn from_config(config: Config) -> Result<Self, StartupError> {
        info!(path = %config.server.ledger_path.display(), "Opening metadata store");
        let store = FjallStore::open(&config.server.ledger_path)?;
        let storage = StorageClient::from_config(&config.storage)?;
        Self::new(config, Arc::new(store), storage)
    }

    pub fn new(
        config: Config,
        store: Arc<dyn MetadataStore>,
        storage: StorageClient,
    ) -> Result<Self, StartupError> {
        let limiter = Arc::new(RateLimiter::new(interval_for(1.0)));
        let registry = Arc::new(SourceRegistry::from_config(&config, &limiter)?);
        let http = Arc::new(HttpClient::new(&config.pipeline.http())?);
        let client = PoliteClient::new(http, limiter, config.retry.policy());
        let metrics = Arc::new(Metrics::new());

        let catalog = Catalog::new(store.clone());
        for source in registry.records() {
            catalog.put_source(&source)?;
        }
        catalog.put_system_config(&SystemConfigRecord {
            name: PIPELINE_CONFIG_NAME.to_string(),
            values: json!({
                "pipeline": serde_json::to_value(&config.pipeline)?,
                "image": serde_json::to_value(&config.image)?,
                "retry": serde_json::to_value(&config.retry)?,
            }),
            updated_at: Utc::now(),
        })?;

        let orchestrator = ScrapeOrchestrator::builder()
            .registry(registry.clone())
            .client(client)
            .processor(ImageProcessor::new(config.image.clone()))
            .storage(storage)
            .store(store)
            .options(RunOptions::from_config(&config))
            .metrics(metrics.clone())
            .build();

        Ok(Self {
            config: Arc::new(config),
            registry,
            catalog,
            orchestrator: Arc::new(orchestrator),
            metrics,
            shutdown: CancellationToken::new(),
        })
    }
}
