//! Configuration management for MangaBox
//!
//! Settings are layered, lowest priority first:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables
//!
//! # Usage
//!
//! ```no_run
//! use mangabox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Any key can be overridden with `MANGABOX__<section>__<key>`:
//! - `MANGABOX__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `MANGABOX__PIPELINE__PAGE_CONCURRENCY=8`
//! - `MANGABOX__IMAGE__MAX_IMAGE_BYTES=150KB`
//!
//! S3 credentials are read only from `S3_ACCESS_KEY`/`S3_SECRET_KEY` or the
//! AWS equivalents.
//!
//! # Configuration File
//!
//! By default the file is `config/mangabox.toml`; set `MANGABOX_CONFIG` to
//! point elsewhere.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    Config, ImageConfig, LoggingConfig, PipelineConfig, RetryConfig, ServerConfig, SourceConfig,
    StorageConfig, StorageProvider,
};
pub use validation::ValidationError;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from the default path (or `MANGABOX_CONFIG`) and
    /// the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(sources::default_path())
    }

    /// Load configuration from a specific path, plus environment overrides
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate(self)
    }

    /// Override entry for a source, or the default one
    pub fn source(&self, source_id: &str) -> SourceConfig {
        self.sources.get(source_id).cloned().unwrap_or_default()
    }
}
