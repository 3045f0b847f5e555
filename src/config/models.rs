use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::fetch::{HttpConfig, RetryPolicy};

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Per-source overrides keyed by source id
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            ledger_path: default_ledger_path(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("data/ledger")
}

/// Storage provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    #[default]
    Memory,
    Local,
    S3,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    /// Root directory for the `local` provider
    pub root: Option<PathBuf>,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    /// S3 access key (loaded from environment, not from config file)
    #[serde(skip)]
    pub access_key: Option<String>,
    /// S3 secret key (loaded from environment, not from config file)
    #[serde(skip)]
    pub secret_key: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::default(),
            root: None,
            bucket: default_bucket(),
            region: None,
            endpoint: None,
            access_key: None,
            secret_key: None,
        }
    }
}

fn default_bucket() -> String {
    "mangabox-pages".to_string()
}

/// Overrides for one source adapter
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Falls back to the adapter's own politeness rate
    pub requests_per_second: Option<f64>,
    /// Alternate API or site root, mostly for tests and mirrors
    pub base_url: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            requests_per_second: None,
            base_url: None,
            enabled: true,
        }
    }
}

/// Backoff applied to every source request
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

/// Image normalization targets
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ImageConfig {
    #[serde(default = "default_quality")]
    pub quality: u8,
    #[serde(default = "default_min_quality")]
    pub min_quality: u8,
    #[serde(default = "default_quality_step")]
    pub quality_step: u8,
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: ByteSize,
    /// Downscaling stops at this width
    #[serde(default = "default_min_width")]
    pub min_width: u32,
    #[serde(default = "default_thumbnail_max_width")]
    pub thumbnail_max_width: u32,
    #[serde(default = "default_thumbnail_quality")]
    pub thumbnail_quality: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            quality: default_quality(),
            min_quality: default_min_quality(),
            quality_step: default_quality_step(),
            max_image_bytes: default_max_image_bytes(),
            min_width: default_min_width(),
            thumbnail_max_width: default_thumbnail_max_width(),
            thumbnail_quality: default_thumbnail_quality(),
        }
    }
}

fn default_quality() -> u8 {
    85
}

fn default_min_quality() -> u8 {
    40
}

fn default_quality_step() -> u8 {
    10
}

fn default_max_image_bytes() -> ByteSize {
    ByteSize::kib(200)
}

fn default_min_width() -> u32 {
    480
}

fn default_thumbnail_max_width() -> u32 {
    300
}

fn default_thumbnail_quality() -> u8 {
    70
}

/// Orchestrator behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_true")]
    pub dedup_enabled: bool,
    #[serde(default = "default_true")]
    pub resume_enabled: bool,
    /// Pages of one chapter processed at once
    #[serde(default = "default_page_concurrency")]
    pub page_concurrency: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl PipelineConfig {
    pub fn http(&self) -> HttpConfig {
        HttpConfig {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            user_agent: self.user_agent.clone(),
            ..HttpConfig::default()
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dedup_enabled: true,
            resume_enabled: true,
            page_concurrency: default_page_concurrency(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_page_concurrency() -> usize {
    4
}

fn default_user_agent() -> String {
    format!("MangaBox/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
