use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "MANGABOX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/mangabox.toml";
const ENV_PREFIX: &str = "MANGABOX";
const ENV_SEPARATOR: &str = "__";

/// Path of the TOML file: `MANGABOX_CONFIG` or the default location
pub fn default_path() -> PathBuf {
    env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration with priority (lowest to highest):
/// struct defaults, TOML file, `.env`, process environment.
pub fn load(config_path: PathBuf) -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();

    let mut config = load_from_sources(config_path)?;
    load_secrets(&mut config);
    Ok(config)
}

/// Object store credentials never come from the TOML file
fn load_secrets(config: &mut Config) {
    let first_of = |names: [&str; 2]| names.iter().find_map(|name| env::var(name).ok());

    if config.storage.access_key.is_none() {
        config.storage.access_key = first_of(["S3_ACCESS_KEY", "AWS_ACCESS_KEY_ID"]);
    }
    if config.storage.secret_key.is_none() {
        config.storage.secret_key = first_of(["S3_SECRET_KEY", "AWS_SECRET_ACCESS_KEY"]);
    }
}

/// Load configuration from a specific path and the environment, without secrets
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!(path = %config_path.display(), "Loading configuration");
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            path = %config_path.display(),
            "Configuration file not found, using defaults and environment overrides"
        );
    }

    // MANGABOX__PIPELINE__PAGE_CONCURRENCY -> pipeline.page_concurrency
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
