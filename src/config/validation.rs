use super::models::{Config, StorageProvider};
use crate::sources::KNOWN_SOURCES;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Unknown source '{0}' in [sources]")]
    UnknownSource(String),

    #[error("Source '{source_id}' requests_per_second must be positive, got {value}")]
    InvalidRate { source_id: String, value: f64 },

    #[error("{field} must be within 1..=100, got {value}")]
    QualityOutOfRange { field: &'static str, value: u8 },

    #[error("min_quality ({min}) exceeds quality ({quality})")]
    QualityFloorAboveTarget { min: u8, quality: u8 },

    #[error("{field} must be at least 1")]
    MustBePositive { field: &'static str },

    #[error("Storage provider 'local' requires storage.root")]
    MissingLocalRoot,

    #[error("Storage provider 's3' requires a bucket")]
    MissingBucket,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_sources(config)?;
    validate_retry(config)?;
    validate_image(config)?;
    validate_pipeline(config)?;
    validate_storage(config)?;
    Ok(())
}

fn validate_sources(config: &Config) -> Result<(), ValidationError> {
    for (source_id, source) in &config.sources {
        if !KNOWN_SOURCES.contains(&source_id.as_str()) {
            return Err(ValidationError::UnknownSource(source_id.clone()));
        }
        if let Some(rate) = source.requests_per_second {
            if rate.is_nan() || rate <= 0.0 {
                return Err(ValidationError::InvalidRate {
                    source_id: source_id.clone(),
                    value: rate,
                });
            }
        }
    }
    Ok(())
}

fn validate_retry(config: &Config) -> Result<(), ValidationError> {
    if config.retry.max_attempts < 1 {
        return Err(ValidationError::MustBePositive {
            field: "retry.max_attempts",
        });
    }
    Ok(())
}

fn validate_image(config: &Config) -> Result<(), ValidationError> {
    let image = &config.image;
    for (field, value) in [
        ("image.quality", image.quality),
        ("image.min_quality", image.min_quality),
        ("image.thumbnail_quality", image.thumbnail_quality),
    ] {
        if !(1..=100).contains(&value) {
            return Err(ValidationError::QualityOutOfRange { field, value });
        }
    }
    if image.min_quality > image.quality {
        return Err(ValidationError::QualityFloorAboveTarget {
            min: image.min_quality,
            quality: image.quality,
        });
    }
    if image.quality_step == 0 {
        return Err(ValidationError::MustBePositive {
            field: "image.quality_step",
        });
    }
    if image.thumbnail_max_width == 0 {
        return Err(ValidationError::MustBePositive {
            field: "image.thumbnail_max_width",
        });
    }
    Ok(())
}

fn validate_pipeline(config: &Config) -> Result<(), ValidationError> {
    if config.pipeline.page_concurrency < 1 {
        return Err(ValidationError::MustBePositive {
            field: "pipeline.page_concurrency",
        });
    }
    Ok(())
}

fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    match config.storage.provider {
        StorageProvider::Local if config.storage.root.is_none() => {
            Err(ValidationError::MissingLocalRoot)
        }
        StorageProvider::S3 if config.storage.bucket.trim().is_empty() => {
            Err(ValidationError::MissingBucket)
        }
        _ => Ok(()),
    }
}
