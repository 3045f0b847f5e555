//! Page image normalization
//!
//! Every fetched page is decoded, flattened to RGB, re-encoded as JPEG under a
//! byte budget and hashed. The hash is taken over the normalized bytes, so two
//! sources serving the same picture in different encodings still dedup.

mod processor;

pub use processor::{ImageError, ImageProcessor, ProcessedImage, Result};
