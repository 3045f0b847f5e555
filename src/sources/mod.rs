//! Source site adapters
//!
//! Each site implements [`SourceAdapter`]; the orchestrator only ever sees the
//! trait. Adding a site means writing an adapter and registering it in
//! [`SourceRegistry::from_config`].

pub mod mangadex;
pub mod mangakakalot;
mod registry;
mod traits;
mod types;

pub use mangadex::MangaDex;
pub use mangakakalot::MangaKakalot;
pub use registry::{RegistryError, SourceRegistry};
pub use traits::{SourceAdapter, SourceError};
pub use types::{ChapterRef, PageRef, WorkMetadata};

/// Source ids accepted in `[sources.<id>]`
pub const KNOWN_SOURCES: &[&str] = &[mangadex::SOURCE_ID, mangakakalot::SOURCE_ID];
