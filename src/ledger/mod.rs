//! Fjall-based persistence for the catalog and run bookkeeping
//!
//! One embedded LSM keyspace holds every entity the pipeline writes:
//!
//! - Works, chapters and pages (the catalog)
//! - Dedup records keyed by content hash
//! - Job runs, including the resume cursor
//! - Source and system configuration records
//!
//! Records are addressed by a single-table pk/sk layout (see [`partitions`]),
//! so all chapters and pages of a work are one range scan away.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mangabox::ledger::{Catalog, FjallStore};
//!
//! let store = Arc::new(FjallStore::open("data/ledger")?);
//! let catalog = Catalog::new(store);
//! catalog.put_work(&work)?;
//! let chapters = catalog.list_chapters(&work.id)?;
//! ```

pub mod catalog;
pub mod dedup;
pub mod error;
pub mod partitions;
pub mod store;

pub use catalog::Catalog;
pub use dedup::{DedupLookup, DuplicateIndex};
pub use error::{LedgerError, Result};
pub use partitions::{EntityKey, EntityKind};
pub use store::{FjallStore, MetadataStore, Record, StoreStats};
