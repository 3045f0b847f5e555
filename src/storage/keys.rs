//! Object key layout
//!
//! - full image: `work/{work_id}/chapter/{number}/page_{index:03}.{ext}`
//! - thumbnail:  `work/{work_id}/chapter/{number}/thumbnails/page_{index:03}.{ext}`
//!
//! Keys are derived from identity alone, so writers never allocate keys.

use crate::models::ChapterNumber;

/// Extension of every normalized image and thumbnail
pub const IMAGE_EXTENSION: &str = "jpg";

pub fn chapter_prefix(work_id: &str, chapter: ChapterNumber) -> String {
    format!("work/{}/chapter/{}", work_id, chapter)
}

pub fn page_key(work_id: &str, chapter: ChapterNumber, index: u32) -> String {
    format!(
        "{}/page_{:03}.{}",
        chapter_prefix(work_id, chapter),
        index,
        IMAGE_EXTENSION
    )
}

pub fn thumbnail_key(work_id: &str, chapter: ChapterNumber, index: u32) -> String {
    format!(
        "{}/thumbnails/page_{:03}.{}",
        chapter_prefix(work_id, chapter),
        index,
        IMAGE_EXTENSION
    )
}
