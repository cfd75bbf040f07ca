//! Per-candidate extraction of media references and metadata.

pub mod media;
pub mod metadata;

pub use media::{MediaConfig, MediaDeduper, MediaItem, MediaKind, extract_media, strip_query};
pub use metadata::{AdMetadata, AdStatus, ExtractContext, Platform, UNKNOWN_BRAND, extract};
