//! Buffer cache: entries and the directory that owns them.
//!
//! A [`BufferCacheEntry`] owns the hardware vertex (and optional index)
//! buffer caching one geometry's packed vertices; the [`CacheDirectory`]
//! maps geometry identity to entry chains and handles reuse, invalidation,
//! overflow linking, and deterministic release.

mod directory;
mod entry;

pub use directory::{AcquireRequest, CacheDirectory};
pub use entry::{BufferCacheEntry, EntryId, IndexBufferPart};
