//! One cached buffer set for one geometry (or one window of it).

use crate::device::{BufferHandle, DrawCall};
use crate::format::FormatSignature;
use crate::types::{IndexFormat, PrimitiveTopology};

/// Identifier of a cache entry inside the directory's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(pub(crate) u32);

/// The index-buffer half of an entry, present for indexed geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBufferPart {
    /// Hardware index buffer.
    pub handle: BufferHandle,
    /// Capacity in indices.
    pub capacity: u32,
    /// Index width the buffer was allocated for.
    pub format: IndexFormat,
}

/// One vertex buffer (plus optional index buffer) caching the packed
/// vertices of exactly one geometry in one context.
///
/// Entries never mix vertices of two geometries. A geometry that needs more
/// than one buffer links further entries through `overflow`, forming the
/// overflow chain the directory walks on release.
#[derive(Debug)]
pub struct BufferCacheEntry {
    pub(crate) signature: FormatSignature,
    pub(crate) topology: PrimitiveTopology,
    pub(crate) stride: u32,
    pub(crate) vertex_capacity: u32,
    pub(crate) vertex_buffer: BufferHandle,
    /// CPU shadow of the packed vertex contents; per-channel partial
    /// copies write here, then one device write uploads the result.
    pub(crate) staging: Vec<u8>,
    pub(crate) index: Option<IndexBufferPart>,
    /// Set on fresh allocation and on any failed copy; a buffer is never
    /// drawn until a full copy has succeeded.
    pub(crate) needs_full_copy: bool,
    /// Draw calls produced from this entry, kept for pure replay.
    pub(crate) batches: Vec<DrawCall>,
    /// Next entry when the geometry spans multiple buffers.
    pub(crate) overflow: Option<EntryId>,
}

impl BufferCacheEntry {
    /// Format signature the buffer layout was resolved for.
    pub fn signature(&self) -> FormatSignature {
        self.signature
    }

    /// Topology of the cached batches.
    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }

    /// Packed record stride in bytes.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Vertex capacity of the hardware buffer.
    pub fn vertex_capacity(&self) -> u32 {
        self.vertex_capacity
    }

    /// The hardware vertex buffer.
    pub fn vertex_buffer(&self) -> BufferHandle {
        self.vertex_buffer
    }

    /// The index-buffer half, if the entry caches indexed geometry.
    pub fn index(&self) -> Option<&IndexBufferPart> {
        self.index.as_ref()
    }

    /// Whether the next copy must rewrite every channel.
    pub fn needs_full_copy(&self) -> bool {
        self.needs_full_copy
    }

    /// Cached draw calls for replay.
    pub fn batches(&self) -> &[DrawCall] {
        &self.batches
    }

    /// Next entry in the overflow chain.
    pub fn overflow(&self) -> Option<EntryId> {
        self.overflow
    }

    /// Check whether this entry can serve a request without reallocation.
    pub(crate) fn is_compatible(
        &self,
        signature: FormatSignature,
        vertex_capacity: u32,
        index_capacity: u32,
        index_format: Option<IndexFormat>,
    ) -> bool {
        if self.signature != signature || self.vertex_capacity < vertex_capacity {
            return false;
        }
        match (index_format, &self.index) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(format), Some(part)) => {
                part.format == format && part.capacity >= index_capacity
            }
        }
    }
}
