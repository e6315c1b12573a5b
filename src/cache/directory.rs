//! Cache directory: geometry → buffer-entry chains.
//!
//! Entries live in an arena (slot vector plus free list) and are addressed
//! by [`EntryId`]; chains are index links, never raw pointers, so unlinking
//! is O(1) and teardown is deterministic. The directory owns the mapping
//! from geometry identity to the head of its entry chain and walks overflow
//! links for whole-chain operations.

use std::collections::HashMap;

use crate::device::RenderDevice;
use crate::error::DeviceError;
use crate::format::FormatSignature;
use crate::source::GeometryId;
use crate::types::{BufferDescriptor, BufferUsage, IndexFormat, PrimitiveTopology};

use super::entry::{BufferCacheEntry, EntryId, IndexBufferPart};

/// Sizing and format parameters of an acquire.
#[derive(Debug, Clone, Copy)]
pub struct AcquireRequest {
    /// Format signature the buffer must match.
    pub signature: FormatSignature,
    /// Topology of the batches that will be cached.
    pub topology: PrimitiveTopology,
    /// Packed record stride in bytes.
    pub stride: u32,
    /// Required vertex capacity, already clamped to the device limit.
    pub vertex_capacity: u32,
    /// Required index buffer, as (width, capacity in indices).
    pub index: Option<(IndexFormat, u32)>,
}

/// Directory of cached buffer entries for one context.
#[derive(Debug, Default)]
pub struct CacheDirectory {
    entries: Vec<Option<BufferCacheEntry>>,
    free: Vec<u32>,
    by_geometry: HashMap<GeometryId, EntryId>,
    bytes_allocated: u64,
}

impl CacheDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn entry_count(&self) -> usize {
        self.entries.len() - self.free.len()
    }

    /// Total bytes currently allocated in hardware buffers.
    pub fn allocated_bytes(&self) -> u64 {
        self.bytes_allocated
    }

    /// Head entry of a geometry's chain, if cached.
    pub fn head(&self, geometry: GeometryId) -> Option<EntryId> {
        self.by_geometry.get(&geometry).copied()
    }

    /// Look up an entry.
    pub fn entry(&self, id: EntryId) -> Option<&BufferCacheEntry> {
        self.entries.get(id.0 as usize).and_then(|slot| slot.as_ref())
    }

    /// Look up an entry mutably.
    pub fn entry_mut(&mut self, id: EntryId) -> Option<&mut BufferCacheEntry> {
        self.entries.get_mut(id.0 as usize).and_then(|slot| slot.as_mut())
    }

    /// Acquire the head entry for `geometry`.
    ///
    /// Reuses the cached entry when its format signature matches and its
    /// capacity suffices; otherwise the whole chain's hardware buffers are
    /// released and a new head is allocated. A freshly allocated entry is
    /// marked as needing a full copy.
    pub fn acquire_head(
        &mut self,
        device: &dyn RenderDevice,
        geometry: GeometryId,
        request: &AcquireRequest,
    ) -> Result<EntryId, DeviceError> {
        if let Some(id) = self.head(geometry) {
            let compatible = self.entry(id).is_some_and(|entry| {
                entry.is_compatible(
                    request.signature,
                    request.vertex_capacity,
                    request.index.map_or(0, |(_, capacity)| capacity),
                    request.index.map(|(format, _)| format),
                )
            });
            if compatible {
                if let Some(entry) = self.entry_mut(id) {
                    entry.topology = request.topology;
                }
                return Ok(id);
            }
            // Format-incompatible change: the whole chain is stale.
            log::trace!(
                "cache: invalidating chain of geometry {} (signature change)",
                geometry.0
            );
            self.release_geometry(device, geometry);
        }

        let entry = self.allocate(device, geometry, request)?;
        let id = self.insert(entry);
        self.by_geometry.insert(geometry, id);
        Ok(id)
    }

    /// Acquire the overflow entry following `prev`, reusing it when
    /// compatible and reallocating the remainder of the chain otherwise.
    pub fn acquire_overflow(
        &mut self,
        device: &dyn RenderDevice,
        geometry: GeometryId,
        prev: EntryId,
        request: &AcquireRequest,
    ) -> Result<EntryId, DeviceError> {
        let next = self.entry(prev).and_then(|entry| entry.overflow);
        if let Some(id) = next {
            let compatible = self.entry(id).is_some_and(|entry| {
                entry.is_compatible(
                    request.signature,
                    request.vertex_capacity,
                    request.index.map_or(0, |(_, capacity)| capacity),
                    request.index.map(|(format, _)| format),
                )
            });
            if compatible {
                if let Some(entry) = self.entry_mut(id) {
                    entry.topology = request.topology;
                }
                return Ok(id);
            }
            self.release_chain(device, Some(id));
            if let Some(prev_entry) = self.entry_mut(prev) {
                prev_entry.overflow = None;
            }
        }

        let entry = self.allocate(device, geometry, request)?;
        let id = self.insert(entry);
        if let Some(prev_entry) = self.entry_mut(prev) {
            prev_entry.overflow = Some(id);
        }
        Ok(id)
    }

    /// Release any chain entries past `last_used` (the draw shrank).
    pub fn trim_overflow(&mut self, device: &dyn RenderDevice, last_used: EntryId) {
        let tail = self
            .entry_mut(last_used)
            .and_then(|entry| entry.overflow.take());
        self.release_chain(device, tail);
    }

    /// Release all buffers cached for `geometry`.
    pub fn release_geometry(&mut self, device: &dyn RenderDevice, geometry: GeometryId) {
        let head = self.by_geometry.remove(&geometry);
        self.release_chain(device, head);
    }

    /// Release every entry in the directory (context teardown).
    pub fn release_all(&mut self, device: &dyn RenderDevice) {
        let heads: Vec<EntryId> = self.by_geometry.drain().map(|(_, id)| id).collect();
        for head in heads {
            self.release_chain(device, Some(head));
        }
        debug_assert_eq!(self.entry_count(), 0);
    }

    fn release_chain(&mut self, device: &dyn RenderDevice, mut cursor: Option<EntryId>) {
        while let Some(id) = cursor {
            let Some(entry) = self
                .entries
                .get_mut(id.0 as usize)
                .and_then(|slot| slot.take())
            else {
                break;
            };
            cursor = entry.overflow;
            self.free.push(id.0);

            self.bytes_allocated -= entry.staging.len() as u64;
            device.destroy_buffer(entry.vertex_buffer);
            if let Some(part) = entry.index {
                self.bytes_allocated -= part.capacity as u64 * part.format.size() as u64;
                device.destroy_buffer(part.handle);
            }
        }
    }

    fn allocate(
        &mut self,
        device: &dyn RenderDevice,
        geometry: GeometryId,
        request: &AcquireRequest,
    ) -> Result<BufferCacheEntry, DeviceError> {
        let vertex_bytes = request.stride as u64 * request.vertex_capacity as u64;
        let vertex_buffer = device.create_buffer(
            &BufferDescriptor::new(
                vertex_bytes,
                BufferUsage::VERTEX | BufferUsage::MAP_WRITE | BufferUsage::DYNAMIC,
            )
            .with_label(format!("geometry-{}-vb", geometry.0)),
        )?;

        let index = match request.index {
            None => None,
            Some((format, capacity)) => {
                let descriptor = BufferDescriptor::new(
                    capacity as u64 * format.size() as u64,
                    BufferUsage::INDEX | BufferUsage::MAP_WRITE,
                )
                .with_label(format!("geometry-{}-ib", geometry.0));
                match device.create_buffer(&descriptor) {
                    Ok(handle) => Some(IndexBufferPart {
                        handle,
                        capacity,
                        format,
                    }),
                    Err(err) => {
                        // Never leak the vertex half on a partial failure.
                        device.destroy_buffer(vertex_buffer);
                        return Err(err);
                    }
                }
            }
        };

        self.bytes_allocated += vertex_bytes;
        if let Some((format, capacity)) = request.index {
            self.bytes_allocated += capacity as u64 * format.size() as u64;
        }

        Ok(BufferCacheEntry {
            signature: request.signature,
            topology: request.topology,
            stride: request.stride,
            vertex_capacity: request.vertex_capacity,
            vertex_buffer,
            staging: vec![0u8; vertex_bytes as usize],
            index,
            needs_full_copy: true,
            batches: Vec::new(),
            overflow: None,
        })
    }

    fn insert(&mut self, entry: BufferCacheEntry) -> EntryId {
        match self.free.pop() {
            Some(slot) => {
                self.entries[slot as usize] = Some(entry);
                EntryId(slot)
            }
            None => {
                self.entries.push(Some(entry));
                EntryId(self.entries.len() as u32 - 1)
            }
        }
    }
}
