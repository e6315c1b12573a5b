//! Index compaction ("re-indexify").
//!
//! An indexed draw may reference a sparse subset of a large vertex array.
//! Compaction builds a dense local vertex/index space over exactly the
//! vertices one window touches, in a single pass: the first time a source
//! index is seen it is assigned the next local index and the vertex's
//! attributes are copied immediately through a callback; assignment and
//! copy happen together, never in two passes. Repeated source indices reuse
//! their local index, so each referenced vertex is copied exactly once.
//!
//! When the device has no native quad primitive, quad indices are expanded
//! to triangles at emission time: (a, b, c, d) becomes (a, b, c), (a, c, d).

use thiserror::Error;

use crate::types::IndexFormat;

/// Marker for an unassigned slot in the [`LocalIndexMap`].
pub const UNASSIGNED: u32 = u32::MAX;

/// Scratch source-index → local-index table.
///
/// Reset to "all unassigned" before every compaction pass and sized to the
/// geometry's vertex count; it is never persisted across frames.
#[derive(Debug, Default)]
pub struct LocalIndexMap {
    slots: Vec<u32>,
}

impl LocalIndexMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resize to `size` slots and mark all of them unassigned.
    pub fn reset(&mut self, size: usize) {
        self.slots.clear();
        self.slots.resize(size, UNASSIGNED);
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if the map has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// A compaction run asked for more local vertices than the target buffer
/// holds; the caller must split the run into windows first.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("compaction exceeds {capacity} local vertices; split the run first")]
pub struct CapacityExceeded {
    /// The local vertex capacity that was exceeded.
    pub capacity: u32,
}

/// Result of compacting one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactedRun {
    /// Local (dense) indices, after any quad expansion.
    pub local_indices: Vec<u32>,
    /// Number of distinct local vertices the indices address.
    pub local_vertex_count: u32,
}

impl CompactedRun {
    /// Narrowest index format that can address this run's vertices.
    pub fn index_format(&self, threshold: u32) -> IndexFormat {
        IndexFormat::for_vertex_count(self.local_vertex_count, threshold)
    }

    /// Encode the local indices at the given width for upload.
    pub fn index_bytes(&self, format: IndexFormat) -> Vec<u8> {
        match format {
            IndexFormat::Uint16 => {
                let narrow: Vec<u16> = self.local_indices.iter().map(|&i| i as u16).collect();
                bytemuck::cast_slice(&narrow).to_vec()
            }
            IndexFormat::Uint32 => bytemuck::cast_slice(&self.local_indices).to_vec(),
        }
    }
}

/// Compact one window of source indices into a dense local space.
///
/// `vertex_count` sizes (and resets) the scratch map. `on_new_vertex` is
/// invoked once per newly assigned source vertex, in local-index order, and
/// is expected to copy that vertex's attributes into the destination slot.
/// With `expand_quads`, every four source indices emit six local indices;
/// a trailing partial quad is a no-op tail and is dropped.
pub fn compact(
    map: &mut LocalIndexMap,
    vertex_count: u32,
    source_indices: impl Iterator<Item = u32>,
    expand_quads: bool,
    max_local_vertices: u32,
    mut on_new_vertex: impl FnMut(u32, u32),
) -> Result<CompactedRun, CapacityExceeded> {
    map.reset(vertex_count as usize);

    let mut mapped = Vec::with_capacity(source_indices.size_hint().0);
    let mut next_local = 0u32;

    for source in source_indices {
        debug_assert!((source as usize) < map.slots.len());
        let slot = map.slots[source as usize];
        let local = if slot == UNASSIGNED {
            if next_local >= max_local_vertices {
                return Err(CapacityExceeded {
                    capacity: max_local_vertices,
                });
            }
            let local = next_local;
            next_local += 1;
            map.slots[source as usize] = local;
            on_new_vertex(source, local);
            local
        } else {
            slot
        };
        mapped.push(local);
    }

    let local_indices = if expand_quads {
        let mut expanded = Vec::with_capacity(mapped.len() / 4 * 6);
        for quad in mapped.chunks_exact(4) {
            let [a, b, c, d] = [quad[0], quad[1], quad[2], quad[3]];
            expanded.extend_from_slice(&[a, b, c, a, c, d]);
        }
        expanded
    } else {
        mapped
    };

    Ok(CompactedRun {
        local_indices,
        local_vertex_count: next_local,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(
        indices: &[u32],
        vertex_count: u32,
        expand_quads: bool,
        max_local: u32,
    ) -> (Result<CompactedRun, CapacityExceeded>, Vec<(u32, u32)>) {
        let mut map = LocalIndexMap::new();
        let mut copies = Vec::new();
        let result = compact(
            &mut map,
            vertex_count,
            indices.iter().copied(),
            expand_quads,
            max_local,
            |source, local| copies.push((source, local)),
        );
        (result, copies)
    }

    #[test]
    fn test_first_index_is_local_zero() {
        let (result, _) = run(&[17, 3, 17], 32, false, 16);
        let run = result.unwrap();
        assert_eq!(run.local_indices, vec![0, 1, 0]);
        assert_eq!(run.local_vertex_count, 2);
    }

    #[test]
    fn test_repeated_index_copies_once() {
        let (result, copies) = run(&[5, 9, 5, 9, 5], 16, false, 16);
        let run = result.unwrap();
        assert_eq!(run.local_indices, vec![0, 1, 0, 1, 0]);
        // Each distinct vertex copied exactly once, in local order.
        assert_eq!(copies, vec![(5, 0), (9, 1)]);
    }

    #[test]
    fn test_sparse_range_compacts_dense() {
        let (result, copies) = run(&[1000, 2000, 3000], 4096, false, 16);
        let run = result.unwrap();
        assert_eq!(run.local_indices, vec![0, 1, 2]);
        assert_eq!(run.local_vertex_count, 3);
        assert_eq!(copies.len(), 3);
    }

    #[test]
    fn test_quad_expansion() {
        let (result, _) = run(&[10, 11, 12, 13], 16, true, 16);
        let run = result.unwrap();
        // (a,b,c,d) -> (a,b,c),(a,c,d) in local space.
        assert_eq!(run.local_indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(run.local_vertex_count, 4);
    }

    #[test]
    fn test_quad_expansion_count() {
        let indices: Vec<u32> = (0..12).collect();
        let (result, _) = run(&indices, 16, true, 16);
        let run = result.unwrap();
        assert_eq!(run.local_indices.len(), 12 / 4 * 6);
    }

    #[test]
    fn test_quad_partial_tail_dropped() {
        let (result, _) = run(&[0, 1, 2, 3, 4, 5], 16, true, 16);
        let run = result.unwrap();
        assert_eq!(run.local_indices.len(), 6);
        // The two tail vertices were still assigned (and copied) before the
        // emission-side drop; the indices referencing them are gone.
        assert_eq!(run.local_vertex_count, 6);
    }

    #[test]
    fn test_capacity_exceeded() {
        let (result, copies) = run(&[0, 1, 2, 3], 8, false, 3);
        assert_eq!(result, Err(CapacityExceeded { capacity: 3 }));
        assert_eq!(copies.len(), 3);
    }

    #[test]
    fn test_index_format_choice() {
        let run = CompactedRun {
            local_indices: vec![0, 1, 2],
            local_vertex_count: 3,
        };
        assert_eq!(run.index_format(65535), IndexFormat::Uint16);

        let run = CompactedRun {
            local_indices: vec![0],
            local_vertex_count: 70_000,
        };
        assert_eq!(run.index_format(65535), IndexFormat::Uint32);
    }

    #[test]
    fn test_index_bytes_encoding() {
        let run = CompactedRun {
            local_indices: vec![1, 258],
            local_vertex_count: 259,
        };
        assert_eq!(
            run.index_bytes(IndexFormat::Uint16),
            vec![1, 0, 2, 1] // little-endian u16s
        );
        assert_eq!(run.index_bytes(IndexFormat::Uint32).len(), 8);
    }

    #[test]
    fn test_map_reset_between_runs() {
        let mut map = LocalIndexMap::new();
        let first = compact(&mut map, 8, [4u32, 5].into_iter(), false, 8, |_, _| {}).unwrap();
        assert_eq!(first.local_indices, vec![0, 1]);
        // A second pass over different indices must start from scratch.
        let second = compact(&mut map, 8, [5u32, 4].into_iter(), false, 8, |_, _| {}).unwrap();
        assert_eq!(second.local_indices, vec![0, 1]);
    }
}
