//! Capacity-aware primitive splitting.
//!
//! When a draw references more vertices (or indices) than one hardware
//! buffer can hold, the splitter cuts it into capacity-sized windows that
//! preserve primitive assembly across boundaries:
//!
//! - List topologies truncate each non-final window to the topology's
//!   per-primitive vertex multiple so no primitive straddles a boundary;
//!   windows are disjoint and cover the sequence in order.
//! - Strip windows after the first re-copy the trailing vertices of the
//!   previous window (two for triangle strips, one for line strips).
//! - Fan windows after the first re-copy the fan apex and the previous
//!   window's last vertex.
//!
//! A trailing remainder smaller than the topology's minimum primitive size
//! is dropped silently; the owning scene graph pre-validates counts, so such
//! a tail is a no-op by contract.

use crate::types::PrimitiveTopology;

/// One capacity window of a split draw.
///
/// A window is up to two carried vertices (re-copied from the previous
/// window) followed by a contiguous run of fresh vertices. Windows are
/// consumed through [`source_indices`](Self::source_indices), which yields
/// the source element index for every destination slot in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitWindow {
    carried: [u32; 2],
    carried_len: u8,
    /// First fresh source element.
    pub start: u32,
    /// Number of fresh source elements.
    pub fresh: u32,
}

impl SplitWindow {
    fn contiguous(start: u32, fresh: u32) -> Self {
        Self {
            carried: [0; 2],
            carried_len: 0,
            start,
            fresh,
        }
    }

    fn with_carried(carried: &[u32], start: u32, fresh: u32) -> Self {
        debug_assert!(carried.len() <= 2);
        let mut stored = [0u32; 2];
        stored[..carried.len()].copy_from_slice(carried);
        Self {
            carried: stored,
            carried_len: carried.len() as u8,
            start,
            fresh,
        }
    }

    /// Source elements re-copied from the previous window.
    pub fn carried(&self) -> &[u32] {
        &self.carried[..self.carried_len as usize]
    }

    /// Total destination element count of this window.
    pub fn len(&self) -> u32 {
        self.carried_len as u32 + self.fresh
    }

    /// Check if the window is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Source element index for every destination slot, in order.
    pub fn source_indices(&self) -> impl Iterator<Item = u32> + Clone + '_ {
        self.carried[..self.carried_len as usize]
            .iter()
            .copied()
            .chain(self.start..self.start + self.fresh)
    }
}

/// Split `count` elements of `topology` into windows of at most
/// `max_capacity` elements each.
///
/// Returns a single full-range window when everything fits. Returns no
/// windows when `count` is below the topology's minimum primitive size.
pub fn split(count: u32, topology: PrimitiveTopology, max_capacity: u32) -> Vec<SplitWindow> {
    let policy = topology.policy();
    if count < policy.min_count {
        return Vec::new();
    }
    if count <= max_capacity {
        return vec![SplitWindow::contiguous(0, count)];
    }

    // Truncate the window size so no list primitive straddles a boundary
    // (and strip windows keep an even count for winding parity).
    let capacity = max_capacity - max_capacity % policy.window_multiple;
    debug_assert!(
        capacity > policy.overlap && capacity >= policy.min_count,
        "buffer capacity {max_capacity} too small to window {topology:?}"
    );

    let mut windows = vec![SplitWindow::contiguous(0, capacity)];
    let mut cursor = capacity;
    let fresh_per_window = capacity - policy.overlap;

    while cursor < count {
        let fresh = (count - cursor).min(fresh_per_window);
        if policy.overlap as u64 + (fresh as u64) < policy.min_count as u64 {
            // No-op tail below the minimum primitive size.
            break;
        }
        let window = match topology {
            PrimitiveTopology::TriangleStrip => {
                SplitWindow::with_carried(&[cursor - 2, cursor - 1], cursor, fresh)
            }
            PrimitiveTopology::LineStrip => {
                SplitWindow::with_carried(&[cursor - 1], cursor, fresh)
            }
            PrimitiveTopology::TriangleFan => {
                SplitWindow::with_carried(&[0, cursor - 1], cursor, fresh)
            }
            _ => SplitWindow::contiguous(cursor, fresh),
        };
        windows.push(window);
        cursor += fresh;
    }

    windows
}
