//! Process-scoped subsystem state.
//!
//! Two structures are touched from outside a context's render thread and
//! therefore sit behind one coarse, rarely-taken lock pair owned by an
//! explicit [`GeometrySubsystem`] object (no ambient statics):
//!
//! - the context table, mutated on context registration/teardown;
//! - a two-slot pending-free queue for buffers released off-thread. The
//!   slots are swapped under the lock and drained once per frame, so the
//!   actual `destroy_buffer` calls never run while the lock is held and
//!   never race an in-use buffer.
//!
//! Everything on the hot path (cache lookups, copies, draws) belongs to the
//! per-context [`GeometrySubmitter`] and takes no locks.
//!
//! [`GeometrySubmitter`]: crate::submit::GeometrySubmitter

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::device::{BufferHandle, RenderDevice};
use crate::submit::GeometrySubmitter;

/// Identity of a registered rendering context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u64);

#[derive(Default)]
struct PendingFree {
    slots: [Vec<(ContextId, BufferHandle)>; 2],
    active: usize,
}

pub(crate) struct SubsystemShared {
    contexts: Mutex<HashMap<ContextId, Arc<dyn RenderDevice>>>,
    pending: Mutex<PendingFree>,
    next_context: AtomicU64,
}

impl SubsystemShared {
    fn new() -> Self {
        Self {
            contexts: Mutex::new(HashMap::new()),
            pending: Mutex::new(PendingFree::default()),
            next_context: AtomicU64::new(1),
        }
    }

    fn register(&self, device: Arc<dyn RenderDevice>) -> ContextId {
        let id = ContextId(self.next_context.fetch_add(1, Ordering::Relaxed));
        self.contexts.lock().insert(id, device);
        log::trace!("subsystem: registered context {}", id.0);
        id
    }

    pub(crate) fn deregister(&self, id: ContextId) {
        self.contexts.lock().remove(&id);
        log::trace!("subsystem: released context {}", id.0);
    }

    fn queue_release(&self, context: ContextId, buffer: BufferHandle) {
        let mut pending = self.pending.lock();
        let active = pending.active;
        pending.slots[active].push((context, buffer));
    }

    /// Swap the free-queue slots under the lock, then destroy the drained
    /// buffers without holding it.
    pub(crate) fn drain_pending(&self) {
        let drained = {
            let mut pending = self.pending.lock();
            let active = pending.active;
            let drained = std::mem::take(&mut pending.slots[active]);
            pending.active = 1 - active;
            drained
        };
        if drained.is_empty() {
            return;
        }

        let devices: HashMap<ContextId, Arc<dyn RenderDevice>> = {
            let contexts = self.contexts.lock();
            drained
                .iter()
                .filter_map(|(id, _)| contexts.get(id).map(|d| (*id, Arc::clone(d))))
                .collect()
        };

        for (context, buffer) in drained {
            match devices.get(&context) {
                Some(device) => device.destroy_buffer(buffer),
                // The context was torn down in the meantime; its device
                // released everything on teardown already.
                None => log::trace!(
                    "subsystem: dropping pending free for released context {}",
                    context.0
                ),
            }
        }
    }
}

/// Top-level owner of the submission layer's process-scoped state.
///
/// Create one per process (or per renderer instance), register a context
/// per rendering device, and drive each context through the returned
/// [`GeometrySubmitter`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use geomcache::{DummyDevice, GeometrySubsystem};
///
/// let subsystem = GeometrySubsystem::new();
/// let submitter = subsystem.register_context(Arc::new(DummyDevice::new()));
/// assert_eq!(subsystem.context_count(), 1);
/// drop(submitter);
/// assert_eq!(subsystem.context_count(), 0);
/// ```
pub struct GeometrySubsystem {
    shared: Arc<SubsystemShared>,
}

impl GeometrySubsystem {
    /// Create the subsystem with empty registries.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(SubsystemShared::new()),
        }
    }

    /// Register a rendering context and get its submitter.
    ///
    /// The submitter owns the context's buffer cache; dropping it releases
    /// every cached buffer and removes the context from the table.
    pub fn register_context(&self, device: Arc<dyn RenderDevice>) -> GeometrySubmitter {
        let id = self.shared.register(Arc::clone(&device));
        GeometrySubmitter::new(Arc::clone(&self.shared), id, device)
    }

    /// Queue a buffer for destruction from a non-render thread.
    ///
    /// The buffer is destroyed on the next [`drain_pending_frees`] (or
    /// submitter `begin_frame`) call.
    ///
    /// [`drain_pending_frees`]: Self::drain_pending_frees
    pub fn queue_buffer_release(&self, context: ContextId, buffer: BufferHandle) {
        self.shared.queue_release(context, buffer);
    }

    /// Drain the pending-free queue. Called once per frame.
    pub fn drain_pending_frees(&self) {
        self.shared.drain_pending();
    }

    /// Number of registered contexts.
    pub fn context_count(&self) -> usize {
        self.shared.contexts.lock().len()
    }
}

impl Default for GeometrySubsystem {
    fn default() -> Self {
        Self::new()
    }
}

static_assertions::assert_impl_all!(GeometrySubsystem: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DummyDevice;
    use crate::types::{BufferDescriptor, BufferUsage};

    #[test]
    fn test_register_and_drop_context() {
        let subsystem = GeometrySubsystem::new();
        let device = Arc::new(DummyDevice::new());
        let submitter = subsystem.register_context(device);
        assert_eq!(subsystem.context_count(), 1);
        drop(submitter);
        assert_eq!(subsystem.context_count(), 0);
    }

    #[test]
    fn test_pending_free_drains_once_per_frame() {
        let subsystem = GeometrySubsystem::new();
        let device = Arc::new(DummyDevice::new());
        let submitter = subsystem.register_context(Arc::clone(&device) as Arc<dyn RenderDevice>);
        let context = submitter.context();

        let buffer = device
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::VERTEX))
            .unwrap();
        assert_eq!(device.live_buffer_count(), 1);

        subsystem.queue_buffer_release(context, buffer);
        // Not freed until the frame drain runs.
        assert_eq!(device.live_buffer_count(), 1);

        subsystem.drain_pending_frees();
        assert_eq!(device.live_buffer_count(), 0);
    }

    #[test]
    fn test_pending_free_for_released_context_is_dropped() {
        let subsystem = GeometrySubsystem::new();
        let device = Arc::new(DummyDevice::new());
        let submitter = subsystem.register_context(Arc::clone(&device) as Arc<dyn RenderDevice>);
        let context = submitter.context();

        let buffer = device
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::VERTEX))
            .unwrap();
        subsystem.queue_buffer_release(context, buffer);
        drop(submitter);

        // Draining after teardown must not touch the dead context.
        subsystem.drain_pending_frees();
        assert_eq!(subsystem.context_count(), 0);
    }

    #[test]
    fn test_double_buffered_queue_alternates() {
        let subsystem = GeometrySubsystem::new();
        let device = Arc::new(DummyDevice::new());
        let submitter = subsystem.register_context(Arc::clone(&device) as Arc<dyn RenderDevice>);
        let context = submitter.context();

        for _ in 0..3 {
            let buffer = device
                .create_buffer(&BufferDescriptor::new(64, BufferUsage::VERTEX))
                .unwrap();
            subsystem.queue_buffer_release(context, buffer);
            subsystem.drain_pending_frees();
            assert_eq!(device.live_buffer_count(), 0);
        }
    }
}
