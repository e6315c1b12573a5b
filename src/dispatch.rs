//! Draw dispatch: the final bind+draw step, or capture into a recording.

use crate::cache::EntryId;
use crate::device::{DrawCall, RenderDevice};
use crate::recorder::{CommandRecorder, RecordedBatch};

/// Call-site-dependent state applied when a recording is replayed.
///
/// This state is not baked into recorded buffers; the same recording can be
/// replayed under different instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplayState {
    /// Renormalize normals on the device (non-uniformly scaled instance).
    pub normalize_normals: bool,
}

/// Where a dispatched batch ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Issued to the device immediately.
    Drawn,
    /// Appended to the open recording instead of drawn.
    Recorded,
}

/// Issue one batch, or capture it while a recording is open.
pub fn dispatch(
    device: &dyn RenderDevice,
    recorder: &mut CommandRecorder,
    entry: EntryId,
    call: DrawCall,
) -> Dispatched {
    if recorder.is_recording() {
        recorder.record(RecordedBatch { entry, call });
        Dispatched::Recorded
    } else {
        device.draw(&call);
        Dispatched::Drawn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{BufferHandle, DummyDevice};
    use crate::recorder::RecordingId;
    use crate::types::PrimitiveTopology;

    fn call(device: &DummyDevice) -> DrawCall {
        let buffer = device
            .create_buffer(&crate::types::BufferDescriptor::new(
                64,
                crate::types::BufferUsage::VERTEX,
            ))
            .unwrap();
        DrawCall::new(PrimitiveTopology::TriangleList, buffer, 12, 3)
    }

    use crate::device::RenderDevice as _;

    #[test]
    fn test_dispatch_draws_when_idle() {
        let device = DummyDevice::new();
        let mut recorder = CommandRecorder::new();
        let outcome = dispatch(&device, &mut recorder, EntryId(0), call(&device));
        assert_eq!(outcome, Dispatched::Drawn);
        assert_eq!(device.draw_calls().len(), 1);
    }

    #[test]
    fn test_dispatch_records_when_recording() {
        let device = DummyDevice::new();
        let mut recorder = CommandRecorder::new();
        recorder.begin(RecordingId(1));
        let outcome = dispatch(&device, &mut recorder, EntryId(0), call(&device));
        assert_eq!(outcome, Dispatched::Recorded);
        assert!(device.draw_calls().is_empty());
        recorder.end();
        assert_eq!(recorder.sealed_batches(RecordingId(1)).unwrap().len(), 1);
    }
}
