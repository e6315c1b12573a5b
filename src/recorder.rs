//! Deferred command recording.
//!
//! A recording captures the buffer-cache batches a sequence of draws
//! produced so the same draw calls can be replayed later without touching
//! the source arrays again. The recorder moves Idle → Recording → Sealed:
//! [`begin`](CommandRecorder::begin) clears and opens a replay list, every
//! batch produced while recording is appended instead of drawn,
//! [`end`](CommandRecorder::end) runs a one-time optimization pass over the
//! list and seals it. Replay iterates a sealed list only; it never reaches
//! the copy engine.

use std::collections::HashMap;

use crate::cache::EntryId;
use crate::device::DrawCall;

/// Identity of a recording, chosen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordingId(pub u64);

/// One recorded batch: the cache entry it came from and the draw call to
/// reissue.
#[derive(Debug, Clone)]
pub struct RecordedBatch {
    /// Cache entry the batch draws from.
    pub entry: EntryId,
    /// The captured draw call.
    pub call: DrawCall,
}

#[derive(Debug, Default)]
struct Recording {
    sealed: bool,
    batches: Vec<RecordedBatch>,
}

/// Records buffer-cache batches for later replay.
#[derive(Debug, Default)]
pub struct CommandRecorder {
    active: Option<RecordingId>,
    recordings: HashMap<RecordingId, Recording>,
}

impl CommandRecorder {
    /// Create an idle recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a recording is open.
    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// The open recording, if any.
    pub fn active(&self) -> Option<RecordingId> {
        self.active
    }

    /// Open (and clear) the recording `id` and start capturing batches.
    pub fn begin(&mut self, id: RecordingId) {
        if let Some(open) = self.active {
            log::warn!(
                "recorder: begin({}) while recording {}; sealing the open recording",
                id.0,
                open.0
            );
            self.end();
        }
        let recording = self.recordings.entry(id).or_default();
        recording.sealed = false;
        recording.batches.clear();
        self.active = Some(id);
    }

    /// Append a batch to the open recording. Returns false when idle.
    pub fn record(&mut self, batch: RecordedBatch) -> bool {
        let Some(id) = self.active else {
            return false;
        };
        let Some(recording) = self.recordings.get_mut(&id) else {
            return false;
        };
        recording.batches.push(batch);
        true
    }

    /// Seal the open recording after a one-time optimization pass.
    ///
    /// Returns the sealed recording's id, or `None` when idle.
    pub fn end(&mut self) -> Option<RecordingId> {
        let id = self.active.take()?;
        let recording = self.recordings.get_mut(&id)?;
        // Degenerate batches (no complete primitive) are dead weight at
        // replay time; drop them once here.
        recording.batches.retain(|b| b.call.primitive_count() > 0);
        recording.batches.shrink_to_fit();
        recording.sealed = true;
        log::trace!(
            "recorder: sealed recording {} with {} batches",
            id.0,
            recording.batches.len()
        );
        Some(id)
    }

    /// Batches of a sealed recording. `None` while open or unknown.
    pub fn sealed_batches(&self, id: RecordingId) -> Option<&[RecordedBatch]> {
        self.recordings
            .get(&id)
            .filter(|recording| recording.sealed)
            .map(|recording| recording.batches.as_slice())
    }

    /// Drop a recording.
    pub fn discard(&mut self, id: RecordingId) {
        if self.active == Some(id) {
            self.active = None;
        }
        self.recordings.remove(&id);
    }

    /// Drop every recording (context teardown).
    pub fn clear(&mut self) {
        self.active = None;
        self.recordings.clear();
    }
}
