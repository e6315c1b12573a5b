//! Per-context geometry submission.
//!
//! The [`GeometrySubmitter`] drives the full immediate-mode sequence
//! (resolve format, cache lookup, copy/split/compact, draw) and the
//! deferred sequence (record and replay). One submitter exists per
//! registered context; everything it touches on the hot path is owned by it
//! and runs on the context's thread without locks.
//!
//! # Failure behavior
//!
//! Failures never panic and never leave half-drawn frames. Allocation
//! failure skips the whole draw for this frame (entries are acquired for
//! every window before anything is copied or drawn). A lock (write) failure
//! skips only that buffer's draw and marks it for a full rebuild, so a
//! buffer is never drawn with partially-updated contents.

use std::sync::Arc;

use crate::cache::{AcquireRequest, CacheDirectory, EntryId};
use crate::compact::{compact, CompactedRun, LocalIndexMap};
use crate::copy::{copy_channels, copy_vertex, CopyOp, StaticTransform};
use crate::device::{DeviceCapabilities, DrawCall, RenderDevice};
use crate::dispatch::{dispatch, Dispatched, ReplayState};
use crate::error::DeviceError;
use crate::format::{self, TextureBindings, VertexFormat};
use crate::recorder::{CommandRecorder, RecordingId};
use crate::source::{DirtyMask, GeometryId, GeometrySource};
use crate::split::{split, SplitWindow};
use crate::system::{ContextId, SubsystemShared};
use crate::types::PrimitiveTopology;

/// Result of one submission.
///
/// None of these is an error in the `Result` sense: failed submissions are
/// skipped for the frame and retried on the next call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Draw calls were issued to the device.
    Drawn {
        /// Number of draw calls issued.
        draw_calls: u32,
    },
    /// Batches were captured into the open recording instead of drawn.
    Recorded {
        /// Number of batches captured.
        batches: u32,
    },
    /// Buffer allocation failed; the draw was skipped for this frame.
    AllocationFailed,
    /// A buffer write failed; at least one window's draw was skipped and
    /// its buffer will be fully rebuilt on the next attempt.
    LockFailed,
}

/// Per-submission parameters beyond the geometry itself.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Texture unit → coordinate-set table for this draw.
    pub bindings: TextureBindings,
    /// Static transform baked into recorded geometry. Ignored in immediate
    /// mode, where the device applies the current model transform instead.
    pub transform: Option<StaticTransform>,
}

impl SubmitOptions {
    /// Options with no texture units and no static transform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the texture bindings.
    pub fn with_bindings(mut self, bindings: TextureBindings) -> Self {
        self.bindings = bindings;
        self
    }

    /// Set the static transform for record-mode submission.
    pub fn with_transform(mut self, transform: StaticTransform) -> Self {
        self.transform = Some(transform);
        self
    }
}

/// Counters describing the submitter's activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Draw calls issued to the device (immediate and replay).
    pub draws: u64,
    /// Batches captured into recordings.
    pub recorded_batches: u64,
    /// Recording replays performed.
    pub replays: u64,
    /// Copy-engine passes executed.
    pub copies: u64,
    /// Buffer uploads (device writes) performed.
    pub buffer_uploads: u64,
    /// Allocation failures observed.
    pub allocation_failures: u64,
    /// Lock (write) failures observed.
    pub lock_failures: u64,
}

#[derive(Clone, Copy)]
enum RunKind {
    /// Walk the source's index run.
    SourceIndices,
    /// Walk an implicit 0..n run (used to expand non-indexed quad lists).
    Implicit,
}

/// Per-context entry point of the submission layer.
pub struct GeometrySubmitter {
    shared: Arc<SubsystemShared>,
    context: ContextId,
    device: Arc<dyn RenderDevice>,
    capabilities: DeviceCapabilities,
    directory: CacheDirectory,
    recorder: CommandRecorder,
    index_map: LocalIndexMap,
    stats: CacheStats,
    allocation_failure_logged: bool,
}

impl GeometrySubmitter {
    pub(crate) fn new(
        shared: Arc<SubsystemShared>,
        context: ContextId,
        device: Arc<dyn RenderDevice>,
    ) -> Self {
        let capabilities = *device.capabilities();
        Self {
            shared,
            context,
            device,
            capabilities,
            directory: CacheDirectory::new(),
            recorder: CommandRecorder::new(),
            index_map: LocalIndexMap::new(),
            stats: CacheStats::default(),
            allocation_failure_logged: false,
        }
    }

    /// The context this submitter belongs to.
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// The device this submitter draws through.
    pub fn device(&self) -> &Arc<dyn RenderDevice> {
        &self.device
    }

    /// Activity counters.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Number of live cache entries.
    pub fn cached_entry_count(&self) -> usize {
        self.directory.entry_count()
    }

    /// Bytes currently held in hardware buffers.
    pub fn cached_bytes(&self) -> u64 {
        self.directory.allocated_bytes()
    }

    /// Start a frame: drains the subsystem's pending-free queue.
    pub fn begin_frame(&mut self) {
        self.shared.drain_pending();
    }

    /// Submit a non-indexed draw.
    pub fn render_geometry(
        &mut self,
        source: &GeometrySource<'_>,
        topology: PrimitiveTopology,
        options: &SubmitOptions,
    ) -> SubmitOutcome {
        // The device cannot assemble quads natively: route through the
        // indexed path, where quad expansion lives, with an implicit run.
        if topology == PrimitiveTopology::QuadList && !self.capabilities.native_quads {
            return self.render_indexed_internal(source, topology, options, RunKind::Implicit);
        }

        let format = format::resolve(source, &options.bindings, &self.capabilities);
        let dirty = source.dirty();

        if let Some(outcome) = self.try_pure_replay(source.id(), &format, topology, dirty) {
            return outcome;
        }

        let max = self.capabilities.max_vertices_for(topology);
        let windows = split(source.vertex_count(), topology, max);
        if windows.is_empty() {
            return SubmitOutcome::Drawn { draw_calls: 0 };
        }

        // Acquire every window's entry up front: an allocation failure
        // must skip the whole draw, not leave a prefix of it on screen.
        let mut ids = Vec::with_capacity(windows.len());
        for window in &windows {
            let request = AcquireRequest {
                signature: format.signature(),
                topology,
                stride: format.stride(),
                vertex_capacity: window.len(),
                index: None,
            };
            match self.acquire(source.id(), ids.last().copied(), &request) {
                Ok(id) => ids.push(id),
                Err(err) => return self.note_allocation_failure(source.id(), err),
            }
        }
        if let Some(&last) = ids.last() {
            self.directory.trim_overflow(&*self.device, last);
        }

        let transform = self.record_mode_transform(options);
        let op = CopyOp {
            format: &format,
            transform: transform.as_ref(),
        };
        let point_sprites = self.point_sprites_for(topology);

        let mut drawn = 0u32;
        let mut recorded = 0u32;
        let mut lock_failed = false;

        for (window, &id) in windows.iter().zip(&ids) {
            let Some(entry) = self.directory.entry_mut(id) else {
                continue;
            };
            let used = window.len() as usize * format.stride() as usize;
            let refresh = if entry.needs_full_copy {
                DirtyMask::all()
            } else {
                dirty
            };
            let vertex_buffer = entry.vertex_buffer;

            // INDEX/STRIPCOUNT bits restructure batches but touch no
            // vertex channel.
            let copies_channels = refresh.intersects(
                DirtyMask::VERTEX | DirtyMask::NORMAL | DirtyMask::COLOR | DirtyMask::TEXTURE,
            );
            if copies_channels {
                copy_channels(
                    &mut entry.staging[..used],
                    source,
                    window.source_indices(),
                    &op,
                    refresh,
                );
                self.stats.copies += 1;
                match self
                    .device
                    .write_buffer(vertex_buffer, 0, &entry.staging[..used])
                {
                    Ok(()) => {
                        entry.needs_full_copy = false;
                        self.stats.buffer_uploads += 1;
                    }
                    Err(err) => {
                        entry.needs_full_copy = true;
                        entry.batches.clear();
                        self.stats.lock_failures += 1;
                        lock_failed = true;
                        log::warn!(
                            "buffer write failed for geometry {}: {err}; skipping window",
                            source.id().0
                        );
                        continue;
                    }
                }
            }

            let call = DrawCall::new(topology, vertex_buffer, format.stride(), window.len())
                .with_point_sprites(point_sprites);
            entry.batches.clear();
            entry.batches.push(call.clone());
            match dispatch(&*self.device, &mut self.recorder, id, call) {
                Dispatched::Drawn => {
                    drawn += 1;
                    self.stats.draws += 1;
                }
                Dispatched::Recorded => {
                    recorded += 1;
                    self.stats.recorded_batches += 1;
                }
            }
        }

        self.outcome(drawn, recorded, lock_failed)
    }

    /// Submit an indexed draw over the source's index run.
    pub fn render_indexed_geometry(
        &mut self,
        source: &GeometrySource<'_>,
        topology: PrimitiveTopology,
        options: &SubmitOptions,
    ) -> SubmitOutcome {
        if source.indices().is_none() {
            log::warn!(
                "render_indexed_geometry called without indices (geometry {})",
                source.id().0
            );
            return SubmitOutcome::Drawn { draw_calls: 0 };
        }
        self.render_indexed_internal(source, topology, options, RunKind::SourceIndices)
    }

    fn render_indexed_internal(
        &mut self,
        source: &GeometrySource<'_>,
        topology: PrimitiveTopology,
        options: &SubmitOptions,
        run_kind: RunKind,
    ) -> SubmitOutcome {
        let run_count = match run_kind {
            RunKind::SourceIndices => source.index_count(),
            RunKind::Implicit => source.vertex_count(),
        };

        let format = format::resolve(source, &options.bindings, &self.capabilities);
        let dirty = source.dirty();

        let expand_quads = topology == PrimitiveTopology::QuadList && !self.capabilities.native_quads;
        let draw_topology = if expand_quads {
            PrimitiveTopology::TriangleList
        } else {
            topology
        };

        if let Some(outcome) = self.try_pure_replay(source.id(), &format, draw_topology, dirty) {
            return outcome;
        }

        let max = self.capabilities.max_vertices_for(topology);
        let windows = split(run_count, topology, max);
        if windows.is_empty() {
            return SubmitOutcome::Drawn { draw_calls: 0 };
        }

        let transform = self.record_mode_transform(options);
        let op = CopyOp {
            format: &format,
            transform: transform.as_ref(),
        };

        // Compact every window first: one pass assigns local indices and
        // copies each referenced vertex exactly once into scratch.
        let mut prepared: Vec<(CompactedRun, Vec<u8>)> = Vec::with_capacity(windows.len());
        for window in &windows {
            match self.compact_window(source, window, &op, expand_quads, max, run_kind) {
                Ok(entry) => prepared.push(entry),
                Err(err) => {
                    log::warn!(
                        "index compaction overflow for geometry {}: {err}; draw skipped",
                        source.id().0
                    );
                    return SubmitOutcome::Drawn { draw_calls: 0 };
                }
            }
        }

        // Acquire all entries before uploading or drawing anything.
        let mut ids = Vec::with_capacity(windows.len());
        for (compacted, _) in &prepared {
            let index_format = compacted.index_format(DeviceCapabilities::INDEX_WIDTH_THRESHOLD);
            let request = AcquireRequest {
                signature: format.signature(),
                topology: draw_topology,
                stride: format.stride(),
                vertex_capacity: compacted.local_vertex_count,
                index: Some((index_format, compacted.local_indices.len() as u32)),
            };
            match self.acquire(source.id(), ids.last().copied(), &request) {
                Ok(id) => ids.push(id),
                Err(err) => return self.note_allocation_failure(source.id(), err),
            }
        }
        if let Some(&last) = ids.last() {
            self.directory.trim_overflow(&*self.device, last);
        }

        let point_sprites = self.point_sprites_for(draw_topology);
        let mut drawn = 0u32;
        let mut recorded = 0u32;
        let mut lock_failed = false;

        for ((compacted, staging), &id) in prepared.iter().zip(&ids) {
            let Some(entry) = self.directory.entry_mut(id) else {
                continue;
            };
            let Some(index_part) = entry.index else {
                continue;
            };
            let used = compacted.local_vertex_count as usize * format.stride() as usize;
            let vertex_buffer = entry.vertex_buffer;

            let uploaded = self
                .device
                .write_buffer(vertex_buffer, 0, &staging[..used])
                .and_then(|()| {
                    self.device.write_buffer(
                        index_part.handle,
                        0,
                        &compacted.index_bytes(index_part.format),
                    )
                });
            self.stats.copies += 1;
            match uploaded {
                Ok(()) => {
                    entry.needs_full_copy = false;
                    self.stats.buffer_uploads += 1;
                }
                Err(err) => {
                    entry.needs_full_copy = true;
                    entry.batches.clear();
                    self.stats.lock_failures += 1;
                    lock_failed = true;
                    log::warn!(
                        "buffer write failed for geometry {}: {err}; skipping window",
                        source.id().0
                    );
                    continue;
                }
            }

            let call = DrawCall::new(
                draw_topology,
                vertex_buffer,
                format.stride(),
                compacted.local_vertex_count,
            )
            .with_indices(
                index_part.handle,
                index_part.format,
                compacted.local_indices.len() as u32,
            )
            .with_point_sprites(point_sprites);
            entry.batches.clear();
            entry.batches.push(call.clone());
            match dispatch(&*self.device, &mut self.recorder, id, call) {
                Dispatched::Drawn => {
                    drawn += 1;
                    self.stats.draws += 1;
                }
                Dispatched::Recorded => {
                    recorded += 1;
                    self.stats.recorded_batches += 1;
                }
            }
        }

        self.outcome(drawn, recorded, lock_failed)
    }

    /// Open the recording `id`: subsequent submissions are captured, not
    /// drawn, with any static transform baked into the copied vertices.
    pub fn begin_recording(&mut self, id: RecordingId) {
        self.recorder.begin(id);
    }

    /// Seal the open recording.
    pub fn end_recording(&mut self) -> Option<RecordingId> {
        self.recorder.end()
    }

    /// Replay a sealed recording.
    ///
    /// Reissues the captured draw calls with the call site's replay state
    /// applied; the copy engine is never invoked.
    pub fn replay(&mut self, id: RecordingId, state: &ReplayState) -> SubmitOutcome {
        let Some(batches) = self.recorder.sealed_batches(id) else {
            log::warn!("replay of unknown or unsealed recording {}", id.0);
            return SubmitOutcome::Drawn { draw_calls: 0 };
        };
        let calls: Vec<DrawCall> = batches.iter().map(|batch| batch.call.clone()).collect();

        let mut drawn = 0u32;
        for mut call in calls {
            call.normalize_normals = state.normalize_normals;
            self.device.draw(&call);
            drawn += 1;
        }
        self.stats.draws += drawn as u64;
        self.stats.replays += 1;
        SubmitOutcome::Drawn { draw_calls: drawn }
    }

    /// Drop a recording.
    pub fn discard_recording(&mut self, id: RecordingId) {
        self.recorder.discard(id);
    }

    /// Release all buffers cached for `geometry` in this context.
    pub fn release_geometry_buffers(&mut self, geometry: GeometryId) {
        self.directory.release_geometry(&*self.device, geometry);
    }

    /// Release every cached buffer and recording of this context.
    pub fn release_context_buffers(&mut self) {
        self.directory.release_all(&*self.device);
        self.recorder.clear();
    }

    fn acquire(
        &mut self,
        geometry: GeometryId,
        prev: Option<EntryId>,
        request: &AcquireRequest,
    ) -> Result<EntryId, DeviceError> {
        let acquired = match prev {
            None => self
                .directory
                .acquire_head(&*self.device, geometry, request),
            Some(prev) => self
                .directory
                .acquire_overflow(&*self.device, geometry, prev, request),
        };
        if acquired.is_ok() {
            self.allocation_failure_logged = false;
        }
        acquired
    }

    fn compact_window(
        &mut self,
        source: &GeometrySource<'_>,
        window: &SplitWindow,
        op: &CopyOp<'_>,
        expand_quads: bool,
        max_local_vertices: u32,
        run_kind: RunKind,
    ) -> Result<(CompactedRun, Vec<u8>), crate::compact::CapacityExceeded> {
        let mut staging = vec![0u8; window.len() as usize * op.format.stride() as usize];
        let run_indices = window.source_indices().map(|i| match run_kind {
            RunKind::SourceIndices => source.run_index(i),
            RunKind::Implicit => i,
        });
        let compacted = compact(
            &mut self.index_map,
            source.vertex_count(),
            run_indices,
            expand_quads,
            max_local_vertices,
            |src, local| copy_vertex(&mut staging, local, source, src, op),
        )?;
        Ok((compacted, staging))
    }

    /// Pure replay: the dirty mask is clear and the cached chain matches
    /// the resolved format, so the cached batches are reissued untouched.
    fn try_pure_replay(
        &mut self,
        geometry: GeometryId,
        format: &VertexFormat,
        topology: PrimitiveTopology,
        dirty: DirtyMask,
    ) -> Option<SubmitOutcome> {
        if !dirty.is_empty() {
            return None;
        }
        // Recording bakes the static transform into fresh copies; cached
        // immediate-mode contents are not equivalent.
        if self.recorder.is_recording() {
            return None;
        }

        let mut chain = Vec::new();
        let mut cursor = Some(self.directory.head(geometry)?);
        while let Some(id) = cursor {
            let entry = self.directory.entry(id)?;
            if entry.signature() != format.signature()
                || entry.topology() != topology
                || entry.needs_full_copy()
                || entry.batches().is_empty()
            {
                return None;
            }
            chain.push(entry.batches().to_vec());
            cursor = entry.overflow();
        }

        let mut drawn = 0u32;
        for batches in chain {
            for call in batches {
                self.device.draw(&call);
                drawn += 1;
            }
        }
        self.stats.draws += drawn as u64;
        Some(SubmitOutcome::Drawn { draw_calls: drawn })
    }

    fn record_mode_transform(&self, options: &SubmitOptions) -> Option<StaticTransform> {
        if self.recorder.is_recording() {
            options.transform
        } else {
            None
        }
    }

    fn point_sprites_for(&self, topology: PrimitiveTopology) -> bool {
        topology == PrimitiveTopology::PointList && self.capabilities.point_sprites
    }

    fn note_allocation_failure(&mut self, geometry: GeometryId, err: DeviceError) -> SubmitOutcome {
        self.stats.allocation_failures += 1;
        if !self.allocation_failure_logged {
            log::warn!(
                "buffer allocation failed for geometry {}: {err}; draws skipped until memory recovers",
                geometry.0
            );
            self.allocation_failure_logged = true;
        }
        SubmitOutcome::AllocationFailed
    }

    fn outcome(&self, drawn: u32, recorded: u32, lock_failed: bool) -> SubmitOutcome {
        if lock_failed {
            SubmitOutcome::LockFailed
        } else if recorded > 0 {
            SubmitOutcome::Recorded { batches: recorded }
        } else {
            SubmitOutcome::Drawn { draw_calls: drawn }
        }
    }
}

impl Drop for GeometrySubmitter {
    fn drop(&mut self) {
        self.release_context_buffers();
        self.shared.deregister(self.context);
    }
}

impl std::fmt::Debug for GeometrySubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeometrySubmitter")
            .field("context", &self.context)
            .field("device", &self.device.name())
            .field("entries", &self.directory.entry_count())
            .field("stats", &self.stats)
            .finish()
    }
}

// The submitter is single-threaded by design but may be moved to the thread
// owning its context.
static_assertions::assert_impl_all!(GeometrySubmitter: Send);
