//! Device abstraction consumed by the submission layer.
//!
//! The submission layer never talks to a GPU API directly; it goes through
//! the [`RenderDevice`] trait, which exposes exactly the primitives this
//! layer needs: a capability snapshot, buffer create/destroy, a synchronous
//! lock-and-write, and a bind+draw call.
//!
//! # Available implementations
//!
//! - [`DummyDevice`] (always available): no GPU, records every draw and
//!   stores buffer contents so tests can assert on submission behavior.
//!
//! Real backends live with the owning renderer; they implement this trait
//! against their API of choice.
//!
//! [`DummyDevice`]: dummy::DummyDevice

pub mod dummy;

use crate::error::DeviceError;
use crate::types::{BufferDescriptor, IndexFormat, PrimitiveTopology};

pub use dummy::DummyDevice;

/// Handle to a hardware buffer owned by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

impl BufferHandle {
    /// Raw handle value, for diagnostics.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Immutable capability snapshot of a device, taken once per context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceCapabilities {
    /// Hard cap on vertices per buffer, independent of topology.
    pub max_vertex_count: u32,
    /// Hard cap on primitives per draw call.
    pub max_primitive_count: u32,
    /// Number of simultaneous texture units.
    pub max_texture_units: u32,
    /// Whether more than one texture unit can be active in a single pass.
    pub multi_texture: bool,
    /// Whether point-list draws can be rendered as point sprites.
    pub point_sprites: bool,
    /// Whether the device assembles quad lists natively. When false, quads
    /// are expanded to triangles during index compaction.
    pub native_quads: bool,
}

impl DeviceCapabilities {
    /// Largest vertex count a 16-bit index can address.
    pub const INDEX_WIDTH_THRESHOLD: u32 = 65535;

    /// Maximum vertices a single buffer may hold for the given topology.
    ///
    /// Both the vertex cap and the primitive cap bound the answer: a strip
    /// of `p` primitives needs `p + 2` vertices, a triangle list `3 * p`.
    pub fn max_vertices_for(&self, topology: PrimitiveTopology) -> u32 {
        let by_primitives = match topology {
            PrimitiveTopology::PointList => self.max_primitive_count,
            PrimitiveTopology::LineList => self.max_primitive_count.saturating_mul(2),
            PrimitiveTopology::LineStrip => self.max_primitive_count.saturating_add(1),
            PrimitiveTopology::TriangleList => self.max_primitive_count.saturating_mul(3),
            PrimitiveTopology::TriangleStrip | PrimitiveTopology::TriangleFan => {
                self.max_primitive_count.saturating_add(2)
            }
            PrimitiveTopology::QuadList => self.max_primitive_count.saturating_mul(4),
        };
        self.max_vertex_count.min(by_primitives)
    }
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            max_vertex_count: 65536,
            max_primitive_count: 1 << 20,
            max_texture_units: 8,
            multi_texture: true,
            point_sprites: false,
            native_quads: false,
        }
    }
}

/// A fully resolved bind+draw request.
///
/// One `DrawCall` corresponds to one capacity window of one geometry: a
/// vertex buffer bind, an optional index buffer bind, and a draw of
/// `vertex_count` vertices or `index_count` indices.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    /// Primitive assembly for this draw.
    pub topology: PrimitiveTopology,
    /// Bound vertex buffer.
    pub vertex_buffer: BufferHandle,
    /// Packed record stride in bytes.
    pub stride: u32,
    /// Number of vertices referenced by this draw.
    pub vertex_count: u32,
    /// Bound index buffer, when the draw is indexed.
    pub index_buffer: Option<BufferHandle>,
    /// Index width, meaningful only when `index_buffer` is set.
    pub index_format: IndexFormat,
    /// Number of indices to draw, 0 for non-indexed draws.
    pub index_count: u32,
    /// Render point-list vertices as point sprites.
    pub point_sprites: bool,
    /// Renormalize normals on the device (set at replay time for
    /// non-uniformly scaled instances).
    pub normalize_normals: bool,
}

impl DrawCall {
    /// Create a non-indexed draw call.
    pub fn new(
        topology: PrimitiveTopology,
        vertex_buffer: BufferHandle,
        stride: u32,
        vertex_count: u32,
    ) -> Self {
        Self {
            topology,
            vertex_buffer,
            stride,
            vertex_count,
            index_buffer: None,
            index_format: IndexFormat::Uint16,
            index_count: 0,
            point_sprites: false,
            normalize_normals: false,
        }
    }

    /// Attach an index buffer, turning this into an indexed draw.
    pub fn with_indices(mut self, buffer: BufferHandle, format: IndexFormat, count: u32) -> Self {
        self.index_buffer = Some(buffer);
        self.index_format = format;
        self.index_count = count;
        self
    }

    /// Enable point-sprite rendering for this draw.
    pub fn with_point_sprites(mut self, enabled: bool) -> Self {
        self.point_sprites = enabled;
        self
    }

    /// Check if this draw uses an index buffer.
    pub fn is_indexed(&self) -> bool {
        self.index_buffer.is_some()
    }

    /// Number of primitives this draw assembles.
    pub fn primitive_count(&self) -> u32 {
        let count = if self.is_indexed() {
            self.index_count
        } else {
            self.vertex_count
        };
        self.topology.primitive_count(count)
    }
}

/// Rendering device trait consumed by the submission layer.
///
/// Implementations must be cheap to call on the hot path: `write_buffer`
/// models a synchronous lock/copy/unlock and blocks until the copy
/// completed or failed; a buffer is never written twice between draws.
pub trait RenderDevice: Send + Sync {
    /// Get the device name.
    fn name(&self) -> &'static str;

    /// Get the capability snapshot.
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Create a buffer resource.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferHandle, DeviceError>;

    /// Destroy a buffer resource. Destroying an unknown handle is a no-op.
    fn destroy_buffer(&self, buffer: BufferHandle);

    /// Lock `buffer` for write and copy `data` at `offset`.
    ///
    /// All-or-nothing: on error the buffer's previous contents are intact.
    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8])
        -> Result<(), DeviceError>;

    /// Issue a bind+draw sequence.
    fn draw(&self, call: &DrawCall);
}
