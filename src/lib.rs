//! # geomcache
//!
//! Buffer caching and geometry submission layer for retained-mode
//! renderers. The crate turns per-vertex attribute arrays (positions,
//! normals, colors, texture-coordinate channels, optionally indexed) into
//! hardware vertex/index buffers and draw calls for a device whose buffers
//! have fixed capacity, addressing-width, and format constraints:
//!
//! - [`GeometrySource`] - per-draw view of a geometry's attribute arrays
//! - [`GeometrySubsystem`] / [`GeometrySubmitter`] - context registry and
//!   the per-context cache → copy → (split | compact) → draw pipeline
//! - [`RenderDevice`] - the consumed device abstraction, with a
//!   [`DummyDevice`] for tests and bring-up
//!
//! Buffers are cached per (geometry, context) and partially re-uploaded
//! from per-channel dirty flags; oversized draws are split into windows
//! that preserve strip/fan continuity; indexed draws are compacted into a
//! dense local index space. Submissions can also be recorded once and
//! replayed without re-touching source data.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use geomcache::{
//!     DummyDevice, GeometryId, GeometrySource, GeometrySubsystem, PositionView,
//!     PrimitiveTopology, SubmitOptions, SubmitOutcome,
//! };
//!
//! let subsystem = GeometrySubsystem::new();
//! let mut submitter = subsystem.register_context(Arc::new(DummyDevice::new()));
//!
//! let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
//! let source = GeometrySource::new(GeometryId(1), PositionView::from_f32(&positions));
//! let outcome = submitter.render_geometry(
//!     &source,
//!     PrimitiveTopology::TriangleList,
//!     &SubmitOptions::new(),
//! );
//! assert_eq!(outcome, SubmitOutcome::Drawn { draw_calls: 1 });
//! ```

pub mod cache;
pub mod compact;
pub mod copy;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod recorder;
pub mod source;
pub mod split;
pub mod submit;
pub mod system;
pub mod types;

// Re-export the main types for convenience.
pub use cache::{BufferCacheEntry, CacheDirectory, EntryId};
pub use compact::{CompactedRun, LocalIndexMap};
pub use copy::StaticTransform;
pub use device::{
    BufferHandle, DeviceCapabilities, DrawCall, DummyDevice, RenderDevice,
};
pub use dispatch::ReplayState;
pub use error::DeviceError;
pub use format::{FormatSignature, TextureBindings, VertexFormat};
pub use recorder::RecordingId;
pub use source::{
    ColorFormat, ColorView, DirtyMask, GeometryId, GeometrySource, IndexView, NormalView,
    ObjectLinearPlanes, PositionFormat, PositionView, TexCoordChannel, TexCoordView,
};
pub use split::SplitWindow;
pub use submit::{CacheStats, GeometrySubmitter, SubmitOptions, SubmitOutcome};
pub use system::{ContextId, GeometrySubsystem};
pub use types::{BufferDescriptor, BufferUsage, IndexFormat, PrimitiveTopology};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the submission layer.
///
/// Optional; only emits the version through the logging facade.
pub fn init() {
    log::info!("geomcache v{VERSION} initialized");
}
