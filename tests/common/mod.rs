//! Common utilities for the submission integration tests.

use std::sync::Arc;

use geomcache::{DeviceCapabilities, DummyDevice, GeometrySubmitter, GeometrySubsystem};

/// Test context bundling the subsystem, the dummy device, and the context's
/// submitter.
pub struct TestContext {
    /// Subsystem owning the context table.
    pub subsystem: GeometrySubsystem,
    /// The dummy device, kept for draw/buffer assertions.
    pub device: Arc<DummyDevice>,
    /// The registered context's submitter.
    pub submitter: GeometrySubmitter,
}

impl TestContext {
    /// Create a context with default capabilities.
    pub fn new() -> Self {
        Self::with_capabilities(DeviceCapabilities::default())
    }

    /// Create a context with the given device capabilities.
    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let subsystem = GeometrySubsystem::new();
        let device = Arc::new(DummyDevice::with_capabilities(capabilities));
        let submitter = subsystem.register_context(device.clone());
        Self {
            subsystem,
            device,
            submitter,
        }
    }

    /// Byte offset of the packed color in a position + color layout.
    pub fn color_offset(&self) -> u32 {
        12
    }
}

/// Read the position of packed vertex `i` from uploaded buffer bytes.
pub fn read_position(bytes: &[u8], stride: u32, i: usize) -> [f32; 3] {
    let at = i * stride as usize;
    bytemuck::pod_read_unaligned(&bytes[at..at + 12])
}

/// Read the packed 32-bit color of vertex `i` from uploaded buffer bytes.
pub fn read_color(bytes: &[u8], stride: u32, offset: u32, i: usize) -> u32 {
    let at = i * stride as usize + offset as usize;
    bytemuck::pod_read_unaligned(&bytes[at..at + 4])
}

/// Decode uploaded 16-bit index buffer bytes.
pub fn decode_u16(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
        .collect()
}
