//! Dummy device for testing and development.
//!
//! This device performs no GPU work but keeps enough state to be useful:
//! buffer contents live in host memory and every draw call is recorded, so
//! the submission layer can be exercised and asserted on without hardware.
//! Allocation and lock failures can be injected to test the recovery paths.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::DeviceError;
use crate::types::BufferDescriptor;

use super::{BufferHandle, DeviceCapabilities, DrawCall, RenderDevice};

#[derive(Default)]
struct DummyState {
    next_handle: u64,
    buffers: HashMap<u64, Vec<u8>>,
    draws: Vec<DrawCall>,
    writes: u64,
    created: u64,
    destroyed: u64,
    fail_allocations: bool,
    fail_writes: bool,
}

/// Dummy rendering device.
pub struct DummyDevice {
    capabilities: DeviceCapabilities,
    state: Mutex<DummyState>,
}

impl DummyDevice {
    /// Create a new dummy device with default capabilities.
    pub fn new() -> Self {
        Self::with_capabilities(DeviceCapabilities::default())
    }

    /// Create a new dummy device with the given capability snapshot.
    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self {
        Self {
            capabilities,
            state: Mutex::new(DummyState::default()),
        }
    }

    /// Make subsequent buffer creations fail with `OutOfMemory`.
    pub fn fail_allocations(&self, fail: bool) {
        self.state.lock().fail_allocations = fail;
    }

    /// Make subsequent buffer writes fail with `LockFailed`.
    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Get a copy of the draw calls issued so far.
    pub fn draw_calls(&self) -> Vec<DrawCall> {
        self.state.lock().draws.clone()
    }

    /// Clear the recorded draw calls.
    pub fn clear_draw_calls(&self) {
        self.state.lock().draws.clear();
    }

    /// Get the contents of a live buffer.
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        self.state.lock().buffers.get(&buffer.0).cloned()
    }

    /// Number of live (created and not yet destroyed) buffers.
    pub fn live_buffer_count(&self) -> usize {
        self.state.lock().buffers.len()
    }

    /// Total number of buffer writes performed.
    pub fn write_count(&self) -> u64 {
        self.state.lock().writes
    }

    /// Total buffers created over the device lifetime.
    pub fn created_count(&self) -> u64 {
        self.state.lock().created
    }

    /// Total buffers destroyed over the device lifetime.
    pub fn destroyed_count(&self) -> u64 {
        self.state.lock().destroyed
    }
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderDevice for DummyDevice {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferHandle, DeviceError> {
        let mut state = self.state.lock();
        if state.fail_allocations {
            return Err(DeviceError::OutOfMemory);
        }
        if descriptor.size == 0 {
            return Err(DeviceError::InvalidParameter(
                "buffer size cannot be zero".to_string(),
            ));
        }
        state.next_handle += 1;
        let handle = state.next_handle;
        state.buffers.insert(handle, vec![0u8; descriptor.size as usize]);
        state.created += 1;
        log::trace!(
            "DummyDevice: created buffer {:?} ({} bytes, {:?})",
            descriptor.label,
            descriptor.size,
            handle
        );
        Ok(BufferHandle(handle))
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        let mut state = self.state.lock();
        if state.buffers.remove(&buffer.0).is_some() {
            state.destroyed += 1;
            log::trace!("DummyDevice: destroyed buffer {}", buffer.0);
        }
    }

    fn write_buffer(
        &self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(DeviceError::LockFailed("injected failure".to_string()));
        }
        let contents = state
            .buffers
            .get_mut(&buffer.0)
            .ok_or_else(|| DeviceError::InvalidParameter("unknown buffer handle".to_string()))?;
        let start = offset as usize;
        let end = start + data.len();
        if end > contents.len() {
            return Err(DeviceError::InvalidParameter(format!(
                "write of {} bytes at {} exceeds buffer size {}",
                data.len(),
                offset,
                contents.len()
            )));
        }
        contents[start..end].copy_from_slice(data);
        state.writes += 1;
        Ok(())
    }

    fn draw(&self, call: &DrawCall) {
        log::trace!(
            "DummyDevice: draw {:?}, {} vertices, {} indices",
            call.topology,
            call.vertex_count,
            call.index_count
        );
        self.state.lock().draws.push(call.clone());
    }
}

// Ensure the device can be shared across threads behind Arc<dyn RenderDevice>.
static_assertions::assert_impl_all!(DummyDevice: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BufferUsage, PrimitiveTopology};

    #[test]
    fn test_create_write_read() {
        let device = DummyDevice::new();
        let buffer = device
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::VERTEX))
            .unwrap();
        device.write_buffer(buffer, 4, &[1, 2, 3, 4]).unwrap();
        let contents = device.buffer_contents(buffer).unwrap();
        assert_eq!(&contents[4..8], &[1, 2, 3, 4]);
        assert_eq!(device.live_buffer_count(), 1);

        device.destroy_buffer(buffer);
        assert_eq!(device.live_buffer_count(), 0);
        assert!(device.buffer_contents(buffer).is_none());
    }

    #[test]
    fn test_injected_allocation_failure() {
        let device = DummyDevice::new();
        device.fail_allocations(true);
        let result = device.create_buffer(&BufferDescriptor::new(16, BufferUsage::VERTEX));
        assert_eq!(result, Err(DeviceError::OutOfMemory));

        device.fail_allocations(false);
        assert!(device
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::VERTEX))
            .is_ok());
    }

    #[test]
    fn test_injected_write_failure_keeps_contents() {
        let device = DummyDevice::new();
        let buffer = device
            .create_buffer(&BufferDescriptor::new(4, BufferUsage::VERTEX))
            .unwrap();
        device.write_buffer(buffer, 0, &[9, 9, 9, 9]).unwrap();

        device.fail_writes(true);
        assert!(device.write_buffer(buffer, 0, &[1, 1, 1, 1]).is_err());
        assert_eq!(device.buffer_contents(buffer).unwrap(), vec![9, 9, 9, 9]);
    }

    #[test]
    fn test_out_of_bounds_write() {
        let device = DummyDevice::new();
        let buffer = device
            .create_buffer(&BufferDescriptor::new(4, BufferUsage::VERTEX))
            .unwrap();
        assert!(device.write_buffer(buffer, 2, &[0, 0, 0]).is_err());
    }

    #[test]
    fn test_draw_recording() {
        let device = DummyDevice::new();
        let buffer = device
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::VERTEX))
            .unwrap();
        let call = DrawCall::new(PrimitiveTopology::TriangleList, buffer, 12, 3);
        device.draw(&call);
        device.draw(&call);

        let draws = device.draw_calls();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0], call);

        device.clear_draw_calls();
        assert!(device.draw_calls().is_empty());
    }
}
