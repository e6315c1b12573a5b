//! Buffer descriptors and usage flags.

use bitflags::bitflags;

bitflags! {
    /// Usage flags for hardware buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer holds packed vertex records.
        const VERTEX = 1 << 0;
        /// Buffer holds indices.
        const INDEX = 1 << 1;
        /// Buffer is written by the CPU through a synchronous lock.
        const MAP_WRITE = 1 << 2;
        /// Contents are rewritten frequently; the device may place the
        /// buffer in upload-optimized memory.
        const DYNAMIC = 1 << 3;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptor for creating a hardware buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    /// Create a new buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Index format for indexed drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    /// 16-bit unsigned integers (max 65535 vertices).
    #[default]
    Uint16,
    /// 32-bit unsigned integers.
    Uint32,
}

impl IndexFormat {
    /// Get the size in bytes of each index.
    pub fn size(&self) -> usize {
        match self {
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }

    /// Choose the narrowest format that can address `vertex_count` vertices.
    pub fn for_vertex_count(vertex_count: u32, threshold: u32) -> Self {
        if vertex_count <= threshold {
            Self::Uint16
        } else {
            Self::Uint32
        }
    }
}
