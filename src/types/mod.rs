//! Common types and descriptors shared across the submission pipeline.
//!
//! This module contains the buffer descriptors, usage flags, and the closed
//! primitive-topology enum (with its per-topology splitting policy) used
//! throughout the crate.

mod buffer;
mod topology;

pub use buffer::{BufferDescriptor, BufferUsage, IndexFormat};
pub use topology::{PrimitiveTopology, TopologyPolicy};
