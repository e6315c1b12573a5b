//! Error types for the device seam.

use thiserror::Error;

/// Errors reported by a [`RenderDevice`] implementation.
///
/// These never escape the submission layer as panics: allocation and lock
/// failures are converted into [`SubmitOutcome`] variants and the affected
/// draw is skipped for the frame.
///
/// [`RenderDevice`]: crate::device::RenderDevice
/// [`SubmitOutcome`]: crate::submit::SubmitOutcome
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The device could not allocate a buffer.
    #[error("out of device memory")]
    OutOfMemory,
    /// Mapping a buffer for write failed.
    #[error("buffer lock failed: {0}")]
    LockFailed(String),
    /// A parameter was rejected by the device.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}
