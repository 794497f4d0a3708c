//! Error types for Sandfall.

use thiserror::Error;

/// Top-level error type for simulation operations.
#[derive(Debug, Error)]
pub enum SimError {
    /// Cell encoding errors
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// Modification queue errors
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Compute kernel errors
    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),

    /// Grid dimensions that cannot hold a simulation
    #[error("Invalid grid dimensions {width}x{height}")]
    InvalidDimensions {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
    },
}

/// A material or variation value outside its encodable range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EncodingError {
    /// Material tag does not fit or is not a known material
    #[error("Invalid material tag {0}")]
    InvalidMaterial(u32),

    /// Variation index does not fit its bit width
    #[error("Invalid variation {0}")]
    InvalidVariation(u32),

    /// Packed value has bits set outside the cell layout
    #[error("Invalid packed cell 0x{0:08x}")]
    InvalidCell(u32),
}

/// Modification queue errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue already holds its maximum number of pending modifications
    #[error("Modification queue full (capacity {capacity})")]
    CapacityExceeded {
        /// Queue capacity
        capacity: usize,
    },
}

/// Compute kernel errors. Fatal for the step that raised them.
#[derive(Debug, Error)]
pub enum KernelError {
    /// Buffer allocation failed
    #[error("Buffer allocation failed: {0}")]
    BufferAlloc(String),

    /// Cell data does not match the buffer size
    #[error("Cell count mismatch: expected {expected}, got {actual}")]
    SizeMismatch {
        /// Expected number of cells
        expected: usize,
        /// Number of cells supplied
        actual: usize,
    },

    /// More modifications than the kernel can accept in one step
    #[error("Too many modifications: {count} > {capacity}")]
    TooManyModifications {
        /// Modifications submitted
        count: usize,
        /// Kernel capacity
        capacity: usize,
    },

    /// Compute dispatch error
    #[error("Compute dispatch error: {0}")]
    Dispatch(String),

    /// Device ran out of memory during the step
    #[error("GPU out of memory: {0}")]
    OutOfMemory(String),

    /// GPU validation error
    #[error("GPU validation error: {0}")]
    Validation(String),

    /// Reading a buffer back to the host failed
    #[error("Buffer readback failed: {0}")]
    Readback(String),
}

/// Result type alias for simulation operations.
pub type SimResult<T> = Result<T, SimError>;

/// Result type alias for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;
