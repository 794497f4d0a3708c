//! # Sandfall Kernel
//!
//! Double-buffered cellular automaton simulation.
//!
//! This crate provides the simulation core:
//! - Packed cell encoding (material and variation in one `u32`)
//! - Double-buffered grid storage with index swapping
//! - Bounded modification queue for host edits
//! - Fixed-rate step scheduling
//! - A wgpu compute kernel and a rayon host kernel running the same rule set
//! - Render pipeline for the current generation
//! - GPU validation harness
//!
//! ## Double Buffering
//!
//! Each step reads the current buffer and writes every cell of the other.
//! Buffers are swapped only after the kernel's completion barrier, so the
//! current buffer always holds a complete generation.
//!
//! ## Modifications
//!
//! Host edits are queued between steps, drained once per step in enqueue
//! order, and applied by the kernel after the rule set. A full queue rejects
//! new edits.
//!
//! ## Validation
//!
//! In debug builds, wgpu validation is enabled to catch GPU errors early.
//! Use `create_validated_instance()` to create a wgpu instance with appropriate settings.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod cell;
pub mod compute;
pub mod grid;
pub mod host;
pub mod modification;
pub mod render;
pub mod scheduler;
pub mod step;
pub mod validation;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::cell::*;
    pub use crate::compute::*;
    pub use crate::grid::*;
    pub use crate::host::HostKernel;
    pub use crate::modification::*;
    pub use crate::render::*;
    pub use crate::scheduler::*;
    pub use crate::step::*;
    pub use crate::validation::*;
}

pub use prelude::*;
