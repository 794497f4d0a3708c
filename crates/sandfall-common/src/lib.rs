//! # Sandfall Common
//!
//! Shared types for the Sandfall simulation crates:
//! - Grid dimensions and positions
//! - Window → grid coordinate transform
//! - Error taxonomy for encoding, queueing, and kernel failures

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod coords;
pub mod error;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::coords::*;
    pub use crate::error::*;
}

pub use prelude::*;
