//! # Sandfall
//!
//! Falling-sand cellular automaton on a double-buffered GPU grid.
//!
//! This binary ties together:
//! - Kernel: wgpu compute step and render pipeline
//! - Input: brush painting and keyboard commands
//! - Timing: fixed-rate stepping decoupled from the frame rate

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod app;
mod config;
mod input;
mod renderer;
mod timing;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Main entry point.
fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("sandfall=info".parse()?))
        .init();

    info!("Sandfall starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    app::run()?;

    info!("Sandfall shutdown complete");
    Ok(())
}
