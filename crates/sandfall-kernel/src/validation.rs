//! GPU validation harness.
//!
//! This module provides validation infrastructure for the step kernel:
//! - wgpu validation layer integration (debug builds by default)
//! - Error callback handling and logging
//! - Generation checks: every cell of a read-back generation must decode

use sandfall_common::GridDims;
use tracing::{error, info, warn};

use crate::cell::Cell;

/// Returns wgpu instance flags with validation enabled when requested.
#[must_use]
pub fn gpu_instance_flags(validation: bool) -> wgpu::InstanceFlags {
    if validation {
        info!("GPU validation layer enabled");
        wgpu::InstanceFlags::VALIDATION | wgpu::InstanceFlags::DEBUG
    } else {
        info!("GPU validation layer disabled");
        wgpu::InstanceFlags::empty()
    }
}

/// Creates a wgpu instance with the requested validation settings.
#[must_use]
pub fn create_validated_instance(validation: bool) -> wgpu::Instance {
    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        flags: gpu_instance_flags(validation),
        ..Default::default()
    })
}

/// Handles uncaptured wgpu device errors by logging them.
///
/// Use this with `device.on_uncaptured_error()`. Errors raised inside a
/// kernel step are captured by error scopes and never reach this handler.
pub fn handle_device_error(error: &wgpu::Error) {
    error!("GPU device error: {error}");
}

/// Outcome of checking one generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// Whether validation passed
    pub passed: bool,
    /// Validation messages
    pub messages: Vec<String>,
    /// Generation that was checked
    pub generation: u64,
}

impl ValidationResult {
    /// Creates a passing result.
    #[must_use]
    pub fn pass(generation: u64) -> Self {
        Self {
            passed: true,
            messages: vec![],
            generation,
        }
    }

    /// Creates a failing result.
    #[must_use]
    pub fn fail(generation: u64, messages: Vec<String>) -> Self {
        Self {
            passed: false,
            messages,
            generation,
        }
    }
}

/// Maximum number of bad cells reported per generation.
const MAX_REPORTED_CELLS: usize = 8;

/// Checks read-back generations and keeps the results.
#[derive(Debug)]
pub struct ValidationHarness {
    /// Whether validation is enabled
    enabled: bool,
    /// Collected validation results
    results: Vec<ValidationResult>,
}

impl Default for ValidationHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationHarness {
    /// Creates a harness, enabled in debug builds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: cfg!(debug_assertions),
            results: Vec::new(),
        }
    }

    /// Enables or disables validation.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if enabled {
            info!("Generation validation enabled");
        } else {
            warn!("Generation validation disabled");
        }
    }

    /// Returns whether validation is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Checks that `cells` is a complete generation of valid packed cells.
    ///
    /// Returns true when the generation passed (or validation is disabled).
    pub fn check_generation(&mut self, generation: u64, dims: GridDims, cells: &[u32]) -> bool {
        if !self.enabled {
            return true;
        }

        let mut messages = Vec::new();
        if cells.len() != dims.cell_count() {
            messages.push(format!(
                "expected {} cells, got {}",
                dims.cell_count(),
                cells.len()
            ));
        }

        let mut bad = 0usize;
        for (index, &value) in cells.iter().enumerate() {
            if let Err(e) = Cell::unpack(value) {
                bad += 1;
                if bad <= MAX_REPORTED_CELLS {
                    let width = dims.width.max(1) as usize;
                    messages.push(format!("cell ({}, {}): {e}", index % width, index / width));
                }
            }
        }
        if bad > MAX_REPORTED_CELLS {
            messages.push(format!("{} more invalid cells", bad - MAX_REPORTED_CELLS));
        }

        let passed = messages.is_empty();
        if passed {
            self.results.push(ValidationResult::pass(generation));
        } else {
            error!(
                "Generation {generation} failed validation: {}",
                messages.join("; ")
            );
            self.results
                .push(ValidationResult::fail(generation, messages));
        }
        passed
    }

    /// Returns all validation results.
    #[must_use]
    pub fn results(&self) -> &[ValidationResult] {
        &self.results
    }

    /// Clears all validation results.
    pub fn clear(&mut self) {
        self.results.clear();
    }

    /// Returns the number of failures.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.results.iter().filter(|r| !r.passed).count()
    }
}
