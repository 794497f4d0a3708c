//! Double-buffered cell storage.
//!
//! The grid owns two equally sized buffers in a two-slot arena. The kernel
//! reads the current generation from one slot and writes the next into the
//! other; the slots then exchange labels by index. Cell data is never copied
//! between buffers.

use sandfall_common::{GridDims, KernelResult, SimError, SimResult};
use tracing::info;

use crate::cell::{Cell, Material};
use crate::compute::ComputeKernel;

/// Default height of the seeded sand band, in rows.
pub const DEFAULT_SEED_BAND_ROWS: u32 = 1;

/// Physical buffer in the two-slot arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferSlot {
    /// First buffer
    A,
    /// Second buffer
    B,
}

impl BufferSlot {
    const fn index(self) -> usize {
        match self {
            BufferSlot::A => 0,
            BufferSlot::B => 1,
        }
    }

    /// The other slot.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            BufferSlot::A => BufferSlot::B,
            BufferSlot::B => BufferSlot::A,
        }
    }
}

/// Rows covered by the seeded sand band for a grid of `height` rows.
///
/// The band sits directly below the top row, which stays empty. It is
/// clamped to the rows available.
#[must_use]
pub fn seed_band_rows(height: u32, band_rows: u32) -> std::ops::Range<u32> {
    let top = height.saturating_sub(1);
    top.saturating_sub(band_rows)..top
}

/// Builds the deterministic initial generation: all `None` except a
/// horizontal band of `Sand` near the top.
#[must_use]
pub fn seeded_generation(dims: GridDims, band_rows: u32) -> Vec<u32> {
    let empty = Cell::EMPTY.pack();
    let sand = Cell::of(Material::Sand).pack();
    let band = seed_band_rows(dims.height, band_rows);

    let mut cells = vec![empty; dims.cell_count()];
    for y in band {
        let start = dims.index(0, y);
        cells[start..start + dims.width as usize].fill(sand);
    }
    cells
}

/// Double-buffered simulation surface.
#[derive(Debug)]
pub struct Grid<B> {
    /// Two-slot arena
    buffers: [B; 2],
    /// Slot holding the latest complete generation
    current: BufferSlot,
    /// Grid dimensions
    dims: GridDims,
    /// Height of the seeded band
    band_rows: u32,
}

impl<B> Grid<B> {
    /// Allocates both buffers through `kernel`, each holding the seeded
    /// generation, with slot A current.
    pub fn initialize<K>(kernel: &mut K, dims: GridDims, band_rows: u32) -> SimResult<Self>
    where
        K: ComputeKernel<Buffer = B>,
    {
        if dims.is_empty() {
            return Err(SimError::InvalidDimensions {
                width: dims.width,
                height: dims.height,
            });
        }

        info!(
            "Creating double-buffered grid ({}x{} = {} cells, {} seed row(s))",
            dims.width,
            dims.height,
            dims.cell_count(),
            band_rows
        );

        let cells = seeded_generation(dims, band_rows);
        let buffer_a = kernel.create_buffer("Cell Buffer A", &cells)?;
        let buffer_b = kernel.create_buffer("Cell Buffer B", &cells)?;

        Ok(Self {
            buffers: [buffer_a, buffer_b],
            current: BufferSlot::A,
            dims,
            band_rows,
        })
    }

    /// Buffer holding the latest complete generation. Safe to render.
    #[must_use]
    pub fn current_buffer(&self) -> &B {
        &self.buffers[self.current.index()]
    }

    /// Slot of the current buffer.
    #[must_use]
    pub const fn current_slot(&self) -> BufferSlot {
        self.current
    }

    /// Grid dimensions.
    #[must_use]
    pub const fn dims(&self) -> GridDims {
        self.dims
    }

    /// Total number of cells per generation.
    #[must_use]
    pub const fn cell_count(&self) -> usize {
        self.dims.cell_count()
    }

    /// Current generation for reading, and the other buffer for writing.
    pub(crate) fn split(&mut self) -> (&B, &mut B) {
        let [a, b] = &mut self.buffers;
        match self.current {
            BufferSlot::A => (&*a, b),
            BufferSlot::B => (&*b, a),
        }
    }

    /// Publishes the buffer just written as current.
    ///
    /// Only valid after the kernel's completion barrier for the step.
    pub(crate) fn swap(&mut self) {
        self.current = self.current.other();
    }

    /// Writes the seeded generation into both buffers and makes slot A current.
    pub(crate) fn reseed<K>(&mut self, kernel: &mut K) -> KernelResult<()>
    where
        K: ComputeKernel<Buffer = B>,
    {
        let cells = seeded_generation(self.dims, self.band_rows);
        for buffer in &mut self.buffers {
            kernel.write_buffer(buffer, &cells)?;
        }
        self.current = BufferSlot::A;
        Ok(())
    }
}
