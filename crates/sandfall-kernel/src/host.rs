//! CPU implementation of the step kernel.
//!
//! Runs the same rule set as the WGSL kernel, one rayon task per row, so the
//! orchestration can be exercised without a GPU device.

use rayon::prelude::*;
use sandfall_common::{GridDims, KernelError, KernelResult};
use tracing::trace;

use crate::cell::{material_bits, Material, MATERIAL_BITS};
use crate::compute::{ComputeKernel, KernelInput};
use crate::modification::Modification;

/// Colour variation index for a freshly painted cell.
///
/// Bit-identical to `variation` in the WGSL step kernel.
#[must_use]
pub fn variation(x: u32, y: u32, generation: u32) -> u32 {
    let mut h = x
        .wrapping_mul(374_761_393)
        .wrapping_add(y.wrapping_mul(668_265_263))
        .wrapping_add(generation.wrapping_mul(2_246_822_519));
    h = (h ^ (h >> 13)).wrapping_mul(1_274_126_177);
    h ^= h >> 16;
    h & 0xF
}

fn is_empty(cell: u32) -> bool {
    material_bits(cell) == Material::None.id()
}

fn falls(cell: u32) -> bool {
    let material = material_bits(cell);
    material == Material::Sand.id() || material == Material::Water.id()
}

/// Computes one output cell from the previous generation.
#[must_use]
pub fn next_cell(
    previous: &[u32],
    dims: GridDims,
    x: u32,
    y: u32,
    modifications: &[Modification],
    generation: u32,
) -> u32 {
    let current = previous[dims.index(x, y)];
    let mut out = current;
    if is_empty(current) {
        if y + 1 < dims.height {
            let above = previous[dims.index(x, y + 1)];
            if falls(above) {
                out = above;
            }
        }
    } else if falls(current) && y > 0 && is_empty(previous[dims.index(x, y - 1)]) {
        out = 0;
    }

    for m in modifications {
        if m.covers(x as i32, y as i32) {
            let v = if m.material == Material::None {
                0
            } else {
                variation(x, y, generation)
            };
            out = m.material.id() | (v << MATERIAL_BITS);
        }
    }
    out
}

/// Host-memory kernel. Buffers are plain `Vec<u32>`.
#[derive(Debug, Default)]
pub struct HostKernel {
    dispatches: u64,
}

impl HostKernel {
    /// Creates a host kernel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed dispatches.
    #[must_use]
    pub const fn dispatches(&self) -> u64 {
        self.dispatches
    }
}

impl ComputeKernel for HostKernel {
    type Buffer = Vec<u32>;

    fn create_buffer(&mut self, _label: &str, cells: &[u32]) -> KernelResult<Vec<u32>> {
        Ok(cells.to_vec())
    }

    fn write_buffer(&mut self, buffer: &mut Vec<u32>, cells: &[u32]) -> KernelResult<()> {
        if buffer.len() != cells.len() {
            return Err(KernelError::SizeMismatch {
                expected: buffer.len(),
                actual: cells.len(),
            });
        }
        buffer.copy_from_slice(cells);
        Ok(())
    }

    fn dispatch(&mut self, input: KernelInput<'_, Vec<u32>>, next: &mut Vec<u32>) -> KernelResult<()> {
        let dims = input.dims;
        let expected = dims.cell_count();
        if input.previous.len() != expected || next.len() != expected {
            return Err(KernelError::SizeMismatch {
                expected,
                actual: next.len().min(input.previous.len()),
            });
        }

        if expected == 0 {
            return Ok(());
        }

        let previous = input.previous.as_slice();
        let modifications = input.modifications;
        let generation = input.generation as u32;

        // Every row is written by exactly one task; par_chunks_mut joins before returning
        next.par_chunks_mut(dims.width as usize)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, cell) in row.iter_mut().enumerate() {
                    *cell = next_cell(previous, dims, x as u32, y as u32, modifications, generation);
                }
            });

        self.dispatches += 1;
        trace!(
            generation,
            modifications = modifications.len(),
            "host kernel dispatch"
        );
        Ok(())
    }

    fn read_buffer(&mut self, buffer: &Vec<u32>) -> KernelResult<Vec<u32>> {
        Ok(buffer.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use crate::modification::BrushShape;
    use sandfall_common::GridPos;

    const SAND: u32 = Cell::of(Material::Sand).pack();

    fn run(kernel: &mut HostKernel, dims: GridDims, previous: &[u32], mods: &[Modification]) -> Vec<u32> {
        let previous = previous.to_vec();
        let mut next = vec![0xDEAD_BEEF; dims.cell_count()];
        kernel
            .dispatch(
                KernelInput {
                    previous: &previous,
                    dims,
                    modifications: mods,
                    generation: 0,
                },
                &mut next,
            )
            .expect("dispatch");
        next
    }

    #[test]
    fn test_every_cell_written() {
        let dims = GridDims::new(7, 5);
        let mut kernel = HostKernel::new();
        let next = run(&mut kernel, dims, &vec![0; dims.cell_count()], &[]);
        assert!(next.iter().all(|&c| c == 0));
        assert_eq!(kernel.dispatches(), 1);
    }

    #[test]
    fn test_sand_falls_one_row() {
        let dims = GridDims::new(3, 4);
        let mut cells = vec![0; dims.cell_count()];
        cells[dims.index(1, 2)] = SAND;

        let mut kernel = HostKernel::new();
        let next = run(&mut kernel, dims, &cells, &[]);
        assert_eq!(next[dims.index(1, 2)], 0);
        assert_eq!(next[dims.index(1, 1)], SAND);
        assert_eq!(next.iter().filter(|&&c| c == SAND).count(), 1);
    }

    #[test]
    fn test_sand_rests_on_floor_and_stacks() {
        let dims = GridDims::new(1, 3);
        let cells = vec![SAND, SAND, 0];
        let mut kernel = HostKernel::new();
        let next = run(&mut kernel, dims, &cells, &[]);
        assert_eq!(next, vec![SAND, SAND, 0]);
    }

    #[test]
    fn test_modifications_apply_in_order() {
        let dims = GridDims::new(5, 5);
        let center = GridPos::new(2, 2);
        let mods = [
            Modification::new(center, 1.0, BrushShape::Square, Material::Water),
            Modification::new(center, 0.0, BrushShape::Circle, Material::None),
        ];
        let mut kernel = HostKernel::new();
        let next = run(&mut kernel, dims, &vec![0; dims.cell_count()], &mods);

        assert_eq!(next[dims.index(2, 2)], 0);
        let corner = Cell::unpack(next[dims.index(1, 1)]).expect("valid cell");
        assert_eq!(corner.material(), Material::Water);
        assert_eq!(next[dims.index(0, 0)], 0);
    }

    #[test]
    fn test_modification_clipped_at_edges() {
        let dims = GridDims::new(4, 4);
        let mods = [Modification::new(GridPos::new(-1, -1), 1.5, BrushShape::Square, Material::Sand)];
        let mut kernel = HostKernel::new();
        let next = run(&mut kernel, dims, &vec![0; dims.cell_count()], &mods);
        assert_eq!(material_bits(next[dims.index(0, 0)]), Material::Sand.id());
        assert_eq!(next[dims.index(1, 1)], 0);
    }

    #[test]
    fn test_extreme_brush_centre_is_ignored() {
        let dims = GridDims::new(6, 6);
        let mods = [
            Modification::new(GridPos::new(i32::MIN, 0), 8.0, BrushShape::Circle, Material::Sand),
            Modification::new(GridPos::new(0, i32::MAX), 8.0, BrushShape::Square, Material::Water),
        ];
        let mut kernel = HostKernel::new();
        let next = run(&mut kernel, dims, &vec![0; dims.cell_count()], &mods);
        assert!(next.iter().all(|&c| c == 0));
    }

    #[test]
    fn test_size_mismatch_is_an_error() {
        let dims = GridDims::new(4, 4);
        let previous = vec![0; 15];
        let mut next = vec![0; 16];
        let mut kernel = HostKernel::new();
        let result = kernel.dispatch(
            KernelInput {
                previous: &previous,
                dims,
                modifications: &[],
                generation: 0,
            },
            &mut next,
        );
        assert!(matches!(result, Err(KernelError::SizeMismatch { .. })));
        assert_eq!(kernel.dispatches(), 0);
    }

    #[test]
    fn test_variation_in_range_and_deterministic() {
        for x in 0..32 {
            for y in 0..32 {
                let v = variation(x, y, 7);
                assert!(v <= 0xF);
                assert_eq!(v, variation(x, y, 7));
            }
        }
    }
}
