//! Simulation orchestration: one discrete step at a time.
//!
//! [`Simulation`] owns the kernel, the double-buffered grid, and the
//! modification queue. A step drains the queue, runs the kernel over the
//! whole grid, waits for completion, and only then publishes the new
//! generation by swapping buffers.

use sandfall_common::{GridDims, QueueError, SimResult};
use tracing::{debug, info, warn};

use crate::compute::{ComputeKernel, KernelInput};
use crate::grid::{BufferSlot, Grid, DEFAULT_SEED_BAND_ROWS};
use crate::modification::{Modification, ModificationQueue, DEFAULT_MAX_MODIFICATIONS};

/// Construction parameters of a simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationParams {
    /// Grid dimensions
    pub dims: GridDims,
    /// Height of the seeded sand band
    pub seed_band_rows: u32,
    /// Modification queue capacity
    pub max_modifications: usize,
}

impl SimulationParams {
    /// Parameters for a grid with default seeding and queue capacity.
    #[must_use]
    pub const fn new(dims: GridDims) -> Self {
        Self {
            dims,
            seed_band_rows: DEFAULT_SEED_BAND_ROWS,
            max_modifications: DEFAULT_MAX_MODIFICATIONS,
        }
    }
}

/// Summary of one completed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    /// Generations completed, including this one
    pub generation: u64,
    /// Modifications handed to the kernel
    pub modifications: usize,
    /// Slot now holding the published generation
    pub current: BufferSlot,
}

/// A running simulation.
pub struct Simulation<K: ComputeKernel> {
    kernel: K,
    grid: Grid<K::Buffer>,
    modifications: ModificationQueue,
    generation: u64,
}

impl<K: ComputeKernel> Simulation<K> {
    /// Seeds a new grid and takes ownership of `kernel`.
    pub fn new(mut kernel: K, params: SimulationParams) -> SimResult<Self> {
        let grid = Grid::initialize(&mut kernel, params.dims, params.seed_band_rows)?;
        info!(
            "Simulation ready ({}x{}, queue capacity {})",
            params.dims.width, params.dims.height, params.max_modifications
        );
        Ok(Self {
            kernel,
            grid,
            modifications: ModificationQueue::new(params.max_modifications),
            generation: 0,
        })
    }

    /// Queues an edit for the next step.
    pub fn enqueue(&self, modification: Modification) -> Result<(), QueueError> {
        self.modifications.enqueue(modification)
    }

    /// Advances the simulation by one generation.
    ///
    /// On a kernel error the buffers are not swapped, so the current buffer
    /// still holds the last complete generation. The drained modifications
    /// are dropped either way.
    pub fn step(&mut self) -> SimResult<StepReport> {
        let snapshot = self.modifications.drain_for_step();
        let dims = self.grid.dims();
        let generation = self.generation;

        let (previous, next) = self.grid.split();
        let input = KernelInput {
            previous,
            dims,
            modifications: &snapshot,
            generation,
        };
        if let Err(e) = self.kernel.dispatch(input, next) {
            warn!(
                "Step {} failed, {} modification(s) dropped: {e}",
                generation + 1,
                snapshot.len()
            );
            return Err(e.into());
        }

        self.grid.swap();
        self.generation += 1;

        debug!(
            generation = self.generation,
            modifications = snapshot.len(),
            "step complete"
        );

        Ok(StepReport {
            generation: self.generation,
            modifications: snapshot.len(),
            current: self.grid.current_slot(),
        })
    }

    /// Restores the seeded generation and discards pending edits.
    pub fn reset(&mut self) -> SimResult<()> {
        self.modifications.clear();
        self.grid.reseed(&mut self.kernel)?;
        self.generation = 0;
        info!("Simulation reset to seeded generation");
        Ok(())
    }

    /// Copies the current generation back to the host.
    pub fn read_current(&mut self) -> SimResult<Vec<u32>> {
        Ok(self.kernel.read_buffer(self.grid.current_buffer())?)
    }

    /// The double-buffered grid.
    #[must_use]
    pub const fn grid(&self) -> &Grid<K::Buffer> {
        &self.grid
    }

    /// Pending modifications.
    #[must_use]
    pub const fn modifications(&self) -> &ModificationQueue {
        &self.modifications
    }

    /// Generations completed since start or reset.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// The compute kernel.
    #[must_use]
    pub const fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Grid dimensions.
    #[must_use]
    pub const fn dims(&self) -> GridDims {
        self.grid.dims()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Cell, Material};
    use crate::grid::seeded_generation;
    use crate::host::HostKernel;
    use crate::modification::BrushShape;
    use sandfall_common::{GridPos, KernelError, KernelResult, SimError};

    /// Host kernel that records what it was handed and can be told to fail.
    #[derive(Default)]
    struct RecordingKernel {
        inner: HostKernel,
        seen: Vec<(u64, Vec<Modification>)>,
        fail_next: bool,
    }

    impl ComputeKernel for RecordingKernel {
        type Buffer = Vec<u32>;

        fn create_buffer(&mut self, label: &str, cells: &[u32]) -> KernelResult<Vec<u32>> {
            self.inner.create_buffer(label, cells)
        }

        fn write_buffer(&mut self, buffer: &mut Vec<u32>, cells: &[u32]) -> KernelResult<()> {
            self.inner.write_buffer(buffer, cells)
        }

        fn dispatch(&mut self, input: KernelInput<'_, Vec<u32>>, next: &mut Vec<u32>) -> KernelResult<()> {
            self.seen
                .push((input.generation, input.modifications.to_vec()));
            if std::mem::take(&mut self.fail_next) {
                next.fill(0xFFFF_FFFF);
                return Err(KernelError::OutOfMemory("test".into()));
            }
            self.inner.dispatch(input, next)
        }

        fn read_buffer(&mut self, buffer: &Vec<u32>) -> KernelResult<Vec<u32>> {
            self.inner.read_buffer(buffer)
        }
    }

    fn simulation(width: u32, height: u32) -> Simulation<RecordingKernel> {
        Simulation::new(
            RecordingKernel::default(),
            SimulationParams::new(GridDims::new(width, height)),
        )
        .expect("simulation")
    }

    #[test]
    fn test_initial_render_shows_seed() {
        let sim = simulation(10, 10);
        assert_eq!(
            sim.grid().current_buffer(),
            &seeded_generation(GridDims::new(10, 10), 1)
        );
        assert_eq!(sim.generation(), 0);
    }

    #[test]
    fn test_single_modification_reaches_kernel() {
        let mut sim = simulation(10, 10);
        let edit = Modification::new(GridPos::new(5, 5), 1.0, BrushShape::Circle, Material::Water);
        sim.enqueue(edit).expect("enqueue");

        let report = sim.step().expect("step");
        assert_eq!(report.generation, 1);
        assert_eq!(report.modifications, 1);

        let (generation, mods) = &sim.kernel().seen[0];
        assert_eq!(*generation, 0);
        assert_eq!(mods.len(), 1);
        assert_eq!(mods[0].pos, GridPos::new(5, 5));
        assert!((mods[0].radius - 1.0).abs() < f32::EPSILON);
        assert_eq!(mods[0].shape, BrushShape::Circle);
        assert_eq!(mods[0].material, Material::Water);
        assert!(sim.modifications().is_empty());

        let cells = sim.grid().current_buffer();
        let centre = Cell::unpack(cells[GridDims::new(10, 10).index(5, 5)]).expect("valid");
        assert_eq!(centre.material(), Material::Water);
    }

    #[test]
    fn test_modifications_only_visible_to_one_step() {
        let mut sim = simulation(8, 8);
        sim.enqueue(Modification::new(GridPos::new(1, 1), 0.0, BrushShape::Square, Material::Sand))
            .expect("enqueue");
        sim.step().expect("step");
        sim.step().expect("step");

        assert_eq!(sim.kernel().seen[0].1.len(), 1);
        assert!(sim.kernel().seen[1].1.is_empty());
    }

    #[test]
    fn test_enqueue_order_preserved() {
        let mut sim = simulation(8, 8);
        for x in 0..4 {
            sim.enqueue(Modification::new(GridPos::new(x, 0), 0.0, BrushShape::Circle, Material::Sand))
                .expect("enqueue");
        }
        sim.step().expect("step");
        let xs: Vec<i32> = sim.kernel().seen[0].1.iter().map(|m| m.pos.x).collect();
        assert_eq!(xs, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_swap_parity() {
        let mut sim = simulation(6, 6);
        let initial = sim.grid().current_buffer().as_ptr();
        for n in 1..=6u64 {
            let report = sim.step().expect("step");
            let same = sim.grid().current_buffer().as_ptr() == initial;
            assert_eq!(same, n % 2 == 0, "after {n} steps");
            assert_eq!(report.current, sim.grid().current_slot());
        }
    }

    #[test]
    fn test_kernel_failure_skips_swap() {
        let mut sim = simulation(6, 6);
        sim.step().expect("step");
        let before = sim.grid().current_buffer().clone();
        let slot = sim.grid().current_slot();

        sim.enqueue(Modification::new(GridPos::new(2, 2), 1.0, BrushShape::Circle, Material::Sand))
            .expect("enqueue");
        sim.kernel.fail_next = true;
        let result = sim.step();

        assert!(matches!(
            result,
            Err(SimError::Kernel(KernelError::OutOfMemory(_)))
        ));
        assert_eq!(sim.grid().current_slot(), slot);
        assert_eq!(sim.grid().current_buffer(), &before);
        assert_eq!(sim.generation(), 1);
        assert!(sim.modifications().is_empty());

        // The next step proceeds from the last complete generation
        sim.step().expect("step");
        assert_eq!(sim.generation(), 2);
        assert_ne!(sim.grid().current_slot(), slot);
    }

    #[test]
    fn test_seed_band_falls_through_steps() {
        let dims = GridDims::new(4, 10);
        let mut sim = Simulation::new(HostKernel::new(), SimulationParams::new(dims)).expect("sim");
        let sand = Cell::of(Material::Sand).pack();

        sim.step().expect("step");
        let cells = sim.read_current().expect("read");
        assert!((0..4).all(|x| cells[dims.index(x, 7)] == sand));
        assert!((0..4).all(|x| cells[dims.index(x, 8)] == 0));

        for _ in 0..20 {
            sim.step().expect("step");
        }
        let cells = sim.read_current().expect("read");
        assert!((0..4).all(|x| cells[dims.index(x, 0)] == sand));
        assert_eq!(cells.iter().filter(|&&c| c == sand).count(), 4);
    }

    #[test]
    fn test_reset() {
        let dims = GridDims::new(5, 5);
        let mut sim = Simulation::new(HostKernel::new(), SimulationParams::new(dims)).expect("sim");
        sim.step().expect("step");
        sim.enqueue(Modification::new(GridPos::new(0, 0), 1.0, BrushShape::Circle, Material::Water))
            .expect("enqueue");

        sim.reset().expect("reset");
        assert_eq!(sim.generation(), 0);
        assert!(sim.modifications().is_empty());
        assert_eq!(sim.grid().current_slot(), BufferSlot::A);
        assert_eq!(sim.read_current().expect("read"), seeded_generation(dims, 1));
    }

    #[test]
    fn test_queue_capacity_from_params() {
        let params = SimulationParams {
            max_modifications: 1,
            ..SimulationParams::new(GridDims::new(4, 4))
        };
        let sim = Simulation::new(HostKernel::new(), params).expect("sim");
        let edit = Modification::new(GridPos::new(0, 0), 1.0, BrushShape::Circle, Material::Sand);
        assert!(sim.enqueue(edit).is_ok());
        assert_eq!(
            sim.enqueue(edit),
            Err(QueueError::CapacityExceeded { capacity: 1 })
        );
    }
}
