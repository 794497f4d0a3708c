//! Compute kernel contract and the wgpu implementation.
//!
//! A kernel turns one generation into the next: it reads the previous
//! buffer, applies the modification snapshot, and writes every cell of the
//! next buffer exactly once. [`ComputeKernel::dispatch`] returns only after
//! those writes are complete and visible.

use std::sync::{mpsc, Arc};

use bytemuck::{Pod, Zeroable};
use glam::UVec2;
use sandfall_common::{GridDims, KernelError, KernelResult};
use tracing::{debug, info};
use wgpu::{util::DeviceExt, Buffer, BufferUsages, Device, Queue};

use crate::modification::{GpuModification, Modification, DEFAULT_MAX_MODIFICATIONS};

/// Default workgroup tile size (cells per workgroup on each axis).
pub const DEFAULT_TILE_SIZE: UVec2 = UVec2::new(16, 16);

/// Everything a kernel needs to compute one generation.
#[derive(Debug)]
pub struct KernelInput<'a, B> {
    /// Previous generation
    pub previous: &'a B,
    /// Grid dimensions
    pub dims: GridDims,
    /// Modifications to apply this step, in enqueue order
    pub modifications: &'a [Modification],
    /// Number of generations completed before this step
    pub generation: u64,
}

/// A per-cell transition function run over the whole grid once per step.
///
/// The kernel allocates the cell buffers it operates on, so the grid can
/// hold them without knowing where they live.
pub trait ComputeKernel {
    /// Storage for one generation of packed cells.
    type Buffer;

    /// Allocates a buffer initialised with `cells`.
    fn create_buffer(&mut self, label: &str, cells: &[u32]) -> KernelResult<Self::Buffer>;

    /// Overwrites a buffer with `cells`.
    fn write_buffer(&mut self, buffer: &mut Self::Buffer, cells: &[u32]) -> KernelResult<()>;

    /// Computes the next generation into `next` and waits for completion.
    fn dispatch(
        &mut self,
        input: KernelInput<'_, Self::Buffer>,
        next: &mut Self::Buffer,
    ) -> KernelResult<()>;

    /// Copies a buffer back to the host.
    fn read_buffer(&mut self, buffer: &Self::Buffer) -> KernelResult<Vec<u32>>;
}

/// Per-step uniform block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct StepParams {
    /// Grid width in cells
    pub width: u32,
    /// Grid height in cells
    pub height: u32,
    /// Number of valid entries in the modification buffer
    pub modification_count: u32,
    /// Generation counter (seeds colour variation)
    pub generation: u32,
}

/// WGSL source of the step kernel. `{{TILE_X}}`/`{{TILE_Y}}` are replaced
/// with the configured workgroup size before compilation.
const STEP_SHADER: &str = r"
struct StepParams {
    width: u32,
    height: u32,
    modification_count: u32,
    generation: u32,
}

struct Modification {
    x: i32,
    y: i32,
    radius: f32,
    shape: u32,
    material: u32,
}

const MATERIAL_MASK: u32 = 0xFu;
const VARIATION_MASK: u32 = 0xFu;
const VARIATION_SHIFT: u32 = 4u;

const MAT_NONE: u32 = 0u;
const MAT_SAND: u32 = 1u;
const MAT_WATER: u32 = 2u;

const SHAPE_CIRCLE: u32 = 0u;

@group(0) @binding(0) var<storage, read> previous: array<u32>;
@group(0) @binding(1) var<storage, read_write> next: array<u32>;
@group(0) @binding(2) var<storage, read> modifications: array<Modification>;
@group(0) @binding(3) var<uniform> params: StepParams;

fn cell_at(x: u32, y: u32) -> u32 {
    return previous[y * params.width + x];
}

fn is_empty(cell: u32) -> bool {
    return (cell & MATERIAL_MASK) == MAT_NONE;
}

fn falls(cell: u32) -> bool {
    let material = cell & MATERIAL_MASK;
    return material == MAT_SAND || material == MAT_WATER;
}

// Must match host::variation
fn variation(x: u32, y: u32, generation: u32) -> u32 {
    var h = x * 374761393u + y * 668265263u + generation * 2246822519u;
    h = (h ^ (h >> 13u)) * 1274126177u;
    h = h ^ (h >> 16u);
    return h & VARIATION_MASK;
}

fn covers(m: Modification, x: u32, y: u32) -> bool {
    // Must match Modification::covers
    let dx = f32(x) - f32(m.x);
    let dy = f32(y) - f32(m.y);
    if m.shape == SHAPE_CIRCLE {
        return dx * dx + dy * dy <= m.radius * m.radius;
    }
    return abs(dx) <= m.radius && abs(dy) <= m.radius;
}

@compute @workgroup_size({{TILE_X}}, {{TILE_Y}}, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if id.x >= params.width || id.y >= params.height {
        return;
    }
    let x = id.x;
    let y = id.y;

    let current = cell_at(x, y);
    var out = current;
    if is_empty(current) {
        if y + 1u < params.height {
            let above = cell_at(x, y + 1u);
            if falls(above) {
                out = above;
            }
        }
    } else if falls(current) && y > 0u {
        if is_empty(cell_at(x, y - 1u)) {
            out = 0u;
        }
    }

    for (var i = 0u; i < params.modification_count; i = i + 1u) {
        let m = modifications[i];
        if covers(m, x, y) {
            var v = 0u;
            if m.material != MAT_NONE {
                v = variation(x, y, params.generation);
            }
            out = (m.material & MATERIAL_MASK) | (v << VARIATION_SHIFT);
        }
    }

    next[y * params.width + x] = out;
}
";

/// Returns the step kernel source specialised for a workgroup tile size.
#[must_use]
pub fn step_shader_source(tile: UVec2) -> String {
    STEP_SHADER
        .replace("{{TILE_X}}", &tile.x.max(1).to_string())
        .replace("{{TILE_Y}}", &tile.y.max(1).to_string())
}

/// Configuration of the GPU kernel.
#[derive(Debug, Clone, Copy)]
pub struct GpuKernelConfig {
    /// Workgroup tile size
    pub tile: UVec2,
    /// Capacity of the modification buffer
    pub max_modifications: usize,
}

impl Default for GpuKernelConfig {
    fn default() -> Self {
        Self {
            tile: DEFAULT_TILE_SIZE,
            max_modifications: DEFAULT_MAX_MODIFICATIONS,
        }
    }
}

/// GPU compute pipeline for the cell step.
pub struct GpuKernel {
    device: Arc<Device>,
    queue: Arc<Queue>,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    /// Modification snapshot for the current step
    modification_buffer: Buffer,
    /// Step uniform block
    params_buffer: Buffer,
    config: GpuKernelConfig,
}

impl GpuKernel {
    /// Compiles the step kernel and allocates its per-step buffers.
    pub fn new(device: Arc<Device>, queue: Arc<Queue>, config: GpuKernelConfig) -> KernelResult<Self> {
        info!(
            "Creating step kernel (tile {}x{}, {} modifications max)",
            config.tile.x, config.tile.y, config.max_modifications
        );

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Step Kernel Shader"),
            source: wgpu::ShaderSource::Wgsl(step_shader_source(config.tile).into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Step Kernel Bind Group Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, false),
                storage_entry(2, true),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Step Kernel Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Step Kernel Pipeline"),
            layout: Some(&layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(KernelError::Validation(error.to_string()));
        }

        let capacity = config.max_modifications.max(1);
        let modification_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Modification Buffer"),
            size: (capacity * std::mem::size_of::<GpuModification>()) as u64,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Step Params Buffer"),
            contents: bytemuck::bytes_of(&StepParams::default()),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        });

        info!("Step kernel created");

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            modification_buffer,
            params_buffer,
            config: GpuKernelConfig {
                max_modifications: capacity,
                ..config
            },
        })
    }

    /// Kernel configuration.
    #[must_use]
    pub const fn config(&self) -> &GpuKernelConfig {
        &self.config
    }

    /// The device the kernel runs on.
    #[must_use]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Submits recorded work and blocks until the device has finished it.
    fn submit_and_wait(&self, encoder: wgpu::CommandEncoder) {
        let index = self.queue.submit(std::iter::once(encoder.finish()));
        let _ = self.device.poll(wgpu::Maintain::wait_for(index));
    }
}

impl ComputeKernel for GpuKernel {
    type Buffer = Buffer;

    fn create_buffer(&mut self, label: &str, cells: &[u32]) -> KernelResult<Buffer> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(cells),
                usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC | BufferUsages::COPY_DST,
            });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(KernelError::BufferAlloc(error.to_string()));
        }
        debug!("Allocated {label} ({} cells)", cells.len());
        Ok(buffer)
    }

    fn write_buffer(&mut self, buffer: &mut Buffer, cells: &[u32]) -> KernelResult<()> {
        let expected = buffer.size() as usize / std::mem::size_of::<u32>();
        if cells.len() != expected {
            return Err(KernelError::SizeMismatch {
                expected,
                actual: cells.len(),
            });
        }
        self.queue
            .write_buffer(buffer, 0, bytemuck::cast_slice(cells));
        Ok(())
    }

    fn dispatch(&mut self, input: KernelInput<'_, Buffer>, next: &mut Buffer) -> KernelResult<()> {
        let count = input.modifications.len();
        if count > self.config.max_modifications {
            return Err(KernelError::TooManyModifications {
                count,
                capacity: self.config.max_modifications,
            });
        }

        let params = StepParams {
            width: input.dims.width,
            height: input.dims.height,
            modification_count: count as u32,
            generation: input.generation as u32,
        };
        self.queue
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));
        if count > 0 {
            let snapshot: Vec<GpuModification> =
                input.modifications.iter().map(Modification::to_gpu).collect();
            self.queue
                .write_buffer(&self.modification_buffer, 0, bytemuck::cast_slice(&snapshot));
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Step Kernel Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: input.previous.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: next.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.modification_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.params_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Step Kernel Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Step Kernel Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            let groups = input.dims.workgroups(self.config.tile);
            pass.dispatch_workgroups(groups.x, groups.y, 1);
        }

        // Completion barrier: the next buffer is fully written once this returns
        self.submit_and_wait(encoder);

        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        if let Some(error) = out_of_memory {
            return Err(KernelError::OutOfMemory(error.to_string()));
        }
        if let Some(error) = validation {
            return Err(KernelError::Dispatch(error.to_string()));
        }
        Ok(())
    }

    fn read_buffer(&mut self, buffer: &Buffer) -> KernelResult<Vec<u32>> {
        let size = buffer.size();
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Cell Readback Buffer"),
            size,
            usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Cell Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        self.submit_and_wait(encoder);

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);

        match rx.recv() {
            Ok(Ok(())) => {},
            Ok(Err(e)) => return Err(KernelError::Readback(e.to_string())),
            Err(e) => return Err(KernelError::Readback(e.to_string())),
        }

        let cells = {
            let data = slice.get_mapped_range();
            bytemuck::cast_slice::<u8, u32>(&data).to_vec()
        };
        staging.unmap();
        Ok(cells)
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_params_size() {
        // Uniform blocks must be 16-byte aligned
        assert_eq!(std::mem::size_of::<StepParams>(), 16);
    }

    #[test]
    fn test_shader_tile_substitution() {
        let source = step_shader_source(UVec2::new(8, 4));
        assert!(source.contains("@workgroup_size(8, 4, 1)"));
        assert!(!source.contains("{{TILE_X}}"));

        let clamped = step_shader_source(UVec2::ZERO);
        assert!(clamped.contains("@workgroup_size(1, 1, 1)"));
    }

    #[test]
    fn test_shader_constants_match_layout() {
        use crate::cell::{MATERIAL_BITS, MATERIAL_MASK};
        use crate::modification::BrushShape;

        assert!(STEP_SHADER.contains(&format!("MATERIAL_MASK: u32 = 0x{MATERIAL_MASK:X}u")));
        assert!(STEP_SHADER.contains(&format!("VARIATION_SHIFT: u32 = {MATERIAL_BITS}u")));
        assert!(STEP_SHADER.contains(&format!(
            "SHAPE_CIRCLE: u32 = {}u",
            BrushShape::Circle as u32
        )));
    }

    #[test]
    fn test_default_config() {
        let config = GpuKernelConfig::default();
        assert_eq!(config.tile, UVec2::new(16, 16));
        assert_eq!(config.max_modifications, DEFAULT_MAX_MODIFICATIONS);
    }
}
