//! Cell rendering pipeline for visualizing simulation state.
//!
//! Draws the current generation as a full-screen triangle. The fragment
//! shader maps each pixel to a grid cell, looks the material up in a small
//! palette, and darkens or lightens it by the cell's variation index. Grid
//! row 0 is the bottom of the screen.

use bytemuck::{Pod, Zeroable};
use sandfall_common::GridDims;
use tracing::info;
use wgpu::{util::DeviceExt, Device};

use crate::cell::{Material, MATERIAL_BITS, MATERIAL_MASK, MAX_VARIATION};

/// Spread of the variation shading around the base colour.
pub const VARIATION_SHADE: f32 = 0.3;

/// Material color mapping for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct MaterialColor {
    /// Red component (0.0-1.0 range)
    pub r: f32,
    /// Green component (0.0-1.0 range)
    pub g: f32,
    /// Blue component (0.0-1.0 range)
    pub b: f32,
    /// Alpha component (0.0-1.0 range)
    pub a: f32,
}

impl MaterialColor {
    /// Creates a color from RGB bytes (0-255).
    #[must_use]
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: f32::from(r) / 255.0,
            g: f32::from(g) / 255.0,
            b: f32::from(b) / 255.0,
            a: 1.0,
        }
    }
}

/// Base colour of every material, indexed by material id.
#[must_use]
pub fn material_palette() -> Vec<MaterialColor> {
    Material::ALL
        .iter()
        .map(|material| match material {
            Material::None => MaterialColor::from_rgb(12, 12, 20),
            Material::Sand => MaterialColor::from_rgb(194, 178, 128),
            Material::Water => MaterialColor::from_rgb(64, 164, 223),
        })
        .collect()
}

/// Render parameters for the cell render shader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct RenderParams {
    /// Grid width in cells
    pub grid_width: u32,
    /// Grid height in cells
    pub grid_height: u32,
    /// Uniform buffers need 16-byte multiples
    pub _padding: [u32; 2],
}

impl RenderParams {
    /// Creates new render parameters.
    #[must_use]
    pub const fn new(dims: GridDims) -> Self {
        Self {
            grid_width: dims.width,
            grid_height: dims.height,
            _padding: [0; 2],
        }
    }
}

/// Cell render shader in WGSL. The `{{...}}` placeholders are filled in by
/// [`render_shader_source`].
const CELL_RENDER_SHADER: &str = r"
struct MaterialColor {
    r: f32,
    g: f32,
    b: f32,
    a: f32,
}

struct RenderParams {
    grid_width: u32,
    grid_height: u32,
    _padding: vec2<u32>,
}

const MATERIAL_MASK: u32 = {{MATERIAL_MASK}}u;
const VARIATION_SHIFT: u32 = {{VARIATION_SHIFT}}u;
const VARIATION_MAX: f32 = {{VARIATION_MAX}};
const VARIATION_SHADE: f32 = {{VARIATION_SHADE}};

@group(0) @binding(0) var<storage, read> cells: array<u32>;
@group(0) @binding(1) var<storage, read> colors: array<MaterialColor>;
@group(0) @binding(2) var<uniform> params: RenderParams;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

// Fullscreen triangle
@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var out: VertexOutput;

    let x = f32(i32(vertex_index & 1u) * 4 - 1);
    let y = f32(i32(vertex_index >> 1u) * 4 - 1);

    out.position = vec4<f32>(x, y, 0.0, 1.0);
    out.uv = vec2<f32>((x + 1.0) * 0.5, (1.0 - y) * 0.5);

    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let cell_x = min(u32(in.uv.x * f32(params.grid_width)), params.grid_width - 1u);
    let row = min(u32(in.uv.y * f32(params.grid_height)), params.grid_height - 1u);
    let cell_y = params.grid_height - 1u - row;

    let cell = cells[cell_y * params.grid_width + cell_x];
    let material = cell & MATERIAL_MASK;
    let color_idx = min(material, arrayLength(&colors) - 1u);
    let base = colors[color_idx];

    var rgb = vec3<f32>(base.r, base.g, base.b);
    if material != 0u {
        let t = f32((cell >> VARIATION_SHIFT) & {{VARIATION_MASK}}u) / VARIATION_MAX;
        rgb = min(rgb * (1.0 - VARIATION_SHADE * 0.5 + t * VARIATION_SHADE), vec3<f32>(1.0));
    }

    return vec4<f32>(rgb, base.a);
}
";

/// Cell render shader with the cell layout and shading constants filled in.
#[must_use]
pub fn render_shader_source() -> String {
    CELL_RENDER_SHADER
        .replace("{{MATERIAL_MASK}}", &MATERIAL_MASK.to_string())
        .replace("{{VARIATION_SHIFT}}", &MATERIAL_BITS.to_string())
        .replace("{{VARIATION_MASK}}", &u32::from(MAX_VARIATION).to_string())
        .replace("{{VARIATION_MAX}}", &format!("{:?}", f32::from(MAX_VARIATION)))
        .replace("{{VARIATION_SHADE}}", &format!("{VARIATION_SHADE:?}"))
}

/// Cell render pipeline for visualizing simulation state.
pub struct CellRenderPipeline {
    /// Render pipeline
    pipeline: wgpu::RenderPipeline,
    /// Bind group layout
    bind_group_layout: wgpu::BindGroupLayout,
    /// Color buffer
    color_buffer: wgpu::Buffer,
    /// Params buffer
    params_buffer: wgpu::Buffer,
}

impl CellRenderPipeline {
    /// Creates a new cell render pipeline.
    pub fn new(device: &Device, surface_format: wgpu::TextureFormat, params: RenderParams) -> Self {
        info!("Creating cell render pipeline...");

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Cell Render Shader"),
            source: wgpu::ShaderSource::Wgsl(render_shader_source().into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cell Render Bind Group Layout"),
            entries: &[
                fragment_entry(0, wgpu::BufferBindingType::Storage { read_only: true }),
                fragment_entry(1, wgpu::BufferBindingType::Storage { read_only: true }),
                fragment_entry(2, wgpu::BufferBindingType::Uniform),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Cell Render Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Cell Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let colors = material_palette();
        let color_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Material Colors Buffer"),
            contents: bytemuck::cast_slice(&colors),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });

        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Render Params Buffer"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        info!("Cell render pipeline created successfully");

        Self {
            pipeline,
            bind_group_layout,
            color_buffer,
            params_buffer,
        }
    }

    /// Creates a bind group that reads `cell_buffer`.
    ///
    /// The grid swaps buffers every step, so callers create one per frame
    /// against the current buffer.
    #[must_use]
    pub fn create_bind_group(&self, device: &Device, cell_buffer: &wgpu::Buffer) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Cell Render Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: cell_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.color_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.params_buffer.as_entire_binding(),
                },
            ],
        })
    }

    /// Renders cells to the given render pass.
    pub fn render<'a>(&'a self, render_pass: &mut wgpu::RenderPass<'a>, bind_group: &'a wgpu::BindGroup) {
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, bind_group, &[]);
        render_pass.draw(0..3, 0..1);
    }

}

fn fragment_entry(binding: u32, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
