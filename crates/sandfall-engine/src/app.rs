//! Application lifecycle management.
//!
//! Main loop: poll input, queue the brush edit, let the scheduler decide
//! whether a step is due, step, then draw the current generation.

use std::sync::Arc;

use anyhow::{Context, Result};
use glam::UVec2;
use sandfall_kernel::{
    GpuKernel, GpuKernelConfig, Simulation, SimulationParams, SimulationScheduler, ValidationHarness,
};
use tracing::{debug, error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use crate::config::EngineConfig;
use crate::input::{Brush, Command, InputHandler};
use crate::renderer::Renderer;
use crate::timing::{FpsCounter, FrameTiming};

/// Window title before the first FPS refresh.
const WINDOW_TITLE: &str = "Sandfall";

/// Application state machine.
struct SandfallApp {
    /// Engine configuration
    config: EngineConfig,
    /// Window handle (created after resume)
    window: Option<Arc<Window>>,
    /// Renderer (initialized after window creation)
    renderer: Option<Renderer>,
    /// Simulation (shares the renderer's device)
    simulation: Option<Simulation<GpuKernel>>,

    /// Decides when a step is due
    scheduler: SimulationScheduler,
    /// Input handler
    input: InputHandler,
    /// Current brush
    brush: Brush,
    /// Frame timing
    timing: FrameTiming,
    /// FPS counter for the window title
    fps_counter: FpsCounter,
    /// Optional per-generation readback checks
    validation: ValidationHarness,
    /// Stepping suspended
    paused: bool,
}

impl SandfallApp {
    /// Creates a new application instance.
    fn new(config: EngineConfig) -> Self {
        let scheduler =
            SimulationScheduler::from_rate(config.step_rate).with_max_backlog(config.max_backlog);
        let brush = Brush::new(config.brush_radius, config.brush_shape, config.brush_material);
        let mut validation = ValidationHarness::new();
        validation.set_enabled(config.validate_generations);

        Self {
            config,
            window: None,
            renderer: None,
            simulation: None,

            scheduler,
            input: InputHandler::new(),
            brush,
            timing: FrameTiming::new(),
            fps_counter: FpsCounter::new(),
            validation,
            paused: false,
        }
    }

    /// Creates the window, the GPU context, and the simulation.
    fn initialize(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window_attrs = Window::default_attributes()
            .with_title(WINDOW_TITLE)
            .with_inner_size(PhysicalSize::new(
                self.config.window_width,
                self.config.window_height,
            ));
        let window = Arc::new(
            event_loop
                .create_window(window_attrs)
                .context("Failed to create window")?,
        );
        info!("Window created successfully");

        let dims = self.config.grid_dims();
        let renderer = pollster::block_on(Renderer::new(
            Arc::clone(&window),
            dims,
            self.config.vsync,
            self.config.gpu_validation,
        ))?;

        let kernel = GpuKernel::new(
            renderer.device(),
            renderer.queue(),
            GpuKernelConfig {
                tile: self.config.tile(),
                max_modifications: self.config.max_modifications,
            },
        )
        .context("Failed to create step kernel")?;

        let simulation = Simulation::new(
            kernel,
            SimulationParams {
                dims,
                seed_band_rows: self.config.seed_band_rows,
                max_modifications: self.config.max_modifications,
            },
        )
        .context("Failed to create simulation")?;

        self.window = Some(window);
        self.renderer = Some(renderer);
        self.simulation = Some(simulation);
        Ok(())
    }

    /// Main update and render loop. Returns false when the app should exit.
    fn update_and_render(&mut self) -> bool {
        let dt = self.timing.delta_time();

        for command in self.input.take_commands() {
            if self.brush.apply(command) {
                debug!("Brush: {:?}", self.brush);
                continue;
            }
            match command {
                Command::TogglePause => {
                    self.paused = !self.paused;
                    self.scheduler.reset();
                    info!("Simulation {}", if self.paused { "paused" } else { "running" });
                },
                Command::Reset => self.reset_simulation(),
                Command::Exit => return false,
                Command::SelectMaterial(_) | Command::ToggleShape => {},
            }
        }

        let scroll = self.input.take_scroll();
        if scroll != 0.0 {
            self.brush.adjust_radius(scroll);
            debug!("Brush radius: {:.1}", self.brush.radius);
        }

        let Some(simulation) = &mut self.simulation else {
            return true;
        };

        if let Some(window) = &self.window {
            let size = window.inner_size();
            let edit = self.input.sample_modification(
                &self.brush,
                UVec2::new(size.width, size.height),
                simulation.dims(),
            );
            if let Some(edit) = edit {
                if let Err(e) = simulation.enqueue(edit) {
                    debug!("Edit dropped: {e}");
                }
            }
        }

        if !self.paused {
            let due = if self.config.catch_up {
                self.scheduler.accumulate(dt, self.config.max_catch_up_steps)
            } else {
                u32::from(self.scheduler.advance(dt))
            };
            for _ in 0..due {
                if let Err(e) = simulation.step() {
                    error!("Simulation step failed: {e}");
                    break;
                }
                if self.validation.is_enabled() {
                    match simulation.read_current() {
                        Ok(cells) => {
                            self.validation
                                .check_generation(simulation.generation(), simulation.dims(), &cells);
                        },
                        Err(e) => warn!("Generation readback failed: {e}"),
                    }
                }
            }
        }

        if let Some(renderer) = &mut self.renderer {
            if let Err(e) = renderer.render(simulation.grid().current_buffer()) {
                warn!("Render error: {e}");
            }
        }

        if self.fps_counter.tick() && self.config.show_fps {
            if let Some(window) = &self.window {
                window.set_title(&self.fps_counter.title());
            }
        }

        true
    }

    fn reset_simulation(&mut self) {
        if let Some(simulation) = &mut self.simulation {
            match simulation.reset() {
                Ok(()) => {
                    self.scheduler.reset();
                    self.timing.reset();
                },
                Err(e) => error!("Reset failed: {e}"),
            }
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        info!("Shutting down...");
        if let Some(simulation) = &self.simulation {
            info!("Ran {} generation(s)", simulation.generation());
        }
        if let Some(renderer) = &self.renderer {
            info!(
                "Rendered {} frame(s), recent average {:.2} ms",
                renderer.frame_count(),
                self.timing.average_frame_time_ms()
            );
        }
        if self.validation.failure_count() > 0 {
            warn!(
                "{} generation(s) failed validation",
                self.validation.failure_count()
            );
        }
        if let Err(e) = self.config.save() {
            warn!("Failed to save config: {e}");
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for SandfallApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        info!("Application resumed, creating window...");

        match self.initialize(event_loop) {
            Ok(()) => {
                self.timing.reset();
                let dims = self.config.grid_dims();
                info!(
                    "Sandfall ready - {}x{} window, {}x{} grid @ {:.0} steps/s",
                    self.config.window_width,
                    self.config.window_height,
                    dims.width,
                    dims.height,
                    self.scheduler.rate()
                );
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            },
            Err(e) => {
                error!("Failed to initialize: {e:#}");
                event_loop.exit();
            },
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        self.input.handle_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.shutdown(event_loop);
            },
            WindowEvent::Resized(new_size) => {
                if let Some(renderer) = &mut self.renderer {
                    renderer.resize(new_size);
                }
                if new_size.width > 0 && new_size.height > 0 {
                    self.config.window_width = new_size.width;
                    self.config.window_height = new_size.height;
                }
            },
            WindowEvent::RedrawRequested => {
                if !self.update_and_render() {
                    self.shutdown(event_loop);
                    return;
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            },
            _ => {},
        }
    }
}

/// Runs the main application loop.
pub fn run() -> Result<()> {
    let mut config = EngineConfig::load();
    config.validate();

    info!("Configuration loaded:");
    info!("  Window: {}x{}", config.window_width, config.window_height);
    info!("  Grid: {}x{}", config.grid_width, config.grid_height);
    info!("  Step rate: {} Hz (catch-up {})", config.step_rate, config.catch_up);
    info!("  VSync: {}", config.vsync);

    info!("Creating event loop...");
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = SandfallApp::new(config);

    info!("Starting event loop...");
    event_loop.run_app(&mut app)?;

    Ok(())
}
