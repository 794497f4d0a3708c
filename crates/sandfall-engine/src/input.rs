//! Input handling for the engine.
//!
//! Bridges winit window events to brush edits and engine commands. Pointer
//! state is polled once per frame; key presses are queued as [`Command`]s.

use glam::{DVec2, UVec2};
use sandfall_common::{window_to_grid, GridDims};
use sandfall_kernel::{BrushShape, Material, Modification};
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Largest brush radius reachable with the mouse wheel.
pub const MAX_BRUSH_RADIUS: f32 = 64.0;

/// Pixels of touchpad scroll per wheel line.
const PIXELS_PER_LINE: f64 = 40.0;

/// Discrete action requested from the keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Paint with this material
    SelectMaterial(Material),
    /// Switch between circle and square brushes
    ToggleShape,
    /// Pause or resume stepping
    TogglePause,
    /// Restore the seeded generation
    Reset,
    /// Close the window
    Exit,
}

/// Maps a physical key to its command.
fn command_for_key(key: KeyCode) -> Option<Command> {
    Some(match key {
        KeyCode::Digit1 => Command::SelectMaterial(Material::Sand),
        KeyCode::Digit2 => Command::SelectMaterial(Material::Water),
        KeyCode::Digit3 => Command::SelectMaterial(Material::None),
        KeyCode::Tab => Command::ToggleShape,
        KeyCode::Space => Command::TogglePause,
        KeyCode::KeyR => Command::Reset,
        KeyCode::Escape => Command::Exit,
        _ => return None,
    })
}

/// Current brush settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Brush {
    /// Radius in cells
    pub radius: f32,
    /// Footprint shape
    pub shape: BrushShape,
    /// Material painted with the primary button
    pub material: Material,
}

impl Brush {
    /// Creates a brush.
    #[must_use]
    pub fn new(radius: f32, shape: BrushShape, material: Material) -> Self {
        Self {
            radius: radius.clamp(0.0, MAX_BRUSH_RADIUS),
            shape,
            material,
        }
    }

    /// Grows or shrinks the radius by `delta` cells.
    pub fn adjust_radius(&mut self, delta: f32) {
        self.radius = (self.radius + delta).clamp(0.0, MAX_BRUSH_RADIUS);
    }

    /// Applies a keyboard command that changes the brush. Returns true if it did.
    pub fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::SelectMaterial(material) => self.material = material,
            Command::ToggleShape => self.shape = self.shape.toggled(),
            _ => return false,
        }
        true
    }
}

/// Tracks pointer and key state from winit.
#[derive(Debug, Default)]
pub struct InputHandler {
    /// Pointer in window pixels, `None` once the cursor leaves
    pointer: Option<DVec2>,
    /// Primary button held
    paint_held: bool,
    /// Secondary button held
    erase_held: bool,
    /// Commands pressed since the last frame
    commands: Vec<Command>,
    /// Wheel movement since the last frame, in lines
    scroll: f32,
}

impl InputHandler {
    /// Create a new input handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle a winit window event. Returns true if the event was handled.
    pub fn handle_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    if event.state == ElementState::Pressed && !event.repeat {
                        self.press_key(key);
                    }
                }
                true
            },
            WindowEvent::MouseInput { state, button, .. } => {
                self.set_button(*button, *state == ElementState::Pressed);
                true
            },
            WindowEvent::CursorMoved { position, .. } => {
                self.pointer = Some(DVec2::new(position.x, position.y));
                true
            },
            WindowEvent::CursorLeft { .. } => {
                self.pointer = None;
                true
            },
            WindowEvent::MouseWheel { delta, .. } => {
                self.scroll += match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => (pos.y / PIXELS_PER_LINE) as f32,
                };
                true
            },
            WindowEvent::Focused(false) => {
                self.paint_held = false;
                self.erase_held = false;
                true
            },
            _ => false,
        }
    }

    fn press_key(&mut self, key: KeyCode) {
        if let Some(command) = command_for_key(key) {
            self.commands.push(command);
        }
    }

    fn set_button(&mut self, button: MouseButton, pressed: bool) {
        match button {
            MouseButton::Left => self.paint_held = pressed,
            MouseButton::Right => self.erase_held = pressed,
            _ => {},
        }
    }

    /// Builds this frame's edit from the pointer and held buttons.
    ///
    /// The primary button paints the brush material, the secondary erases.
    /// Returns `None` when no button is held or the pointer is outside the
    /// window.
    #[must_use]
    pub fn sample_modification(&self, brush: &Brush, window: UVec2, dims: GridDims) -> Option<Modification> {
        let material = if self.paint_held {
            brush.material
        } else if self.erase_held {
            Material::None
        } else {
            return None;
        };
        let pos = window_to_grid(self.pointer?, window, dims)?;
        Some(Modification::new(pos, brush.radius, brush.shape, material))
    }

    /// Commands pressed since the last call, in order.
    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    /// Wheel lines scrolled since the last call.
    pub fn take_scroll(&mut self) -> f32 {
        std::mem::take(&mut self.scroll)
    }
}
