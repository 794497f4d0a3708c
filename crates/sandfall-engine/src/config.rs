//! Engine configuration.
//!
//! Provides configurable parameters for the window, the simulation grid, the
//! step kernel, and the brush. Configuration can be loaded from and saved to
//! a file.

use glam::UVec2;
use sandfall_common::GridDims;
use sandfall_kernel::{BrushShape, Material, DEFAULT_MAX_MODIFICATIONS, DEFAULT_SEED_BAND_ROWS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Configuration file name.
const CONFIG_FILE: &str = "sandfall.toml";

/// Largest workgroup the kernel will request (invocations per workgroup).
const MAX_TILE_INVOCATIONS: u32 = 256;

/// Engine configuration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // === Window Settings ===
    /// Window width in pixels
    pub window_width: u32,
    /// Window height in pixels
    pub window_height: u32,
    /// Enable VSync
    pub vsync: bool,
    /// Show frame time and FPS in the window title
    pub show_fps: bool,

    // === Simulation Settings ===
    /// Grid width in cells
    pub grid_width: u32,
    /// Grid height in cells
    pub grid_height: u32,
    /// Rows of sand seeded below the top row
    pub seed_band_rows: u32,
    /// Simulation steps per second
    pub step_rate: f64,
    /// Run every due step each frame instead of at most one
    pub catch_up: bool,
    /// Most steps run in one frame when catching up
    pub max_catch_up_steps: u32,
    /// Cap on carried-forward scheduler time, in step intervals
    pub max_backlog: u32,
    /// Modification queue capacity
    pub max_modifications: usize,

    // === Kernel Settings ===
    /// Workgroup tile width
    pub tile_x: u32,
    /// Workgroup tile height
    pub tile_y: u32,

    // === Brush Settings ===
    /// Initial brush radius in cells
    pub brush_radius: f32,
    /// Initial brush shape
    pub brush_shape: BrushShape,
    /// Initial brush material
    pub brush_material: Material,

    // === Debug Settings ===
    /// Enable GPU validation layers
    pub gpu_validation: bool,
    /// Read back and check every generation (slow)
    pub validate_generations: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            // Window
            window_width: 1280,
            window_height: 720,
            vsync: true,
            show_fps: true,

            // Simulation
            grid_width: 320,
            grid_height: 180,
            seed_band_rows: DEFAULT_SEED_BAND_ROWS,
            step_rate: 60.0,
            catch_up: false,
            max_catch_up_steps: 4,
            max_backlog: 4,
            max_modifications: DEFAULT_MAX_MODIFICATIONS,

            // Kernel
            tile_x: 16,
            tile_y: 16,

            // Brush
            brush_radius: 3.0,
            brush_shape: BrushShape::Circle,
            brush_material: Material::Sand,

            // Debug
            gpu_validation: cfg!(debug_assertions),
            validate_generations: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the default file location.
    /// Returns default config if file doesn't exist.
    pub fn load() -> Self {
        Self::load_from(Self::config_path())
    }

    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        match fs::File::open(path) {
            Ok(mut file) => {
                let mut contents = String::new();
                if let Err(e) = file.read_to_string(&mut contents) {
                    warn!("Failed to read config file: {e}");
                    return Self::default();
                }

                match toml::from_str(&contents) {
                    Ok(config) => {
                        info!("Loaded config from {}", path.display());
                        config
                    },
                    Err(e) => {
                        warn!("Failed to parse config file: {e}");
                        Self::default()
                    },
                }
            },
            Err(e) => {
                warn!("Failed to open config file: {e}");
                Self::default()
            },
        }
    }

    /// Save configuration to the default file location.
    pub fn save(&self) -> io::Result<()> {
        self.save_to(Self::config_path())
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path.
    fn config_path() -> PathBuf {
        if let Some(config_dir) = dirs_config_path() {
            config_dir.join("sandfall").join(CONFIG_FILE)
        } else {
            PathBuf::from(CONFIG_FILE)
        }
    }

    /// Validate and clamp configuration values to sensible ranges.
    pub fn validate(&mut self) {
        // Window size
        self.window_width = self.window_width.clamp(320, 7680);
        self.window_height = self.window_height.clamp(240, 4320);

        // Grid
        self.grid_width = self.grid_width.clamp(16, 4096);
        self.grid_height = self.grid_height.clamp(16, 4096);
        self.seed_band_rows = self.seed_band_rows.min(self.grid_height - 1);

        // Scheduling
        if !self.step_rate.is_finite() {
            self.step_rate = EngineConfig::default().step_rate;
        }
        self.step_rate = self.step_rate.clamp(1.0, 1000.0);
        self.max_catch_up_steps = self.max_catch_up_steps.clamp(1, 64);
        self.max_backlog = self.max_backlog.clamp(1, 64);
        self.max_modifications = self.max_modifications.clamp(1, 65_536);

        // Kernel tile: each axis 1-32, at most 256 invocations
        self.tile_x = self.tile_x.clamp(1, 32);
        self.tile_y = self.tile_y.clamp(1, 32);
        if self.tile_x * self.tile_y > MAX_TILE_INVOCATIONS {
            self.tile_y = MAX_TILE_INVOCATIONS / self.tile_x;
        }

        // Brush
        if !self.brush_radius.is_finite() {
            self.brush_radius = EngineConfig::default().brush_radius;
        }
        self.brush_radius = self.brush_radius.clamp(0.0, 64.0);
    }

    /// Grid dimensions.
    #[must_use]
    pub const fn grid_dims(&self) -> GridDims {
        GridDims::new(self.grid_width, self.grid_height)
    }

    /// Workgroup tile size.
    #[must_use]
    pub const fn tile(&self) -> UVec2 {
        UVec2::new(self.tile_x, self.tile_y)
    }
}

/// Get platform-specific config directory.
fn dirs_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join("Library/Application Support"))
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.window_width, 1280);
        assert_eq!(config.grid_dims(), GridDims::new(320, 180));
        assert_eq!(config.tile(), UVec2::new(16, 16));
        assert!(!config.catch_up);

        let mut validated = config.clone();
        validated.validate();
        assert_eq!(validated, config);
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();

        config.window_width = 100;
        config.grid_height = 2;
        config.seed_band_rows = 40;
        config.step_rate = 0.0;
        config.max_modifications = 0;
        config.brush_radius = f32::NAN;

        config.validate();

        assert_eq!(config.window_width, 320);
        assert_eq!(config.grid_height, 16);
        assert_eq!(config.seed_band_rows, 15);
        assert!((config.step_rate - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.max_modifications, 1);
        assert!((config.brush_radius - 3.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_tile_clamped_to_workgroup_limit() {
        let mut config = EngineConfig::default();
        config.tile_x = 32;
        config.tile_y = 32;
        config.validate();
        assert_eq!(config.tile(), UVec2::new(32, 8));

        config.tile_x = 0;
        config.tile_y = 100;
        config.validate();
        assert_eq!(config.tile(), UVec2::new(1, 32));
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("nested").join("sandfall.toml");

        let mut config = EngineConfig::default();
        config.grid_width = 640;
        config.vsync = false;
        config.catch_up = true;
        config.brush_shape = BrushShape::Square;
        config.brush_material = Material::Water;

        config.save_to(&config_path).expect("Failed to save config");

        let loaded = EngineConfig::load_from(&config_path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("sandfall.toml");
        fs::write(&config_path, "grid_width = 64\nstep_rate = 30.0\n").expect("write");

        let loaded = EngineConfig::load_from(&config_path);
        assert_eq!(loaded.grid_width, 64);
        assert!((loaded.step_rate - 30.0).abs() < f64::EPSILON);
        assert_eq!(loaded.grid_height, 180);
    }

    #[test]
    fn test_config_load_invalid_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("sandfall.toml");
        fs::write(&config_path, "grid_width = \"wide\"").expect("write");

        assert_eq!(EngineConfig::load_from(&config_path), EngineConfig::default());
    }

    #[test]
    fn test_config_load_missing_file() {
        let config = EngineConfig::load_from("/nonexistent/path/sandfall.toml");
        assert_eq!(config.window_width, 1280);
    }
}
