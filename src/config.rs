// Configuration module
// Compiled defaults plus an optional TOML override file

use crate::shortcuts::ModMask;
use anyhow::{Context, Result};
use log::{debug, info};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "refpin";
const CONFIG_FILE: &str = "config.toml";

/// Default border width around each image, in pixels
pub const DEFAULT_BORDER_PX: u32 = 1;
/// Default maximum number of images on the board
pub const DEFAULT_MAX_IMAGES: usize = 1024;
/// Default initial window size
pub const DEFAULT_WIDTH: u32 = 1080;
pub const DEFAULT_HEIGHT: u32 = 800;

/// An RGB colour with components in 0.0 - 1.0
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Premultiplied RGBA with the given alpha
    pub fn premultiplied(&self, alpha: f32) -> [f32; 4] {
        [self.r * alpha, self.g * alpha, self.b * alpha, alpha]
    }
}

const ACCENT: Color = Color::new(0.0, 0x6b as f32 / 255.0, 0xcd as f32 / 255.0);

/// Board configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Border drawn around every image, also added to the window shape
    pub border_px: u32,
    /// Window background, only visible when the whole window is shown
    pub background: Color,
    /// Background opacity (set below 1.0 for a translucent board)
    pub background_alpha: f32,
    /// Border colour of idle images
    pub normal: Color,
    /// Border colour of the image under the pointer
    pub hover: Color,
    /// Border colour of the image being manipulated
    pub focus: Color,
    /// Initial window size
    pub width: u32,
    pub height: u32,
    /// Clip the window to the displayed images.
    /// The background is neither visible nor clickable unless an image is being
    /// manipulated; disabled automatically while the board is empty.
    pub custom_shape: bool,
    /// Maximum number of images the board holds
    pub max_images: usize,
    /// Modifier bits ignored when matching shortcuts
    pub ignore_mod: ModMask,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            border_px: DEFAULT_BORDER_PX,
            background: Color::new(0.1, 0.1, 0.1),
            background_alpha: 1.0,
            normal: Color::new(0.0, 0.0, 0.0),
            hover: ACCENT,
            focus: ACCENT,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            custom_shape: true,
            max_images: DEFAULT_MAX_IMAGES,
            ignore_mod: ModMask::MOD2,
        }
    }
}

impl Config {
    /// Clamp values into their valid ranges
    fn sanitized(mut self) -> Self {
        self.max_images = self.max_images.max(1);
        self.background_alpha = self.background_alpha.clamp(0.0, 1.0);
        self
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut path| {
        path.push(APP_NAME);
        path.push(CONFIG_FILE);
        path
    })
}

/// Load the user configuration, falling back to defaults when no file exists
pub fn load() -> Result<Config> {
    match default_config_path() {
        Some(path) if path.exists() => load_from_path(&path),
        _ => {
            debug!("No configuration file, using defaults");
            Ok(Config::default())
        }
    }
}

/// Load configuration from an explicit path
pub fn load_from_path(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration: {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Invalid configuration: {}", path.display()))?;
    info!("Loaded configuration from {}", path.display());
    Ok(config.sanitized())
}
