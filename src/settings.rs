use crate::keys::{Hotkey, Modifiers, VirtualKey};
use crate::logging::DEFAULT_LOG_FILE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const MIN_ZOOM: f32 = 1.0;
pub const MAX_ZOOM: f32 = 10.0;
pub const ZOOM_STEP: f32 = 0.5;
pub const MIN_FPS: u32 = 1;
pub const MAX_FPS: u32 = 240;
pub const MIN_LENS_SIZE: u32 = 16;
pub const MAX_LENS_SIZE: u32 = 4096;
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Clamp a zoom factor into `[MIN_ZOOM, MAX_ZOOM]`. NaN maps to `MIN_ZOOM`.
pub fn clamp_zoom(zoom: f32) -> f32 {
    if zoom.is_nan() {
        return MIN_ZOOM;
    }
    zoom.clamp(MIN_ZOOM, MAX_ZOOM)
}

pub fn step_zoom(zoom: f32, delta: f32) -> f32 {
    clamp_zoom(clamp_zoom(zoom) + delta)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LensShape {
    #[default]
    Circle,
    Rectangle,
}

impl LensShape {
    /// Shape code used by the C ABI: `0` is a circle, anything else a rectangle.
    pub fn from_code(code: i32) -> Self {
        if code == 0 {
            LensShape::Circle
        } else {
            LensShape::Rectangle
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Packed `0x00BBGGRR` value as GDI expects it.
    pub fn to_colorref(self) -> u32 {
        (self.r as u32) | ((self.g as u32) << 8) | ((self.b as u32) << 16)
    }
}

/// Crosshair dot painted in the middle of the lens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DotOverlay {
    pub enabled: bool,
    /// Radius in pixels.
    pub size: u32,
    pub color: Rgb,
}

impl Default for DotOverlay {
    fn default() -> Self {
        Self {
            enabled: false,
            size: 4,
            color: Rgb::new(255, 0, 0),
        }
    }
}

/// Modifiers that gate wheel zooming in each direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelBinding {
    pub zoom_in: Modifiers,
    pub zoom_out: Modifiers,
}

impl Default for WheelBinding {
    fn default() -> Self {
        Self {
            zoom_in: Modifiers::CTRL,
            zoom_out: Modifiers::CTRL,
        }
    }
}

/// Every binding except the toggle key is optional and independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputBindings {
    pub toggle_key: VirtualKey,
    pub exit_key: Option<VirtualKey>,
    pub zoom_in: Option<Hotkey>,
    pub zoom_out: Option<Hotkey>,
    pub wheel: Option<WheelBinding>,
}

impl Default for InputBindings {
    fn default() -> Self {
        Self {
            toggle_key: VirtualKey::XBUTTON1,
            exit_key: Some(VirtualKey::END),
            zoom_in: Some(Hotkey::new(VirtualKey::UP, Modifiers::CTRL)),
            zoom_out: Some(Hotkey::new(VirtualKey::DOWN, Modifiers::CTRL)),
            wheel: Some(WheelBinding::default()),
        }
    }
}

/// Everything the overlay needs to run. Replaced wholesale on update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LensSettings {
    /// Side length of the square lens in pixels.
    pub lens_size: u32,
    pub zoom_factor: f32,
    pub lens_shape: LensShape,
    pub dot: DotOverlay,
    pub bindings: InputBindings,
    pub fps: u32,
}

impl Default for LensSettings {
    fn default() -> Self {
        Self {
            lens_size: 300,
            zoom_factor: 3.0,
            lens_shape: LensShape::Circle,
            dot: DotOverlay::default(),
            bindings: InputBindings::default(),
            fps: 60,
        }
    }
}

impl LensSettings {
    /// Bring every numeric field into its valid range.
    pub fn clamped(mut self) -> Self {
        self.lens_size = self.lens_size.clamp(MIN_LENS_SIZE, MAX_LENS_SIZE);
        self.zoom_factor = clamp_zoom(self.zoom_factor);
        self.fps = self.fps.clamp(MIN_FPS, MAX_FPS);
        self.dot.size = self.dot.size.min(self.lens_size / 2);
        self
    }

    /// Time budget of one run-loop tick.
    pub fn frame_interval(&self) -> Duration {
        let fps = self.fps.clamp(MIN_FPS, MAX_FPS);
        Duration::from_secs_f64(1.0 / fps as f64)
    }
}

/// On-disk configuration of the standalone binary.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(flatten)]
    pub lens: LensSettings,
    /// When enabled the logger is initialised at debug level.
    #[serde(default)]
    pub debug_logging: bool,
    /// Diagnostic log path. Defaults to `scope_lens_debug.log`.
    #[serde(default)]
    pub log_file: Option<String>,
}

impl AppConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).unwrap_or_default();
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut config: Self = serde_json::from_str(&content)?;
        config.lens = config.lens.clamped();
        Ok(config)
    }

    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn log_file_path(&self) -> PathBuf {
        PathBuf::from(self.log_file.as_deref().unwrap_or(DEFAULT_LOG_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamped_pulls_fields_into_range() {
        let settings = LensSettings {
            lens_size: 0,
            zoom_factor: 42.0,
            fps: 1000,
            ..LensSettings::default()
        }
        .clamped();
        assert_eq!(settings.lens_size, MIN_LENS_SIZE);
        assert_eq!(settings.zoom_factor, MAX_ZOOM);
        assert_eq!(settings.fps, MAX_FPS);
    }

    #[test]
    fn frame_interval_stays_within_bounds() {
        let fast = LensSettings {
            fps: 10_000,
            ..LensSettings::default()
        };
        let slow = LensSettings {
            fps: 0,
            ..LensSettings::default()
        };
        assert!(fast.frame_interval() >= Duration::from_millis(4));
        assert_eq!(slow.frame_interval(), Duration::from_secs(1));
    }

    #[test]
    fn colorref_packs_bgr() {
        assert_eq!(Rgb::new(0x11, 0x22, 0x33).to_colorref(), 0x0033_2211);
    }
}
