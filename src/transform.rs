//! Lens geometry: which screen pixels are captured and how they are scaled.

use crate::settings::clamp_zoom;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenPoint {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenSize {
    pub width: i32,
    pub height: i32,
}

impl ScreenSize {
    pub fn center(self) -> ScreenPoint {
        ScreenPoint {
            x: self.width / 2,
            y: self.height / 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelRect {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl PixelRect {
    pub fn right(self) -> i32 {
        self.left + self.width
    }

    pub fn bottom(self) -> i32 {
        self.top + self.height
    }

    pub fn center(self) -> ScreenPoint {
        ScreenPoint {
            x: self.left + self.width / 2,
            y: self.top + self.height / 2,
        }
    }
}

/// Row-major 3x3 matrix in the layout the magnification API expects.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagTransform {
    pub v: [[f32; 3]; 3],
}

impl MagTransform {
    pub fn scale(factor: f32) -> Self {
        Self {
            v: [[factor, 0.0, 0.0], [0.0, factor, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    pub fn scale_factor(&self) -> f32 {
        self.v[0][0]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LensGeometry {
    pub source: PixelRect,
    pub transform: MagTransform,
}

pub fn round_half_up(value: f64) -> i32 {
    (value + 0.5).floor() as i32
}

/// Screen region that fills a `lens_size` lens once scaled by `zoom`.
pub fn source_rect(lens_size: u32, zoom: f32, center: ScreenPoint) -> PixelRect {
    let zoom = clamp_zoom(zoom) as f64;
    let side = round_half_up(lens_size as f64 / zoom);
    let half = side as f64 / 2.0;
    PixelRect {
        left: round_half_up(center.x as f64 - half),
        top: round_half_up(center.y as f64 - half),
        width: side,
        height: side,
    }
}

pub fn compute(lens_size: u32, zoom: f32, center: ScreenPoint) -> LensGeometry {
    let zoom = clamp_zoom(zoom);
    LensGeometry {
        source: source_rect(lens_size, zoom, center),
        transform: MagTransform::scale(zoom),
    }
}

/// Host window placement that centers the lens on the screen.
pub fn lens_window_rect(screen: ScreenSize, lens_size: u32) -> PixelRect {
    let side = lens_size as i32;
    PixelRect {
        left: (screen.width - side) / 2,
        top: (screen.height - side) / 2,
        width: side,
        height: side,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_pixel_rounds_up() {
        assert_eq!(round_half_up(2.5), 3);
        assert_eq!(round_half_up(2.49), 2);
        assert_eq!(round_half_up(-2.5), -2);
    }

    #[test]
    fn odd_source_side_stays_centered() {
        // 300 / 7 = 42.86 -> 43 px, centered on (960, 540)
        let rect = source_rect(300, 7.0, ScreenPoint { x: 960, y: 540 });
        assert_eq!(rect.width, 43);
        assert_eq!(rect.left, 939);
        assert_eq!(rect.right(), 982);
    }

    #[test]
    fn out_of_range_zoom_never_reaches_the_matrix() {
        let geometry = compute(300, 25.0, ScreenPoint::default());
        assert_eq!(geometry.transform.scale_factor(), 10.0);
        assert_eq!(geometry.source.width, 30);
    }
}
