// View transform
// Zoom and pan state, and the world -> screen mapping derived from it

use crate::store::Image;

pub const MIN_ZOOM: f32 = 0.01;
pub const MAX_ZOOM: f32 = 100.0;
/// Relative zoom change per wheel step
pub const ZOOM_STEP: f32 = 0.1;

/// Axis-aligned rectangle in screen pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ScreenRect {
    /// Inclusive on every edge
    pub fn contains(&self, px: f64, py: f64) -> bool {
        let (x, y) = (self.x as f64, self.y as f64);
        x <= px && px <= x + self.width as f64 && y <= py && py <= y + self.height as f64
    }

    /// Grow by `px` on every side
    pub fn padded(&self, px: f32) -> ScreenRect {
        ScreenRect {
            x: self.x - px,
            y: self.y - px,
            width: self.width + 2.0 * px,
            height: self.height + 2.0 * px,
        }
    }

    /// Truncate to whole pixels
    pub fn to_pixels(&self) -> PixelRect {
        PixelRect {
            x: self.x as i32,
            y: self.y as i32,
            width: self.width as i32,
            height: self.height as i32,
        }
    }
}

/// Integer rectangle handed to the windowing system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Zoom, pan origin and window size
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    zoom: f32,
    org_x: i32,
    org_y: i32,
    width: u32,
    height: u32,
}

impl ViewState {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            zoom: 1.0,
            org_x: 0,
            org_y: 0,
            width,
            height,
        }
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn origin(&self) -> (i32, i32) {
        (self.org_x, self.org_y)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Set the zoom, clamped to [`MIN_ZOOM`, `MAX_ZOOM`]
    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = if zoom.is_nan() {
            1.0
        } else {
            zoom.clamp(MIN_ZOOM, MAX_ZOOM)
        };
    }

    /// Apply wheel steps; positive zooms in
    pub fn zoom_steps(&mut self, steps: i32) {
        let factor = if steps >= 0 {
            1.0 + ZOOM_STEP
        } else {
            1.0 - ZOOM_STEP
        };
        let mut zoom = self.zoom;
        // 256 steps already cross the whole zoom range
        for _ in 0..steps.unsigned_abs().min(256) {
            zoom *= factor;
        }
        self.set_zoom(zoom);
    }

    pub fn reset_zoom(&mut self) {
        self.zoom = 1.0;
    }

    /// Move the pan origin by a world-space delta
    pub fn pan_by(&mut self, dx: i32, dy: i32) {
        self.org_x = self.org_x.saturating_add(dx);
        self.org_y = self.org_y.saturating_add(dy);
    }

    /// Track a window resize; negative sizes clamp to zero
    pub fn resize(&mut self, width: i32, height: i32) {
        self.width = width.max(0) as u32;
        self.height = height.max(0) as u32;
    }

    /// Map a world rectangle to the screen, padded by `pad` pixels on every side
    pub fn to_screen(
        &self,
        world_x: i32,
        world_y: i32,
        world_w: f32,
        world_h: f32,
        pad: f32,
    ) -> ScreenRect {
        let z = self.zoom;
        let x = z * (world_x as f32 + self.org_x as f32) + (self.width / 2) as f32;
        let y = z * (world_y as f32 + self.org_y as f32) + (self.height / 2) as f32;
        ScreenRect {
            x,
            y,
            width: z * world_w,
            height: z * world_h,
        }
        .padded(pad)
    }

    /// Screen rectangle of an image at its current scale
    pub fn image_rect(&self, image: &Image, pad: f32) -> ScreenRect {
        let (x, y) = image.position();
        let (w, h) = image.scaled_size();
        self.to_screen(x, y, w, h, pad)
    }

    pub fn window_rect(&self) -> PixelRect {
        PixelRect {
            x: 0,
            y: 0,
            width: self.width as i32,
            height: self.height as i32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_view_centers_world_origin() {
        let view = ViewState::new(800, 600);
        let rect = view.to_screen(-10, -5, 20.0, 10.0, 0.0);
        assert_eq!(
            rect,
            ScreenRect {
                x: 390.0,
                y: 295.0,
                width: 20.0,
                height: 10.0
            }
        );
    }

    #[test]
    fn zoom_and_pan_follow_the_projection_formula() {
        let mut view = ViewState::new(800, 600);
        view.set_zoom(2.0);
        view.pan_by(5, -3);

        let rect = view.to_screen(10, 20, 30.0, 40.0, 0.0);

        assert_eq!(rect.x, 2.0 * (10.0 + 5.0) + 400.0);
        assert_eq!(rect.y, 2.0 * (20.0 - 3.0) + 300.0);
        assert_eq!(rect.width, 60.0);
        assert_eq!(rect.height, 80.0);
    }

    #[test]
    fn screen_size_is_linear_in_world_size() {
        let mut view = ViewState::new(640, 480);
        view.pan_by(-17, 42);
        for zoom in [MIN_ZOOM, 0.25, 1.0, 4.0, MAX_ZOOM] {
            view.set_zoom(zoom);
            let base = view.to_screen(3, 4, 16.0, 8.0, 0.0);
            for k in [2.0_f32, 4.0, 8.0] {
                let scaled = view.to_screen(3, 4, 16.0 * k, 8.0 * k, 0.0);
                assert!((scaled.width - base.width * k).abs() <= base.width * k * 1e-6);
                assert!((scaled.height - base.height * k).abs() <= base.height * k * 1e-6);
                assert_eq!(scaled.x, base.x);
            }
        }
    }

    #[test]
    fn padding_grows_every_side() {
        let view = ViewState::new(100, 100);
        let rect = view.to_screen(0, 0, 10.0, 10.0, 2.0);
        assert_eq!(
            rect,
            ScreenRect {
                x: 48.0,
                y: 48.0,
                width: 14.0,
                height: 14.0
            }
        );
    }

    #[test]
    fn containment_is_inclusive_on_both_edges() {
        let rect = ScreenRect {
            x: 10.0,
            y: 10.0,
            width: 5.0,
            height: 5.0,
        };
        assert!(rect.contains(10.0, 10.0));
        assert!(rect.contains(15.0, 15.0));
        assert!(!rect.contains(15.5, 12.0));
        assert!(!rect.contains(9.9, 12.0));
    }

    #[test]
    fn zoom_is_clamped_and_steps_are_multiplicative() {
        let mut view = ViewState::new(10, 10);
        view.zoom_steps(1);
        assert!((view.zoom() - 1.1).abs() < 1e-6);
        view.zoom_steps(-1);
        assert!((view.zoom() - 0.99).abs() < 1e-6);

        view.set_zoom(1e6);
        assert_eq!(view.zoom(), MAX_ZOOM);
        view.zoom_steps(5);
        assert_eq!(view.zoom(), MAX_ZOOM);
        view.set_zoom(-4.0);
        assert_eq!(view.zoom(), MIN_ZOOM);
    }

    #[test]
    fn reset_is_idempotent_and_keeps_pan() {
        let mut view = ViewState::new(10, 10);
        view.pan_by(7, 8);
        for start in [0.0, 0.5, 37.0, 1e9] {
            view.set_zoom(start);
            view.reset_zoom();
            assert_eq!(view.zoom(), 1.0);
            view.reset_zoom();
            assert_eq!(view.zoom(), 1.0);
        }
        assert_eq!(view.origin(), (7, 8));
    }

    #[test]
    fn negative_resize_clamps_to_zero() {
        let mut view = ViewState::new(10, 10);
        view.resize(-5, 20);
        assert_eq!(view.size(), (0, 20));
    }
}
