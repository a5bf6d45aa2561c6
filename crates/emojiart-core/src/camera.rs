//! Pan/zoom transform between the screen and document coordinates.
//!
//! Document coordinates are centered: the document origin sits at the middle
//! of the viewport when the pan offset is zero. The pan offset is kept in
//! document units so panning feels the same at every zoom level.

use kurbo::{Point, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Smallest zoom factor the camera allows.
pub const MIN_ZOOM: f64 = 0.05;

/// Largest zoom factor the camera allows.
pub const MAX_ZOOM: f64 = 20.0;

/// View transform for the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Pan offset in document units.
    pub pan: Vec2,
    /// Zoom factor (1.0 = one document unit per screen point).
    pub zoom: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            pan: Vec2::ZERO,
            zoom: 1.0,
        }
    }
}

impl Camera {
    /// Create a new camera with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    fn center(viewport: Size) -> Point {
        Point::new(viewport.width / 2.0, viewport.height / 2.0)
    }

    /// Convert a screen point to integer document coordinates.
    ///
    /// Fractions are truncated toward zero.
    pub fn to_document(&self, screen: Point, viewport: Size) -> (i64, i64) {
        let center = Self::center(viewport);
        let x = (screen.x - self.pan.x * self.zoom - center.x) / self.zoom;
        let y = (screen.y - self.pan.y * self.zoom - center.y) / self.zoom;
        (x as i64, y as i64)
    }

    /// Convert document coordinates to a screen point.
    pub fn to_screen(&self, location: (i64, i64), viewport: Size) -> Point {
        let center = Self::center(viewport);
        Point::new(
            center.x + (location.0 as f64 + self.pan.x) * self.zoom,
            center.y + (location.1 as f64 + self.pan.y) * self.zoom,
        )
    }

    /// Pan by a drag delta measured on screen.
    pub fn pan_by(&mut self, screen_delta: Vec2) {
        self.pan += screen_delta / self.zoom;
    }

    /// Multiply the zoom, staying within [`MIN_ZOOM`]..=[`MAX_ZOOM`].
    pub fn zoom_by(&mut self, factor: f64) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        self.zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
    }

    /// Center on the origin and scale so an image of `image` pixels fits
    /// entirely inside `viewport`. Empty images leave the camera untouched.
    pub fn zoom_to_fit(&mut self, image: Size, viewport: Size) {
        if image.width <= 0.0 || image.height <= 0.0 {
            return;
        }
        let horizontal = viewport.width / image.width;
        let vertical = viewport.height / image.height;
        self.pan = Vec2::ZERO;
        self.zoom = horizontal.min(vertical).clamp(MIN_ZOOM, MAX_ZOOM);
    }

    /// Reset camera to default position and zoom.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
