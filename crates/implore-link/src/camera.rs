//! Camera state for 2D point-cloud views
//!
//! Cameras live in normalized space, so two views with different data
//! domains can share the same camera value. The visible window on each axis
//! is `center ± 1 / zoom`.

use serde::{Deserialize, Serialize};

/// Smallest zoom factor a camera accepts
pub const MIN_ZOOM: f64 = 1e-3;

/// Largest zoom factor a camera accepts
pub const MAX_ZOOM: f64 = 1e4;

/// Pan/zoom camera in normalized coordinates
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraView {
    /// Normalized point at the middle of the view
    pub center: [f64; 2],

    /// Magnification; 1.0 shows exactly [-1, 1] on both axes
    pub zoom: f64,
}

impl Default for CameraView {
    fn default() -> Self {
        Self {
            center: [0.0, 0.0],
            zoom: 1.0,
        }
    }
}

impl CameraView {
    /// Create a camera, clamping zoom into the supported range
    pub fn new(center: [f64; 2], zoom: f64) -> Self {
        Self {
            center,
            zoom: zoom.clamp(MIN_ZOOM, MAX_ZOOM),
        }
    }

    /// Half-width of the visible window in normalized units
    pub fn half_extent(&self) -> f64 {
        1.0 / self.zoom
    }

    /// Visible normalized range on the X axis
    pub fn visible_x(&self) -> [f64; 2] {
        let h = self.half_extent();
        [self.center[0] - h, self.center[0] + h]
    }

    /// Visible normalized range on the Y axis
    pub fn visible_y(&self) -> [f64; 2] {
        let h = self.half_extent();
        [self.center[1] - h, self.center[1] + h]
    }

    /// Move the center by a normalized offset
    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.center[0] += dx;
        self.center[1] += dy;
    }

    /// Multiply zoom by `factor`, clamped
    pub fn zoom_by(&mut self, factor: f64) {
        self.zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
    }

    /// Compare two cameras within `eps`
    pub fn approx_eq(&self, other: &CameraView, eps: f64) -> bool {
        (self.center[0] - other.center[0]).abs() <= eps
            && (self.center[1] - other.center[1]).abs() <= eps
            && (self.zoom - other.zoom).abs() <= eps
    }
}
