//! Axis bookkeeping in original data units
//!
//! Each view keeps the data domain its normalized space was built from.
//! Whenever the camera moves (own gesture or synced apply) the visible
//! window is translated back into data units for the host's axes.

use serde::{Deserialize, Serialize};

use crate::camera::CameraView;
use crate::error::{LinkError, LinkResult};
use crate::mapper::to_data;

/// Original data range of one axis
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataDomain {
    pub min: f64,
    pub max: f64,
}

impl DataDomain {
    /// Create a domain, rejecting degenerate or non-finite ranges
    pub fn try_new(axis: &'static str, min: f64, max: f64) -> LinkResult<Self> {
        if !min.is_finite() || !max.is_finite() || min == max {
            return Err(LinkError::InvalidDomain { axis, min, max });
        }
        Ok(Self { min, max })
    }

    /// Create a domain from a `[min, max]` pair
    pub fn from_pair(axis: &'static str, pair: [f64; 2]) -> LinkResult<Self> {
        Self::try_new(axis, pair[0], pair[1])
    }

    /// Normalized coordinate to data units
    pub fn to_data(&self, norm: f64) -> f64 {
        to_data(norm, self.min, self.max)
    }

    /// Map a normalized `[lo, hi]` window into data units
    pub fn window_to_data(&self, window: [f64; 2]) -> [f64; 2] {
        [self.to_data(window[0]), self.to_data(window[1])]
    }
}

/// Visible data ranges of a view under its current camera
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisDomains {
    pub x: [f64; 2],
    pub y: [f64; 2],
}

impl AxisDomains {
    /// Translate a camera's visible window into data units
    pub fn from_camera(camera: &CameraView, x: &DataDomain, y: &DataDomain) -> Self {
        Self {
            x: x.window_to_data(camera.visible_x()),
            y: y.window_to_data(camera.visible_y()),
        }
    }

    /// Whether a data-space point lies inside the visible window
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let (x0, x1) = ordered(self.x);
        let (y0, y1) = ordered(self.y);
        x >= x0 && x <= x1 && y >= y0 && y <= y1
    }
}

fn ordered(range: [f64; 2]) -> (f64, f64) {
    if range[0] <= range[1] {
        (range[0], range[1])
    } else {
        (range[1], range[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1.0, 1.0)]
    #[case(f64::NAN, 1.0)]
    #[case(0.0, f64::INFINITY)]
    fn test_degenerate_domains_rejected(#[case] min: f64, #[case] max: f64) {
        assert!(DataDomain::try_new("x", min, max).is_err());
    }

    #[test]
    fn test_identity_camera_shows_full_domain() {
        let x = DataDomain::try_new("x", 0.0, 100.0).unwrap();
        let y = DataDomain::try_new("y", -5.0, 5.0).unwrap();
        let axes = AxisDomains::from_camera(&CameraView::default(), &x, &y);

        assert_eq!(axes.x, [0.0, 100.0]);
        assert_eq!(axes.y, [-5.0, 5.0]);
    }

    #[test]
    fn test_zoomed_camera_narrows_axes() {
        let x = DataDomain::try_new("x", 0.0, 100.0).unwrap();
        let y = DataDomain::try_new("y", 0.0, 10.0).unwrap();
        let camera = CameraView::new([0.5, 0.0], 2.0);
        let axes = AxisDomains::from_camera(&camera, &x, &y);

        assert_eq!(axes.x, [50.0, 100.0]);
        assert_eq!(axes.y, [2.5, 7.5]);
        assert!(axes.contains(75.0, 5.0));
        assert!(!axes.contains(25.0, 5.0));
    }

    #[test]
    fn test_same_camera_different_domains() {
        // Linked views share the normalized camera, not the data window
        let camera = CameraView::new([0.0, 0.0], 4.0);
        let a = DataDomain::try_new("x", 0.0, 8.0).unwrap();
        let b = DataDomain::try_new("x", 100.0, 200.0).unwrap();

        assert_eq!(a.window_to_data(camera.visible_x()), [3.0, 5.0]);
        assert_eq!(b.window_to_data(camera.visible_x()), [137.5, 162.5]);
    }
}
