//! Affine mapping between normalized camera space and data space
//!
//! Camera space spans [-1, 1] on each axis at the identity camera. Callers
//! guarantee `min != max`; `DataDomain` enforces this at construction.

/// Map a normalized coordinate into the data domain `[min, max]`
#[inline]
pub fn to_data(norm: f64, min: f64, max: f64) -> f64 {
    min + (norm + 1.0) / 2.0 * (max - min)
}

/// Map a data value into normalized camera space
#[inline]
pub fn to_normalized(value: f64, min: f64, max: f64) -> f64 {
    2.0 * (value - min) / (max - min) - 1.0
}
