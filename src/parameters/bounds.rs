//! Box bounds and the Minuit transforms.
//!
//! Bounds keep light-curve parameters physical while the optimizer works on an
//! unconstrained vector. The Minuit-style transformation maps each bounded
//! external value onto an unbounded internal value and back.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::f64::{INFINITY, NEG_INFINITY};
use thiserror::Error;

/// Bad bounds, or a value that cannot be mapped through them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundsError {
    #[error("Invalid bounds: min ({min}) must be less than max ({max})")]
    InvalidBounds { min: f64, max: f64 },

    #[error("Parameter value {value} is outside bounds: [{min}, {max}]")]
    ValueOutsideBounds { value: f64, min: f64, max: f64 },

    #[error("Infinite parameter value is not allowed")]
    InfiniteValue,

    #[error("Expected {expected} bounds, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Closed interval `[min, max]` for one parameter; either end may be infinite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min: NEG_INFINITY,
            max: INFINITY,
        }
    }
}

impl Bounds {
    /// # Examples
    ///
    /// ```
    /// use grb_lcfit::parameters::Bounds;
    ///
    /// // A break time must fall inside the observed span.
    /// let span = Bounds::new(60.0, 2.5e5).unwrap();
    /// assert!(span.has_upper_bound());
    /// assert!(Bounds::new(2.5e5, 60.0).is_err());
    /// ```
    pub fn new(min: f64, max: f64) -> Result<Self, BoundsError> {
        if min.is_nan() || max.is_nan() || min > max {
            return Err(BoundsError::InvalidBounds { min, max });
        }

        Ok(Self { min, max })
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Lower limit only, as for normalisations and flare amplitudes.
    pub fn min_only(min: f64) -> Self {
        Self { min, max: INFINITY }
    }

    pub fn is_within_bounds(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn has_lower_bound(&self) -> bool {
        self.min.is_finite()
    }

    pub fn has_upper_bound(&self) -> bool {
        self.max.is_finite()
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    /// Clamp a value strictly inside the bounds.
    ///
    /// Values sitting exactly on a finite bound are moved inward by a small
    /// fraction of the scale, since the sine transform has a zero derivative
    /// there and the optimizer would never move them.
    pub fn clamp_inside(&self, value: f64) -> f64 {
        let clamped = self.clamp(value);
        let scale = if self.min.is_finite() && self.max.is_finite() {
            (self.max - self.min) * 1e-6
        } else {
            clamped.abs().max(1.0) * 1e-6
        };

        if self.has_lower_bound() && clamped <= self.min {
            let nudged = self.min + scale;
            if self.has_upper_bound() {
                nudged.min(0.5 * (self.min + self.max))
            } else {
                nudged
            }
        } else if self.has_upper_bound() && clamped >= self.max {
            let nudged = self.max - scale;
            if self.has_lower_bound() {
                nudged.max(0.5 * (self.min + self.max))
            } else {
                nudged
            }
        } else {
            clamped
        }
    }
}

/// Minuit transform for one parameter.
///
/// Two-sided bounds use `min + (sin(u) + 1)·(max − min)/2`; one-sided bounds
/// use `min − 1 + √(u² + 1)` or its mirror.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundsTransform {
    bounds: Bounds,
}

impl BoundsTransform {
    pub fn new(bounds: Bounds) -> Self {
        Self { bounds }
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn to_external(&self, internal_value: f64) -> f64 {
        match (self.bounds.has_lower_bound(), self.bounds.has_upper_bound()) {
            (false, false) => internal_value,
            (true, false) => self.bounds.min - 1.0 + (internal_value * internal_value + 1.0).sqrt(),
            (false, true) => self.bounds.max + 1.0 - (internal_value * internal_value + 1.0).sqrt(),
            (true, true) => {
                let bound_range = self.bounds.max - self.bounds.min;
                self.bounds.min + (internal_value.sin() + 1.0) * bound_range / 2.0
            }
        }
    }

    /// Fails for values outside the bounds or non-finite values.
    pub fn to_internal(&self, external_value: f64) -> Result<f64, BoundsError> {
        if !external_value.is_finite() {
            return Err(BoundsError::InfiniteValue);
        }

        if !self.bounds.is_within_bounds(external_value) {
            return Err(BoundsError::ValueOutsideBounds {
                value: external_value,
                min: self.bounds.min,
                max: self.bounds.max,
            });
        }

        let internal = match (self.bounds.has_lower_bound(), self.bounds.has_upper_bound()) {
            (false, false) => external_value,
            (true, false) => ((external_value - self.bounds.min + 1.0).powi(2) - 1.0).sqrt(),
            (false, true) => ((self.bounds.max - external_value + 1.0).powi(2) - 1.0).sqrt(),
            (true, true) => {
                let bound_range = self.bounds.max - self.bounds.min;
                let scaled = 2.0 * (external_value - self.bounds.min) / bound_range - 1.0;
                scaled.clamp(-1.0, 1.0).asin()
            }
        };

        Ok(internal)
    }
}

/// Bounds for a whole parameter vector, in canonical parameter order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterBounds {
    transforms: Vec<BoundsTransform>,
}

impl ParameterBounds {
    /// Build from one `Bounds` per parameter.
    pub fn new(bounds: Vec<Bounds>) -> Self {
        Self {
            transforms: bounds.into_iter().map(BoundsTransform::new).collect(),
        }
    }

    /// No bounds on any of `n` parameters.
    pub fn unbounded(n: usize) -> Self {
        Self::new(vec![Bounds::unbounded(); n])
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Bounds of the `i`-th parameter.
    pub fn get(&self, i: usize) -> Option<Bounds> {
        self.transforms.get(i).map(|t| t.bounds())
    }

    fn check_len(&self, n: usize) -> Result<(), BoundsError> {
        if n != self.transforms.len() {
            return Err(BoundsError::LengthMismatch {
                expected: self.transforms.len(),
                actual: n,
            });
        }
        Ok(())
    }

    /// Move every value strictly inside its bounds.
    ///
    /// Returns the adjusted vector and the indices that had to move.
    pub fn clamp_inside(&self, external: &Array1<f64>) -> Result<(Array1<f64>, Vec<usize>), BoundsError> {
        self.check_len(external.len())?;

        let mut moved = Vec::new();
        let clamped = external
            .iter()
            .zip(self.transforms.iter())
            .enumerate()
            .map(|(i, (&value, transform))| {
                let inside = transform.bounds().clamp_inside(value);
                if inside != value {
                    moved.push(i);
                }
                inside
            })
            .collect::<Vec<f64>>();

        Ok((Array1::from_vec(clamped), moved))
    }

    /// External (physical) values to the optimizer's internal vector.
    pub fn to_internal(&self, external: &Array1<f64>) -> Result<Array1<f64>, BoundsError> {
        self.check_len(external.len())?;

        let internal = external
            .iter()
            .zip(self.transforms.iter())
            .map(|(&value, transform)| transform.to_internal(value))
            .collect::<Result<Vec<f64>, BoundsError>>()?;

        Ok(Array1::from_vec(internal))
    }

    /// Internal vector back to external (physical) values.
    pub fn to_external(&self, internal: &Array1<f64>) -> Array1<f64> {
        internal
            .iter()
            .zip(self.transforms.iter())
            .map(|(&value, transform)| transform.to_external(value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_bounds_creation() {
        let bounds = Bounds::new(0.0, 10.0).unwrap();
        assert_eq!(bounds.min, 0.0);
        assert_eq!(bounds.max, 10.0);

        assert!(Bounds::new(10.0, 0.0).is_err());
        assert!(Bounds::new(f64::NAN, 0.0).is_err());

        let bounds = Bounds::min_only(5.0);
        assert!(bounds.has_lower_bound());
        assert!(!bounds.has_upper_bound());

        let bounds = Bounds {
            min: NEG_INFINITY,
            max: 15.0,
        };
        assert!(!bounds.has_lower_bound());
        assert!(bounds.has_upper_bound());
    }

    #[test]
    fn test_clamp_inside_moves_off_the_edge() {
        let bounds = Bounds::new(0.0, 10.0).unwrap();
        assert!(bounds.clamp_inside(0.0) > 0.0);
        assert!(bounds.clamp_inside(12.0) < 10.0);
        assert_eq!(bounds.clamp_inside(5.0), 5.0);

        let lower = Bounds::min_only(0.0);
        assert!(lower.clamp_inside(-3.0) > 0.0);
    }

    #[test]
    fn test_bounds_transform_round_trips() {
        let cases = [
            Bounds::unbounded(),
            Bounds::min_only(5.0),
            Bounds {
                min: NEG_INFINITY,
                max: 5.0,
            },
            Bounds::new(0.0, 10.0).unwrap(),
        ];

        for bounds in cases {
            let transform = BoundsTransform::new(bounds);
            for &internal in &[0.1, 0.5, 1.0] {
                let external = transform.to_external(internal);
                assert!(bounds.is_within_bounds(external));
                let round_trip = transform.to_internal(external).unwrap();
                assert_relative_eq!(internal, round_trip, epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn test_bounds_transform_errors() {
        let transform = BoundsTransform::new(Bounds::new(0.0, 10.0).unwrap());

        assert!(transform.to_internal(-1.0).is_err());
        assert!(transform.to_internal(11.0).is_err());
        assert!(transform.to_internal(INFINITY).is_err());
    }

    #[test]
    fn test_parameter_bounds_vector() {
        let bounds = ParameterBounds::new(vec![
            Bounds::min_only(0.0),
            Bounds::unbounded(),
            Bounds::new(10.0, 1000.0).unwrap(),
        ]);

        let external = array![100.0, 1.2, 300.0];
        let internal = bounds.to_internal(&external).unwrap();
        let back = bounds.to_external(&internal);
        for i in 0..3 {
            assert_relative_eq!(back[i], external[i], max_relative = 1e-10);
        }

        assert!(bounds.to_internal(&array![1.0, 2.0]).is_err());

        let (inside, moved) = bounds.clamp_inside(&array![-1.0, 1.2, 5000.0]).unwrap();
        assert_eq!(moved, vec![0, 2]);
        assert!(inside[0] > 0.0);
        assert!(inside[2] < 1000.0);
    }
}
