//! Gaussian flare component.
//!
//! `amp · exp(−(t − center)² / (2 · width²))`, added on top of the power-law
//! baseline.

use statrs::function::erf::{erf, erfc};
use std::f64::consts::{FRAC_PI_2, SQRT_2};

use crate::error::{LcFitError, Result};

/// A Gaussian pulse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianFlare {
    pub amp: f64,
    pub center: f64,
    pub width: f64,
}

impl GaussianFlare {
    /// Create a flare; the width must be positive.
    pub fn new(amp: f64, center: f64, width: f64) -> Result<Self> {
        if !(width > 0.0 && width.is_finite()) {
            return Err(LcFitError::InvalidInput(format!(
                "Flare width must be positive, got {}",
                width
            )));
        }
        Ok(Self { amp, center, width })
    }

    pub fn value(&self, t: f64) -> f64 {
        let z = (t - self.center) / self.width;
        self.amp * (-0.5 * z * z).exp()
    }

    /// Exact integral over `[a, b]`.
    ///
    /// In the tails the difference of two `erf` values near ±1 loses all
    /// precision, so the complementary function is differenced instead.
    pub fn integral(&self, a: f64, b: f64) -> f64 {
        if b <= a {
            return 0.0;
        }
        let za = (a - self.center) / (SQRT_2 * self.width);
        let zb = (b - self.center) / (SQRT_2 * self.width);

        let diff = if za > 0.0 {
            erfc(za) - erfc(zb)
        } else if zb < 0.0 {
            erfc(-zb) - erfc(-za)
        } else {
            erf(zb) - erf(za)
        };

        self.amp * self.width * FRAC_PI_2.sqrt() * diff
    }

    /// Average over `[a, b]`; a zero-width bin gives the instantaneous value.
    pub fn mean(&self, a: f64, b: f64) -> f64 {
        if b <= a {
            return self.value(a);
        }
        self.integral(a, b) / (b - a)
    }
}
