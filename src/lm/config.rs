//! Solver settings.
//!
//! Read from the `solver` table of a run configuration. Keys left out of
//! the file keep the defaults below.

use serde::{Deserialize, Serialize};

use crate::error::{LcFitError, Result};

/// Tolerances, iteration budget and damping schedule of the solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmConfig {
    /// Accepted steps before giving up. Default: 500
    pub max_iterations: usize,

    /// Relative chi-square decrease below which the fit has converged. Default: 1e-8
    pub ftol: f64,

    /// Relative parameter step below which the fit has converged. Default: 1e-8
    pub xtol: f64,

    /// Largest residual/Jacobian-column cosine at a converged fit. Default: 1e-8
    pub gtol: f64,

    /// Starting damping. Default: 1e-3
    pub initial_lambda: f64,

    /// Damping multiplier after a rejected step. Default: 10
    pub lambda_up_factor: f64,

    /// Damping multiplier after a good step. Default: 0.1
    pub lambda_down_factor: f64,

    /// Default: 1e-10
    pub min_lambda: f64,

    /// Damping at which the solver stops retrying. Default: 1e10
    pub max_lambda: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-8,
            initial_lambda: 1e-3,
            lambda_up_factor: 10.0,
            lambda_down_factor: 0.1,
            min_lambda: 1e-10,
            max_lambda: 1e10,
        }
    }
}

impl LmConfig {
    /// Reject settings the solver cannot make progress with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |what: &str| Err(LcFitError::InvalidInput(format!("solver setting {}", what)));

        if self.max_iterations == 0 {
            return invalid("max_iterations must be at least 1");
        }
        for (name, tol) in [("ftol", self.ftol), ("xtol", self.xtol), ("gtol", self.gtol)] {
            if !(tol.is_finite() && tol >= 0.0) {
                return invalid(&format!("{} must be finite and non-negative, got {}", name, tol));
            }
        }
        if !(self.min_lambda > 0.0 && self.min_lambda <= self.initial_lambda && self.initial_lambda <= self.max_lambda) {
            return invalid("damping must satisfy 0 < min_lambda <= initial_lambda <= max_lambda");
        }
        if !(self.lambda_up_factor > 1.0 && self.lambda_down_factor > 0.0 && self.lambda_down_factor < 1.0) {
            return invalid("lambda_up_factor must exceed 1 and lambda_down_factor lie in (0, 1)");
        }
        Ok(())
    }
}
