//! Least-squares problems seen by the solver.
//!
//! A [`Problem`] maps a parameter vector to a residual vector. The
//! light-curve problem returns error-weighted residuals, so the solver's
//! cost is the chi-square. [`BoundedProblem`] lets the unconstrained solver
//! work on parameters that carry physical bounds.

use ndarray::{Array1, Array2};

use crate::error::{LcFitError, Result};
use crate::parameters::ParameterBounds;

/// A nonlinear least-squares problem.
pub trait Problem {
    /// Residuals at `params`, one per data point.
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>>;

    fn parameter_count(&self) -> usize;

    fn residual_count(&self) -> usize;

    /// `J[i, j] = ∂r_i / ∂p_j`.
    ///
    /// Forward differences unless the problem knows its derivatives.
    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>> {
        crate::utils::finite_difference::jacobian(self, params, None)
    }
}

/// Wraps a problem so the solver sees unbounded internal parameters.
///
/// `eval` receives internal values, maps them through the Minuit-style
/// transforms and forwards the external values to the wrapped problem.
pub struct BoundedProblem<'a, P: Problem + ?Sized> {
    inner: &'a P,
    bounds: &'a ParameterBounds,
}

impl<'a, P: Problem + ?Sized> BoundedProblem<'a, P> {
    pub fn new(inner: &'a P, bounds: &'a ParameterBounds) -> Result<Self> {
        if bounds.len() != inner.parameter_count() {
            return Err(LcFitError::DimensionMismatch(format!(
                "problem has {} parameters but {} bounds were given",
                inner.parameter_count(),
                bounds.len()
            )));
        }
        Ok(Self { inner, bounds })
    }

    pub fn to_internal(&self, external: &Array1<f64>) -> Result<Array1<f64>> {
        Ok(self.bounds.to_internal(external)?)
    }

    pub fn to_external(&self, internal: &Array1<f64>) -> Array1<f64> {
        self.bounds.to_external(internal)
    }
}

impl<'a, P: Problem + ?Sized> Problem for BoundedProblem<'a, P> {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        self.inner.eval(&self.to_external(params))
    }

    fn parameter_count(&self) -> usize {
        self.inner.parameter_count()
    }

    fn residual_count(&self) -> usize {
        self.inner.residual_count()
    }
}
