//! Stopping rules.
//!
//! A fit stops on a small relative step (`xtol`), a small relative
//! chi-square decrease (`ftol`), a residual vector nearly orthogonal to every
//! Jacobian column (`gtol`), or an exhausted iteration budget.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::config::LmConfig;

/// Why the solver stopped, or that it has not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvergenceStatus {
    Running,
    ParameterConvergence,
    FunctionValueConvergence,
    GradientConvergence,
    MaxIterationsReached,
    /// The damped system could not be solved even at maximum damping.
    NumericalError,
}

impl ConvergenceStatus {
    pub fn is_terminated(&self) -> bool {
        !matches!(self, ConvergenceStatus::Running)
    }

    /// Stopped on one of the tolerances rather than a budget or failure.
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            ConvergenceStatus::ParameterConvergence
                | ConvergenceStatus::FunctionValueConvergence
                | ConvergenceStatus::GradientConvergence
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            ConvergenceStatus::Running => "still iterating",
            ConvergenceStatus::ParameterConvergence => "converged: parameter step below xtol",
            ConvergenceStatus::FunctionValueConvergence => "converged: chi-square change below ftol",
            ConvergenceStatus::GradientConvergence => "converged: scaled gradient below gtol",
            ConvergenceStatus::MaxIterationsReached => "stopped: iteration budget exhausted",
            ConvergenceStatus::NumericalError => "stopped: Jacobian or damped normal equations unusable",
        }
    }
}

/// Tolerances copied out of an [`LmConfig`].
#[derive(Debug, Clone)]
pub struct ConvergenceCriteria {
    pub xtol: f64,
    pub ftol: f64,
    pub gtol: f64,
    pub max_iterations: usize,
}

impl Default for ConvergenceCriteria {
    fn default() -> Self {
        Self::from_config(&LmConfig::default())
    }
}

impl ConvergenceCriteria {
    pub fn new(xtol: f64, ftol: f64, gtol: f64, max_iterations: usize) -> Self {
        Self {
            xtol,
            ftol,
            gtol,
            max_iterations,
        }
    }

    pub fn from_config(config: &LmConfig) -> Self {
        Self::new(config.xtol, config.ftol, config.gtol, config.max_iterations)
    }

    /// Largest relative parameter change of a step.
    pub fn relative_step(params: &Array1<f64>, step: &Array1<f64>) -> f64 {
        step.iter()
            .zip(params.iter())
            .map(|(d, x)| d.abs() / x.abs().max(1.0))
            .fold(0.0, f64::max)
    }

    /// Largest cosine between the residual vector and a Jacobian column.
    ///
    /// Scale invariant, zero exactly at a stationary point.
    pub fn scaled_gradient(jacobian: &Array2<f64>, residuals: &Array1<f64>) -> f64 {
        let r_norm = residuals.dot(residuals).sqrt();
        if r_norm == 0.0 {
            return 0.0;
        }

        let gradient = jacobian.t().dot(residuals);
        jacobian
            .columns()
            .into_iter()
            .zip(gradient.iter())
            .map(|(column, g)| {
                let c_norm = column.dot(&column).sqrt();
                if c_norm == 0.0 {
                    0.0
                } else {
                    g.abs() / (c_norm * r_norm)
                }
            })
            .fold(0.0, f64::max)
    }

    /// Status after accepting the step `params → new_params`.
    pub fn check(
        &self,
        params: &Array1<f64>,
        new_params: &Array1<f64>,
        cost: f64,
        new_cost: f64,
        iterations: usize,
    ) -> ConvergenceStatus {
        let step = new_params - params;
        if Self::relative_step(params, &step) < self.xtol {
            return ConvergenceStatus::ParameterConvergence;
        }

        // An exact fit has nothing left to reduce.
        if new_cost <= f64::MIN_POSITIVE {
            return ConvergenceStatus::FunctionValueConvergence;
        }

        let cost_change = (cost - new_cost).abs() / cost.max(f64::MIN_POSITIVE);
        if cost_change < self.ftol {
            return ConvergenceStatus::FunctionValueConvergence;
        }

        if iterations >= self.max_iterations {
            return ConvergenceStatus::MaxIterationsReached;
        }

        ConvergenceStatus::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_convergence_criteria() {
        let criteria = ConvergenceCriteria::new(1e-8, 1e-8, 1e-8, 100);

        let params = array![1.0, 2.0, 3.0];
        let new_params = array![1.0 + 1e-10, 2.0, 3.0];
        let status = criteria.check(&params, &new_params, 10.0, 9.9, 50);
        assert_eq!(status, ConvergenceStatus::ParameterConvergence);

        let new_params = array![1.1, 2.1, 3.1];
        let status = criteria.check(&params, &new_params, 10.0, 9.9999999999, 50);
        assert_eq!(status, ConvergenceStatus::FunctionValueConvergence);

        let status = criteria.check(&params, &new_params, 10.0, 0.0, 50);
        assert_eq!(status, ConvergenceStatus::FunctionValueConvergence);

        let status = criteria.check(&params, &new_params, 10.0, 9.0, 100);
        assert_eq!(status, ConvergenceStatus::MaxIterationsReached);

        let status = criteria.check(&params, &new_params, 10.0, 9.0, 50);
        assert_eq!(status, ConvergenceStatus::Running);
    }

    #[test]
    fn test_scaled_gradient() {
        let jacobian = array![[1.0, 0.0], [0.0, 1.0]];
        assert_eq!(ConvergenceCriteria::scaled_gradient(&jacobian, &array![0.0, 0.0]), 0.0);

        // Residual orthogonal to the column space
        let jacobian = array![[1.0], [0.0]];
        assert_eq!(ConvergenceCriteria::scaled_gradient(&jacobian, &array![0.0, 3.0]), 0.0);
        assert!((ConvergenceCriteria::scaled_gradient(&jacobian, &array![3.0, 0.0]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_convergence_status_methods() {
        assert!(!ConvergenceStatus::Running.is_terminated());
        assert!(ConvergenceStatus::ParameterConvergence.is_terminated());
        assert!(ConvergenceStatus::NumericalError.is_terminated());

        assert!(ConvergenceStatus::GradientConvergence.is_converged());
        assert!(!ConvergenceStatus::MaxIterationsReached.is_converged());
        assert!(!ConvergenceStatus::NumericalError.is_converged());
    }
}
