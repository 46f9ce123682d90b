//! Damped Gauss-Newton iteration.
//!
//! Each iteration solves `(JᵀJ + λ·diag(JᵀJ)) δ = −Jᵀr`, scores the trial
//! point by its gain ratio and adapts λ. Bounds are not handled here; wrap the
//! problem in a `BoundedProblem` to fit in unconstrained coordinates.

use ndarray::{Array1, Array2};
use std::fmt;
use tracing::{debug, trace, warn};

use crate::error::{LcFitError, Result};
use crate::problem::Problem;

use super::config::LmConfig;
use super::convergence::{ConvergenceCriteria, ConvergenceStatus};
use super::step::LmStep;
use super::trust_region::TrustRegion;

/// Where the iteration stopped and why.
#[derive(Debug, Clone)]
pub struct LmResult {
    /// Best point reached, in the problem's own coordinates
    pub params: Array1<f64>,

    pub residuals: Array1<f64>,

    /// `Σ r²`; the chi-square when residuals are error-weighted
    pub cost: f64,

    /// Accepted and rejected steps
    pub iterations: usize,

    /// Residual evaluations, counting those spent on Jacobians
    pub func_evals: usize,

    /// True only for the converged statuses
    pub success: bool,

    pub status: ConvergenceStatus,

    pub message: String,
}

impl fmt::Display for LmResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} after {} iteration(s)", self.message, self.iterations)?;
        writeln!(f, "  chi-square: {:.6e} ({} evaluations)", self.cost, self.func_evals)?;
        write!(f, "  parameters:")?;
        for p in self.params.iter() {
            write!(f, " {:.6e}", p)?;
        }
        writeln!(f)
    }
}

/// Levenberg-Marquardt least-squares solver.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    config: LmConfig,
}

impl LevenbergMarquardt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.config.ftol = ftol;
        self
    }

    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.config.xtol = xtol;
        self
    }

    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.config.gtol = gtol;
        self
    }

    /// Starting damping; larger values take shorter, gradient-like first steps.
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.config.initial_lambda = lambda;
        self
    }

    /// Minimize `Σ r²` starting from `initial_params`.
    ///
    /// Failing to converge is not an error: the result carries
    /// `success == false` and the best parameters reached. That includes a
    /// Jacobian that cannot be evaluated at an accepted point. Errors are
    /// reserved for bad input (dimension mismatch, non-finite starting cost).
    ///
    /// Trial points whose evaluation fails or produces a non-finite cost are
    /// rejected like any other bad step.
    pub fn minimize<P: Problem + ?Sized>(&self, problem: &P, initial_params: Array1<f64>) -> Result<LmResult> {
        let n_params = problem.parameter_count();
        if initial_params.len() != n_params {
            return Err(LcFitError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                n_params,
                initial_params.len()
            )));
        }

        let criteria = ConvergenceCriteria::from_config(&self.config);
        let mut trust_region = TrustRegion::from_config(&self.config);

        let mut params = initial_params;
        let mut residuals = problem.eval(&params)?;
        let mut cost = residuals.dot(&residuals);
        let mut func_evals = 1;

        if !cost.is_finite() {
            return Err(LcFitError::InvalidInput(
                "Cost at the initial parameters is not finite".to_string(),
            ));
        }

        let mut iterations = 0;
        let mut jacobian: Option<Array2<f64>> = None;

        let status = loop {
            if iterations >= self.config.max_iterations {
                break ConvergenceStatus::MaxIterationsReached;
            }

            let jac = match jacobian.take() {
                Some(jac) => jac,
                None => {
                    func_evals += n_params;
                    match problem.jacobian(&params) {
                        Ok(jac) => jac,
                        Err(e) => {
                            warn!(iteration = iterations, "Jacobian evaluation failed: {}", e);
                            break ConvergenceStatus::NumericalError;
                        }
                    }
                }
            };

            if ConvergenceCriteria::scaled_gradient(&jac, &residuals) < criteria.gtol {
                break ConvergenceStatus::GradientConvergence;
            }

            iterations += 1;

            let step = match LmStep::calculate_step(&jac, &residuals, trust_region.lambda) {
                Ok(step) => step,
                Err(e) => {
                    trace!(lambda = trust_region.lambda, "step solve failed: {}", e);
                    if trust_region.is_saturated() {
                        break ConvergenceStatus::NumericalError;
                    }
                    trust_region.update_lambda(0.0);
                    jacobian = Some(jac);
                    continue;
                }
            };

            let new_params = &params + &step.step;
            func_evals += 1;
            let trial = problem
                .eval(&new_params)
                .ok()
                .map(|r| {
                    let c = r.dot(&r);
                    (r, c)
                })
                .filter(|(_, c)| c.is_finite());

            let new_cost = trial.as_ref().map_or(f64::INFINITY, |(_, c)| *c);
            let gain = TrustRegion::gain_ratio(cost, new_cost, step.predicted_reduction);
            trace!(iteration = iterations, cost, new_cost, gain, lambda = step.lambda);

            match trial {
                Some((new_residuals, new_cost)) if trust_region.update_lambda(gain) => {
                    let status = criteria.check(&params, &new_params, cost, new_cost, iterations);
                    params = new_params;
                    residuals = new_residuals;
                    cost = new_cost;
                    if status.is_terminated() {
                        break status;
                    }
                }
                rejected => {
                    if rejected.is_none() {
                        trust_region.update_lambda(0.0);
                    }
                    jacobian = Some(jac);

                    // A step too small to change anything means we are at the minimum.
                    if ConvergenceCriteria::relative_step(&params, &step.step) < criteria.xtol {
                        break ConvergenceStatus::ParameterConvergence;
                    }
                    if trust_region.is_saturated() && step.predicted_reduction <= cost * f64::EPSILON {
                        break ConvergenceStatus::FunctionValueConvergence;
                    }
                }
            }
        };

        let success = status.is_converged();
        debug!(iterations, func_evals, cost, success, "{}", status.description());

        Ok(LmResult {
            params,
            residuals,
            cost,
            iterations,
            func_evals,
            success,
            status,
            message: status.description().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    /// Straight line `a·x + b` in log-log space.
    struct LinearModel {
        x_data: Array1<f64>,
        y_data: Array1<f64>,
    }

    impl Problem for LinearModel {
        fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
            let a = params[0];
            let b = params[1];
            Ok(self
                .x_data
                .iter()
                .zip(self.y_data.iter())
                .map(|(x, y)| a * x + b - y)
                .collect())
        }

        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            self.x_data.len()
        }
    }

    /// Exponential cutoff `a·exp(−k·x)`.
    struct Decay {
        x: Array1<f64>,
        y: Array1<f64>,
    }

    impl Problem for Decay {
        fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
            Ok(self
                .x
                .iter()
                .zip(self.y.iter())
                .map(|(x, y)| params[0] * (-params[1] * x).exp() - y)
                .collect())
        }

        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            self.x.len()
        }
    }

    #[test]
    fn test_linear_fit() {
        let x = array![1.0, 2.0, 3.0, 4.0, 5.0];
        let y = array![3.0, 5.0, 7.0, 9.0, 11.0];
        let problem = LinearModel { x_data: x, y_data: y };

        let result = LevenbergMarquardt::new().minimize(&problem, array![1.0, 0.0]).unwrap();

        assert!(result.success, "{}", result.message);
        assert_relative_eq!(result.params[0], 2.0, epsilon = 1e-5);
        assert_relative_eq!(result.params[1], 1.0, epsilon = 1e-5);
        assert!(result.cost < 1e-10);
    }

    #[test]
    fn test_nonlinear_fit() {
        let x = Array1::linspace(0.0, 4.0, 30);
        let y = x.mapv(|x: f64| 5.0 * (-0.7 * x).exp());
        let problem = Decay { x, y };

        let result = LevenbergMarquardt::new().minimize(&problem, array![1.0, 0.1]).unwrap();

        assert!(result.success, "{}", result.message);
        assert_relative_eq!(result.params[0], 5.0, max_relative = 1e-5);
        assert_relative_eq!(result.params[1], 0.7, max_relative = 1e-5);
    }

    #[test]
    fn test_max_iterations_is_not_an_error() {
        let x = Array1::linspace(0.0, 4.0, 30);
        let y = x.mapv(|x: f64| 5.0 * (-0.7 * x).exp());
        let problem = Decay { x, y };

        let result = LevenbergMarquardt::new()
            .with_max_iterations(1)
            .minimize(&problem, array![1.0, 0.1])
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.status, ConvergenceStatus::MaxIterationsReached);
        assert_eq!(result.iterations, 1);
    }

    /// Evaluates fine but has no usable derivatives.
    struct NoJacobian(LinearModel);

    impl Problem for NoJacobian {
        fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
            self.0.eval(params)
        }

        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            self.0.residual_count()
        }

        fn jacobian(&self, _params: &Array1<f64>) -> Result<Array2<f64>> {
            Err(LcFitError::InvalidInput("model undefined near these parameters".to_string()))
        }
    }

    #[test]
    fn test_jacobian_failure_returns_partial_result() {
        let problem = NoJacobian(LinearModel {
            x_data: array![1.0, 2.0, 3.0],
            y_data: array![3.0, 5.0, 7.0],
        });

        let result = LevenbergMarquardt::new().minimize(&problem, array![1.0, 0.0]).unwrap();

        assert!(!result.success);
        assert_eq!(result.status, ConvergenceStatus::NumericalError);
        assert_eq!(result.params, array![1.0, 0.0]);
        assert_eq!(result.iterations, 0);
        assert!(result.cost.is_finite());
    }

    #[test]
    fn test_dimension_mismatch() {
        let problem = LinearModel {
            x_data: array![1.0, 2.0],
            y_data: array![1.0, 2.0],
        };
        let err = LevenbergMarquardt::new().minimize(&problem, array![1.0]).unwrap_err();
        assert!(matches!(err, LcFitError::DimensionMismatch(_)));
    }
}
