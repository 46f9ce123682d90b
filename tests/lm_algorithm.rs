//! Integration tests for the Levenberg-Marquardt algorithm.

use approx::assert_relative_eq;
use grb_lcfit::lm::{ConvergenceStatus, LevenbergMarquardt, LmConfig};
use grb_lcfit::parameters::{Bounds, ParameterBounds};
use grb_lcfit::problem::BoundedProblem;
use grb_lcfit::{LcFitError, Problem, Result};
use ndarray::{array, Array1, Array2};

/// Test Problem: Simple 1D linear function f(x) = a*x + b
struct LinearProblem {
    x_data: Array1<f64>,
    y_data: Array1<f64>,
}

impl Problem for LinearProblem {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        if params.len() != 2 {
            return Err(LcFitError::DimensionMismatch(format!(
                "Expected 2 parameters, got {}",
                params.len()
            )));
        }

        Ok(self
            .x_data
            .iter()
            .zip(self.y_data.iter())
            .map(|(x, y)| params[0] * x + params[1] - y)
            .collect())
    }

    fn parameter_count(&self) -> usize {
        2
    }

    fn residual_count(&self) -> usize {
        self.x_data.len()
    }

    fn jacobian(&self, _params: &Array1<f64>) -> Result<Array2<f64>> {
        let n = self.x_data.len();
        let mut jac = Array2::zeros((n, 2));
        for i in 0..n {
            jac[[i, 0]] = self.x_data[i];
            jac[[i, 1]] = 1.0;
        }
        Ok(jac)
    }
}

/// Test Problem: Rosenbrock function as residuals `1 − x` and `10(y − x²)`.
struct RosenbrockProblem;

impl Problem for RosenbrockProblem {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let (x, y) = (params[0], params[1]);
        Ok(array![1.0 - x, 10.0 * (y - x.powi(2))])
    }

    fn parameter_count(&self) -> usize {
        2
    }

    fn residual_count(&self) -> usize {
        2
    }

    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>> {
        Ok(array![[-1.0, 0.0], [-20.0 * params[0], 10.0]])
    }
}

/// Test Problem: weighted power-law decay `norm · t^(−slope)`, finite-difference Jacobian.
struct DecayProblem {
    t: Array1<f64>,
    rate: Array1<f64>,
    err: Array1<f64>,
}

impl Problem for DecayProblem {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let model = self.t.mapv(|t| params[0] * t.powf(-params[1]));
        Ok((&self.rate - &model) / &self.err)
    }

    fn parameter_count(&self) -> usize {
        2
    }

    fn residual_count(&self) -> usize {
        self.t.len()
    }
}

fn decay(norm: f64, slope: f64) -> DecayProblem {
    let t = Array1::logspace(10.0, 1.0, 4.0, 20);
    let rate = t.mapv(|t: f64| norm * t.powf(-slope));
    let err = rate.mapv(|r| 0.05 * r);
    DecayProblem { t, rate, err }
}

#[test]
fn test_linear_fitting() {
    let problem = LinearProblem {
        x_data: array![0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
        y_data: array![2.1, 4.9, 8.05, 10.8, 14.1, 17.0],
    };

    let result = LevenbergMarquardt::new()
        .minimize(&problem, array![1.0, 1.0])
        .unwrap();

    assert!(result.success);
    assert_relative_eq!(result.params[0], 3.0, epsilon = 0.1);
    assert_relative_eq!(result.params[1], 2.0, epsilon = 0.1);
    assert!(result.cost < 0.1);
}

#[test]
fn test_rosenbrock_optimization() {
    let config = LmConfig {
        max_iterations: 200,
        ftol: 1e-10,
        xtol: 1e-10,
        gtol: 1e-10,
        ..LmConfig::default()
    };

    let result = LevenbergMarquardt::with_config(config)
        .minimize(&RosenbrockProblem, array![-1.2, 1.0])
        .unwrap();

    assert!(result.success);
    assert_relative_eq!(result.params[0], 1.0, epsilon = 1e-4);
    assert_relative_eq!(result.params[1], 1.0, epsilon = 1e-4);
    assert!(result.cost < 1e-8);
}

#[test]
fn test_power_law_decay_with_finite_differences() {
    let problem = decay(300.0, 1.4);
    let result = LevenbergMarquardt::new()
        .minimize(&problem, array![30.0, 0.5])
        .unwrap();

    assert!(result.success);
    assert_relative_eq!(result.params[0], 300.0, max_relative = 1e-4);
    assert_relative_eq!(result.params[1], 1.4, max_relative = 1e-5);
}

#[test]
fn test_bounded_decay_stays_inside() {
    let problem = decay(300.0, 1.4);
    let bounds = ParameterBounds::new(vec![Bounds::min_only(0.0), Bounds::new(0.0, 3.0).unwrap()]);
    let bounded = BoundedProblem::new(&problem, &bounds).unwrap();

    let start = bounded.to_internal(&array![30.0, 0.5]).unwrap();
    let result = LevenbergMarquardt::new().minimize(&bounded, start).unwrap();
    let best = bounded.to_external(&result.params);

    assert!(result.success);
    assert_relative_eq!(best[0], 300.0, max_relative = 1e-3);
    assert_relative_eq!(best[1], 1.4, max_relative = 1e-4);
}

#[test]
fn test_iteration_budget() {
    let problem = decay(300.0, 1.4);
    let result = LevenbergMarquardt::new()
        .with_max_iterations(2)
        .minimize(&problem, array![1.0, 0.1])
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.status, ConvergenceStatus::MaxIterationsReached);
    assert!(result.iterations <= 2);
}

#[test]
fn test_wrong_parameter_count() {
    let problem = decay(300.0, 1.4);
    assert!(matches!(
        LevenbergMarquardt::new().minimize(&problem, array![1.0]),
        Err(LcFitError::DimensionMismatch(_))
    ));
}
