//! Finite-difference Jacobians.
//!
//! The light-curve models are only known through their values, so both the
//! optimizer and the covariance estimate work from numerical derivatives.
//! Steps are relative to the parameter magnitude, which matters here: a
//! normalisation near 1e4 and a slope near 1 share one parameter vector.

use crate::error::{LcFitError, Result};
use crate::problem::Problem;
use ndarray::{Array1, Array2};

/// Relative step for forward differences.
const FORWARD_STEP: f64 = 1e-8;

/// Relative step for central differences, near the cube root of machine epsilon.
const CENTRAL_STEP: f64 = 6e-6;

#[derive(Debug, Clone, Copy)]
enum Scheme {
    Forward,
    Central,
}

/// Absolute step for one parameter; falls back to `rel` itself near zero.
fn step_size(value: f64, rel: f64) -> f64 {
    (value.abs() * rel).max(rel)
}

fn residuals_at<P: Problem + ?Sized>(problem: &P, params: &Array1<f64>) -> Result<Array1<f64>> {
    let residuals = problem.eval(params)?;
    if residuals.len() != problem.residual_count() {
        return Err(LcFitError::DimensionMismatch(format!(
            "problem declares {} residuals but returned {}",
            problem.residual_count(),
            residuals.len()
        )));
    }
    Ok(residuals)
}

fn differentiate<P: Problem + ?Sized>(
    problem: &P,
    params: &Array1<f64>,
    rel: f64,
    scheme: Scheme,
) -> Result<Array2<f64>> {
    let base = match scheme {
        Scheme::Forward => Some(residuals_at(problem, params)?),
        Scheme::Central => None,
    };
    let mut jac = Array2::zeros((problem.residual_count(), params.len()));

    for (j, mut column) in jac.columns_mut().into_iter().enumerate() {
        let h = step_size(params[j], rel);
        let mut up = params.clone();
        up[j] += h;
        let r_up = residuals_at(problem, &up)?;

        match &base {
            Some(r0) => column.assign(&((&r_up - r0) / h)),
            None => {
                let mut down = params.clone();
                down[j] -= h;
                let r_down = residuals_at(problem, &down)?;
                column.assign(&((&r_up - &r_down) / (2.0 * h)));
            }
        }
    }

    Ok(jac)
}

/// Forward-difference Jacobian, `J[i, j] = ∂r_i / ∂p_j`.
///
/// `epsilon` overrides the relative step.
pub fn jacobian<P: Problem + ?Sized>(
    problem: &P,
    params: &Array1<f64>,
    epsilon: Option<f64>,
) -> Result<Array2<f64>> {
    differentiate(problem, params, epsilon.unwrap_or(FORWARD_STEP), Scheme::Forward)
}

/// Central-difference Jacobian.
///
/// Twice the evaluations of [`jacobian`] with second-order accuracy; used at
/// the solution, where the covariance matrix is built.
pub fn jacobian_central<P: Problem + ?Sized>(
    problem: &P,
    params: &Array1<f64>,
    epsilon: Option<f64>,
) -> Result<Array2<f64>> {
    differentiate(problem, params, epsilon.unwrap_or(CENTRAL_STEP), Scheme::Central)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    /// Residuals `norm · t^(−slope)` at three fixed times.
    struct Decay;

    impl Problem for Decay {
        fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
            Ok(array![10.0, 100.0, 1000.0].mapv(|t: f64| params[0] * t.powf(-params[1])))
        }

        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            3
        }
    }

    fn analytic(norm: f64, slope: f64) -> Array2<f64> {
        let mut jac = Array2::zeros((3, 2));
        for (i, t) in [10.0f64, 100.0, 1000.0].into_iter().enumerate() {
            jac[[i, 0]] = t.powf(-slope);
            jac[[i, 1]] = -norm * t.powf(-slope) * t.ln();
        }
        jac
    }

    #[test]
    fn test_forward_matches_analytic() {
        let jac = jacobian(&Decay, &array![500.0, 1.2], None).unwrap();
        let expected = analytic(500.0, 1.2);
        for (a, b) in jac.iter().zip(expected.iter()) {
            assert_relative_eq!(*a, *b, max_relative = 1e-5);
        }
    }

    #[test]
    fn test_central_is_more_accurate() {
        let params = array![500.0, 1.2];
        let expected = analytic(500.0, 1.2);
        let forward = jacobian(&Decay, &params, None).unwrap();
        let central = jacobian_central(&Decay, &params, None).unwrap();

        for (c, e) in central.iter().zip(expected.iter()) {
            assert_relative_eq!(*c, *e, max_relative = 1e-8);
        }
        let err = |jac: &Array2<f64>| (jac - &expected).mapv(f64::abs).sum();
        assert!(err(&central) <= err(&forward));
    }

    #[test]
    fn test_step_near_zero() {
        assert_eq!(step_size(0.0, 1e-8), 1e-8);
        assert_eq!(step_size(1e4, 1e-8), 1e-4);
    }

    #[test]
    fn test_residual_count_is_checked() {
        struct Liar;
        impl Problem for Liar {
            fn eval(&self, _params: &Array1<f64>) -> Result<Array1<f64>> {
                Ok(array![1.0])
            }
            fn parameter_count(&self) -> usize {
                1
            }
            fn residual_count(&self) -> usize {
                2
            }
        }

        let problem: &dyn Problem = &Liar;
        assert!(matches!(
            jacobian(problem, &array![1.0], None),
            Err(LcFitError::DimensionMismatch(_))
        ));
    }
}
