//! # Covariance Matrix Calculations
//!
//! This module provides functions for calculating and manipulating covariance
//! matrices from Jacobian matrices in nonlinear least-squares optimization.

use ndarray::{Array1, Array2};

use crate::error::{LcFitError, Result};
use crate::utils::matrix_convert::{nalgebra_to_ndarray, ndarray_to_nalgebra};

/// Reciprocal condition number below which `JᵀJ` is treated as singular.
const RCOND_LIMIT: f64 = 1e-15;

/// Calculate covariance matrix from Jacobian matrix.
///
/// For nonlinear least-squares problems, the covariance matrix is estimated as:
///   covar = scale * inv(J^T * J)
/// where `scale` is the reduced chi-square, or 1 when the data errors are
/// taken as absolute.
///
/// Fails with `LinearAlgebraError` when `JᵀJ` is singular or too badly
/// conditioned for the inverse to mean anything.
pub fn calculate_covariance(jacobian: &Array2<f64>, scale: f64) -> Result<Array2<f64>> {
    let jtj = ndarray_to_nalgebra(&jacobian.t().dot(jacobian));

    if jtj.iter().any(|v| !v.is_finite()) {
        return Err(LcFitError::LinearAlgebraError(
            "Jacobian contains non-finite entries".to_string(),
        ));
    }

    let singular_values = jtj.clone().svd(false, false).singular_values;
    let max_sv = singular_values.max();
    let min_sv = singular_values.min();
    if max_sv <= 0.0 || min_sv / max_sv < RCOND_LIMIT {
        return Err(LcFitError::LinearAlgebraError(format!(
            "J^T J is singular (reciprocal condition {:.3e})",
            if max_sv > 0.0 { min_sv / max_sv } else { 0.0 }
        )));
    }

    let inverse = match jtj.clone().cholesky() {
        Some(chol) => chol.inverse(),
        None => jtj
            .try_inverse()
            .ok_or_else(|| LcFitError::LinearAlgebraError("J^T J is not invertible".to_string()))?,
    };

    Ok(nalgebra_to_ndarray(&inverse) * scale)
}

/// Calculate correlation matrix from covariance matrix.
///
/// The correlation matrix is calculated as:
///   correl[i,j] = covar[i,j] / sqrt(covar[i,i] * covar[j,j])
pub fn calculate_correlation(covar: &Array2<f64>) -> Array2<f64> {
    let n = covar.nrows();
    Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j {
            1.0
        } else {
            let denom = (covar[[i, i]] * covar[[j, j]]).sqrt();
            if denom > 0.0 {
                covar[[i, j]] / denom
            } else {
                0.0
            }
        }
    })
}

/// Extract standard errors from the covariance matrix.
///
/// Standard errors are the square roots of the diagonal elements. A negative
/// diagonal entry has no meaningful error and yields NaN.
pub fn standard_errors_from_covariance(covar: &Array2<f64>) -> Array1<f64> {
    covar.diag().mapv(|v| if v >= 0.0 { v.sqrt() } else { f64::NAN })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr2;

    #[test]
    fn test_calculate_covariance() {
        let jacobian = arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);

        let covar = calculate_covariance(&jacobian, 2.0).unwrap();

        // J^T J = [[35, 44], [44, 56]], det = 24
        assert_relative_eq!(covar[[0, 0]], 2.0 * 56.0 / 24.0, max_relative = 1e-10);
        assert_relative_eq!(covar[[0, 1]], -2.0 * 44.0 / 24.0, max_relative = 1e-10);
        assert_relative_eq!(covar[[1, 0]], covar[[0, 1]], max_relative = 1e-10);
        assert_relative_eq!(covar[[1, 1]], 2.0 * 35.0 / 24.0, max_relative = 1e-10);
    }

    #[test]
    fn test_singular_jacobian_is_rejected() {
        let jacobian = arr2(&[[1.0, 2.0], [2.0, 4.0], [3.0, 6.0]]);
        assert!(matches!(
            calculate_covariance(&jacobian, 1.0),
            Err(LcFitError::LinearAlgebraError(_))
        ));

        let zero_column = arr2(&[[1.0, 0.0], [2.0, 0.0]]);
        assert!(calculate_covariance(&zero_column, 1.0).is_err());
    }

    #[test]
    fn test_calculate_correlation() {
        let covar = arr2(&[[0.1, 0.05], [0.05, 0.2]]);

        let correl = calculate_correlation(&covar);

        assert_eq!(correl[[0, 0]], 1.0);
        assert_eq!(correl[[1, 1]], 1.0);
        let expected = 0.05 / (0.1f64 * 0.2f64).sqrt();
        assert_relative_eq!(correl[[0, 1]], expected, epsilon = 1e-10);
        assert_relative_eq!(correl[[1, 0]], expected, epsilon = 1e-10);
    }

    #[test]
    fn test_standard_errors_from_covariance() {
        let covar = arr2(&[[0.1, 0.05], [0.05, -0.2]]);

        let errors = standard_errors_from_covariance(&covar);

        assert_relative_eq!(errors[0], 0.1f64.sqrt(), epsilon = 1e-10);
        assert!(errors[1].is_nan());
    }
}
