//! Damped normal-equation step.

use nalgebra::DMatrix;
use ndarray::{Array1, Array2};

use crate::error::{LcFitError, Result};
use crate::utils::matrix_convert::{nalgebra_vec_to_ndarray, ndarray_to_nalgebra, ndarray_vec_to_nalgebra};

/// Result of a Levenberg-Marquardt step calculation.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// The calculated step vector
    pub step: Array1<f64>,

    /// The predicted reduction in cost function value
    pub predicted_reduction: f64,

    /// The damping parameter used to calculate the step
    pub lambda: f64,
}

/// Handles step calculation for the Levenberg-Marquardt algorithm.
pub struct LmStep;

impl LmStep {
    /// Calculates the Levenberg-Marquardt step.
    ///
    /// Solves `(JᵀJ + λ·diag(JᵀJ)) δ = -Jᵀr`. The diagonal scaling makes the
    /// damping insensitive to the very different magnitudes of normalisations,
    /// slopes and break times.
    pub fn calculate_step(jacobian: &Array2<f64>, residuals: &Array1<f64>, lambda: f64) -> Result<StepResult> {
        let j_t_j = jacobian.t().dot(jacobian);
        let j_t_r = jacobian.t().dot(residuals);

        let max_diag = j_t_j.diag().iter().fold(0.0_f64, |acc, &d| acc.max(d));
        let floor = (max_diag * 1e-12).max(f64::MIN_POSITIVE);

        let mut augmented = j_t_j;
        for i in 0..augmented.nrows() {
            augmented[[i, i]] += lambda * augmented[[i, i]].max(floor);
        }

        let step = Self::solve(&ndarray_to_nalgebra(&augmented), &(-&j_t_r))?;

        let cost = residuals.dot(residuals);
        let linearized = residuals + &jacobian.dot(&step);
        let predicted_reduction = cost - linearized.dot(&linearized);

        Ok(StepResult {
            step,
            predicted_reduction,
            lambda,
        })
    }

    /// Solves the linear system A * x = b, Cholesky first with an LU fallback.
    fn solve(a: &DMatrix<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
        let rhs = ndarray_vec_to_nalgebra(b);

        if let Some(chol) = a.clone().cholesky() {
            return Ok(nalgebra_vec_to_ndarray(&chol.solve(&rhs)));
        }

        a.clone()
            .lu()
            .solve(&rhs)
            .map(|x| nalgebra_vec_to_ndarray(&x))
            .filter(|x| x.iter().all(|v| v.is_finite()))
            .ok_or_else(|| LcFitError::LinearAlgebraError("Linear system solution failed".to_string()))
    }
}
