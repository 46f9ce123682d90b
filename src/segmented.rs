//! Segmented log-log initial guess.
//!
//! Splits the light curve at the picked break times and fits a straight line
//! to `(log10 t, log10 rate)` in every segment. The first segment fixes
//! `norm`, every segment contributes its decay index, and the breaks are
//! passed through unchanged. No non-linear search happens here.

use ndarray::Array1;
use tracing::debug;

use crate::error::{LcFitError, Result};
use crate::models::{select_model, ModelSpec};
use crate::report::{chi_square, DofConvention, FitResult};

/// Straight line in log-log space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogLine {
    pub intercept: f64,
    pub slope: f64,
}

impl LogLine {
    /// Ordinary least squares through `(x, y)`; needs two distinct `x`.
    fn fit(x: &[f64], y: &[f64]) -> Option<Self> {
        let n = x.len() as f64;
        let mean_x = x.iter().sum::<f64>() / n;
        let mean_y = y.iter().sum::<f64>() / n;
        let sxx: f64 = x.iter().map(|xi| (xi - mean_x).powi(2)).sum();
        if !(sxx > 0.0) {
            return None;
        }
        let sxy: f64 = x.iter().zip(y).map(|(xi, yi)| (xi - mean_x) * (yi - mean_y)).sum();
        let slope = sxy / sxx;
        Some(Self {
            intercept: mean_y - slope * mean_x,
            slope,
        })
    }

    pub fn predict(&self, t: f64) -> f64 {
        10f64.powf(self.intercept + self.slope * t.log10())
    }
}

/// Output of [`segmented_fit`].
#[derive(Debug, Clone)]
pub struct SegmentedFit {
    model: ModelSpec,
    params: Vec<f64>,
    lines: Vec<LogLine>,
    time: Array1<f64>,
    rate: Array1<f64>,
    prediction: Array1<f64>,
}

impl SegmentedFit {
    /// Flare-free model matching the number of breaks.
    pub fn model(&self) -> ModelSpec {
        self.model
    }

    /// `[norm, pow1, break1, pow2, …]`.
    pub fn params(&self) -> &[f64] {
        &self.params
    }

    pub fn param_names(&self) -> Vec<String> {
        self.model.param_names()
    }

    /// Per-segment regression lines.
    pub fn lines(&self) -> &[LogLine] {
        &self.lines
    }

    /// Each point predicted by its own segment line, in input order.
    pub fn prediction(&self) -> &Array1<f64> {
        &self.prediction
    }

    /// Package the guess as a result with zero errors.
    ///
    /// Chi-square uses the continuous model, like the refiner.
    pub fn to_fit_result(&self, rate_err: &Array1<f64>, dof: DofConvention) -> Result<FitResult> {
        let chi2 = chi_square(&self.model, &self.params, &self.time, &self.rate, rate_err)?;
        FitResult::initial_guess(
            self.model,
            self.params.clone(),
            chi2,
            dof.degrees_of_freedom(self.time.len(), self.model.param_count()),
        )
    }
}

fn validate(time: &Array1<f64>, rate: &Array1<f64>, breaks: &[f64]) -> Result<()> {
    if time.is_empty() {
        return Err(LcFitError::InvalidInput("empty light curve".to_string()));
    }
    if time.len() != rate.len() {
        return Err(LcFitError::DimensionMismatch(format!(
            "{} times but {} rates",
            time.len(),
            rate.len()
        )));
    }
    if let Some(bad) = time.iter().chain(rate.iter()).find(|v| !(v.is_finite() && **v > 0.0)) {
        return Err(LcFitError::InvalidInput(format!(
            "times and rates must be positive, found {}",
            bad
        )));
    }
    if breaks.iter().any(|b| !b.is_finite()) || breaks.windows(2).any(|w| w[1] <= w[0]) {
        return Err(LcFitError::InvalidInput(format!(
            "break times must be strictly increasing: {:?}",
            breaks
        )));
    }
    Ok(())
}

/// Piecewise log-log regression at the given break times.
///
/// A sample belongs to segment `i` when `b_i < t ≤ b_{i+1}`, with outer
/// boundaries `min(t) − 1` and `max(t)`.
pub fn segmented_fit(time: &Array1<f64>, rate: &Array1<f64>, breaks: &[f64]) -> Result<SegmentedFit> {
    validate(time, rate, breaks)?;
    let model = select_model(0, breaks.len())?;

    let t_min = time.iter().copied().fold(f64::INFINITY, f64::min);
    let t_max = time.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut boundaries = Vec::with_capacity(breaks.len() + 2);
    boundaries.push(t_min - 1.0);
    boundaries.extend_from_slice(breaks);
    boundaries.push(t_max);

    let mut lines = Vec::with_capacity(breaks.len() + 1);
    let mut segment_of = vec![0; time.len()];
    for (seg, edges) in boundaries.windows(2).enumerate() {
        let members: Vec<usize> = (0..time.len())
            .filter(|&i| time[i] > edges[0] && time[i] <= edges[1])
            .collect();
        let x: Vec<f64> = members.iter().map(|&i| time[i].log10()).collect();
        let y: Vec<f64> = members.iter().map(|&i| rate[i].log10()).collect();

        let line = LogLine::fit(&x, &y).ok_or_else(|| {
            LcFitError::InvalidInput(format!(
                "segment {} ({:.4e}, {:.4e}] has fewer than two distinct times",
                seg + 1,
                edges[0],
                edges[1]
            ))
        })?;
        debug!(
            "segment {}: {} points, slope {:.4}",
            seg + 1,
            members.len(),
            line.slope
        );
        for i in members {
            segment_of[i] = seg;
        }
        lines.push(line);
    }

    let mut params = Vec::with_capacity(model.param_count());
    params.push(10f64.powf(lines[0].intercept));
    for (k, line) in lines.iter().enumerate() {
        params.push(-line.slope);
        if let Some(&b) = breaks.get(k) {
            params.push(b);
        }
    }

    let prediction = time
        .iter()
        .zip(segment_of.iter())
        .map(|(&t, &seg)| lines[seg].predict(t))
        .collect();

    Ok(SegmentedFit {
        model,
        params,
        lines,
        time: time.clone(),
        rate: rate.clone(),
        prediction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_single_power_law() {
        let time = Array1::logspace(10.0, 1.0, 4.0, 12);
        let rate = time.mapv(|t: f64| 100.0 * t.powf(-1.2));

        let fit = segmented_fit(&time, &rate, &[]).unwrap();
        assert_eq!(fit.model().name(), "pow");
        assert_relative_eq!(fit.params()[0], 100.0, max_relative = 1e-9);
        assert_relative_eq!(fit.params()[1], 1.2, max_relative = 1e-9);
        for (p, r) in fit.prediction().iter().zip(rate.iter()) {
            assert_relative_eq!(*p, *r, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_rejects_unordered_breaks() {
        let time = array![1.0, 2.0, 3.0, 4.0];
        let rate = array![4.0, 3.0, 2.0, 1.0];
        assert!(matches!(
            segmented_fit(&time, &rate, &[3.0, 2.0]),
            Err(LcFitError::InvalidInput(_))
        ));
        assert!(matches!(
            segmented_fit(&time, &rate, &[2.0, 2.0]),
            Err(LcFitError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_rejects_thin_segment() {
        let time = array![1.0, 2.0, 3.0, 4.0, 5.0];
        let rate = array![5.0, 4.0, 3.0, 2.0, 1.0];
        assert!(matches!(
            segmented_fit(&time, &rate, &[4.5]),
            Err(LcFitError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            segmented_fit(&array![], &array![], &[]),
            Err(LcFitError::InvalidInput(_))
        ));
        assert!(matches!(
            segmented_fit(&array![1.0, 2.0], &array![1.0, 0.0], &[]),
            Err(LcFitError::InvalidInput(_))
        ));
        assert!(matches!(
            segmented_fit(&array![1.0, 2.0], &array![1.0], &[]),
            Err(LcFitError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_to_fit_result_has_zero_errors() {
        let time = Array1::logspace(10.0, 1.0, 3.0, 8);
        let rate = time.mapv(|t: f64| 50.0 * t.powf(-1.0));
        let err = rate.mapv(|r| 0.1 * r);

        let fit = segmented_fit(&time, &rate, &[]).unwrap();
        let result = fit.to_fit_result(&err, DofConvention::Conventional).unwrap();
        assert_eq!(result.param_names(), &["norm", "pow1"]);
        assert!(result.param_err_neg().iter().all(|&e| e == 0.0));
        assert_relative_eq!(result.chi_square(), 0.0, epsilon = 1e-12);
        assert_eq!(result.degrees_of_freedom(), 6.0);
    }
}
