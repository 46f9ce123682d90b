//! Continuous piecewise power law.
//!
//! The first segment is `norm · t^(−slope₁)` with a reference time of one
//! second. Every later segment starts from the value the previous segment
//! reaches at its break, `v_k · (t / break_k)^(−slope_k)`, so the curve is
//! continuous by construction.

use crate::error::{LcFitError, Result};

/// Slopes closer than this to 1 use the logarithmic form of the integral.
const LOG_LIMIT: f64 = 1e-12;

/// A broken power law with `breaks.len()` breaks and one more slope.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokenPowerLaw {
    norm: f64,
    slopes: Vec<f64>,
    breaks: Vec<f64>,
    /// Model value at each break, the normalisation of the following segment.
    anchors: Vec<f64>,
}

impl BrokenPowerLaw {
    /// Build from a normalisation, `n + 1` slopes and `n` strictly increasing,
    /// positive break times.
    pub fn new(norm: f64, slopes: Vec<f64>, breaks: Vec<f64>) -> Result<Self> {
        if slopes.len() != breaks.len() + 1 {
            return Err(LcFitError::DimensionMismatch(format!(
                "{} break(s) need {} slope(s), got {}",
                breaks.len(),
                breaks.len() + 1,
                slopes.len()
            )));
        }
        if let Some(b) = breaks.iter().find(|b| !(b.is_finite() && **b > 0.0)) {
            return Err(LcFitError::InvalidInput(format!(
                "Break times must be positive and finite, got {}",
                b
            )));
        }
        if breaks.windows(2).any(|w| w[1] <= w[0]) {
            return Err(LcFitError::InvalidInput(format!(
                "Break times must be strictly increasing: {:?}",
                breaks
            )));
        }

        let mut anchors = Vec::with_capacity(breaks.len());
        for (k, &b) in breaks.iter().enumerate() {
            let (start, scale) = if k == 0 {
                (norm, 1.0)
            } else {
                (anchors[k - 1], breaks[k - 1])
            };
            anchors.push(start * (b / scale).powf(-slopes[k]));
        }

        Ok(Self {
            norm,
            slopes,
            breaks,
            anchors,
        })
    }

    pub fn norm(&self) -> f64 {
        self.norm
    }

    pub fn slopes(&self) -> &[f64] {
        &self.slopes
    }

    pub fn breaks(&self) -> &[f64] {
        &self.breaks
    }

    /// Index of the segment containing `t`; a break belongs to the segment it ends.
    fn segment(&self, t: f64) -> usize {
        self.breaks.iter().take_while(|&&b| b < t).count()
    }

    /// Normalisation and reference time of segment `k`.
    fn reference(&self, k: usize) -> (f64, f64) {
        if k == 0 {
            (self.norm, 1.0)
        } else {
            (self.anchors[k - 1], self.breaks[k - 1])
        }
    }

    /// Instantaneous value at `t`.
    pub fn value(&self, t: f64) -> f64 {
        let k = self.segment(t);
        let (amp, t_ref) = self.reference(k);
        amp * (t / t_ref).powf(-self.slopes[k])
    }

    /// Exact integral over `[a, b]` inside segment `k`, `0 < a ≤ b`.
    fn segment_integral(&self, k: usize, a: f64, b: f64) -> f64 {
        if b <= a {
            return 0.0;
        }
        let (amp, t_ref) = self.reference(k);
        let slope = self.slopes[k];
        let q = 1.0 - slope;
        let log_ratio = ((b - a) / a).ln_1p();

        // ∫ₐᵇ amp (t/t_ref)^(−s) dt = amp (a/t_ref)^(−s) · a · (exp(q·L) − 1)/q
        let growth = if q.abs() < LOG_LIMIT {
            log_ratio
        } else {
            (q * log_ratio).exp_m1() / q
        };
        amp * (a / t_ref).powf(-slope) * a * growth
    }

    /// Exact integral over `[a, b]`, split at the breaks it crosses.
    pub fn integral(&self, a: f64, b: f64) -> f64 {
        let mut total = 0.0;
        let mut start = a;
        let mut k = self.segment(a);

        // A bin starting exactly on a break lies in the next segment.
        while k < self.breaks.len() && self.breaks[k] <= start {
            k += 1;
        }

        while start < b {
            let end = if k < self.breaks.len() { self.breaks[k].min(b) } else { b };
            total += self.segment_integral(k, start, end);
            start = end;
            k += 1;
        }
        total
    }

    /// Average over `[a, b]`; a zero-width bin gives the instantaneous value.
    pub fn mean(&self, a: f64, b: f64) -> f64 {
        if b <= a {
            return self.value(a);
        }
        self.integral(a, b) / (b - a)
    }
}
