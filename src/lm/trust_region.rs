//! Damping schedule.
//!
//! λ shrinks after steps whose chi-square decrease matches the linear
//! prediction and grows after rejected steps.

use super::config::LmConfig;

/// Current damping and the rules for changing it.
#[derive(Debug, Clone)]
pub struct TrustRegion {
    pub lambda: f64,
    pub lambda_min: f64,
    pub lambda_max: f64,
    pub lambda_increase_factor: f64,
    pub lambda_decrease_factor: f64,

    /// Steps with a lower gain ratio are rejected
    pub min_gain_ratio: f64,

    /// Accepted steps above this gain ratio also relax the damping
    pub good_gain_ratio: f64,
}

impl Default for TrustRegion {
    fn default() -> Self {
        Self::from_config(&LmConfig::default())
    }
}

impl TrustRegion {
    pub fn new() -> Self {
        Default::default()
    }

    /// Damping schedule of `config`.
    pub fn from_config(config: &LmConfig) -> Self {
        Self {
            lambda: config.initial_lambda,
            lambda_min: config.min_lambda,
            lambda_max: config.max_lambda,
            lambda_increase_factor: config.lambda_up_factor,
            lambda_decrease_factor: config.lambda_down_factor,
            min_gain_ratio: 1e-4,
            good_gain_ratio: 0.25,
        }
    }

    /// Adapt λ to a step's gain ratio; true when the step is accepted.
    pub fn update_lambda(&mut self, gain_ratio: f64) -> bool {
        if gain_ratio > self.min_gain_ratio {
            if gain_ratio > self.good_gain_ratio {
                self.lambda = (self.lambda * self.lambda_decrease_factor).max(self.lambda_min);
            }
            true
        } else {
            self.lambda = (self.lambda * self.lambda_increase_factor).min(self.lambda_max);
            false
        }
    }

    /// True once the damping can grow no further.
    pub fn is_saturated(&self) -> bool {
        self.lambda >= self.lambda_max
    }

    /// Actual over predicted chi-square reduction.
    ///
    /// A non-finite trial cost always yields a ratio of zero.
    pub fn gain_ratio(current_cost: f64, new_cost: f64, predicted_reduction: f64) -> f64 {
        if !new_cost.is_finite() {
            return 0.0;
        }

        let actual_reduction = current_cost - new_cost;

        if predicted_reduction.abs() < 1e-300 {
            if actual_reduction >= 0.0 && actual_reduction.abs() < 1e-300 {
                1.0
            } else {
                0.0
            }
        } else {
            actual_reduction / predicted_reduction
        }
    }
}
