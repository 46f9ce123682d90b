//! # Uncertainty Calculation
//!
//! Parameter uncertainties for refined light-curve fits:
//!
//! - Covariance matrix estimation from the Jacobian at the solution
//! - Symmetric standard errors and correlations
//! - Monte Carlo asymmetric errors drawn from the covariance

mod covariance;
mod monte_carlo;

pub use covariance::{calculate_correlation, calculate_covariance, standard_errors_from_covariance};

pub use monte_carlo::{
    monte_carlo_errors, percentile, MonteCarloResult, MonteCarloSettings, LOWER_SIGMA_PERCENTILE,
    UPPER_SIGMA_PERCENTILE,
};
