//! Levenberg-Marquardt solver.
//!
//! Runs on the internal (unbounded) parameter vector during refinement.
//! Failing to converge is reported through [`LmResult::status`], not as an
//! error, so callers keep the best point reached.

pub mod algorithm;
pub mod config;
pub mod convergence;
pub mod step;
pub mod trust_region;

pub use algorithm::{LevenbergMarquardt, LmResult};
pub use config::LmConfig;
pub use convergence::{ConvergenceCriteria, ConvergenceStatus};
pub use step::{LmStep, StepResult};
pub use trust_region::TrustRegion;
