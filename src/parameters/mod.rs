//! # Parameter bounds
//!
//! Light-curve parameters carry physical limits (positive normalisations,
//! break times inside the observed span). [`Bounds`] describes them and
//! [`ParameterBounds`] maps whole parameter vectors between the bounded
//! external space and the unbounded space the optimizer works in.

pub mod bounds;

// Re-export key types
pub use bounds::{Bounds, BoundsError, BoundsTransform, ParameterBounds};
