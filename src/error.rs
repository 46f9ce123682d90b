use thiserror::Error;

use crate::parameters::bounds::BoundsError;
use crate::report::FitResult;

/// Error types for the grb-lcfit library.
#[derive(Error, Debug)]
pub enum LcFitError {
    /// Missing or malformed input: light-curve files, break times, segments.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The flare/break combination has no entry in the model table.
    #[error("No supported model for {num_flares} flare(s) and {num_breaks} break(s)")]
    UnsupportedModel {
        num_flares: usize,
        num_breaks: usize,
    },

    /// A model name or saved parameter layout that maps to no table entry.
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// The solver did not converge within its budget.
    ///
    /// The best parameters found so far are kept in `partial`.
    #[error("Fit failed to converge: {message}")]
    ConvergenceFailure {
        message: String,
        partial: Box<FitResult>,
    },

    /// The parameter covariance is singular or ill-conditioned; errors are NaN.
    #[error("Degenerate fit: {message}")]
    DegenerateFit {
        message: String,
        partial: Box<FitResult>,
    },

    /// Error indicating a mismatch in array dimensions or parameter counts.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Linear algebra error.
    #[error("Linear algebra error: {0}")]
    LinearAlgebraError(String),

    /// A line of a text file could not be parsed.
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Parameter bounds violation.
    #[error("Bounds error: {0}")]
    Bounds(#[from] BoundsError),

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LcFitError {
    /// The best-so-far fit carried by solver failures, if any.
    pub fn partial_result(&self) -> Option<&FitResult> {
        match self {
            LcFitError::ConvergenceFailure { partial, .. }
            | LcFitError::DegenerateFit { partial, .. } => Some(partial),
            _ => None,
        }
    }

    /// True for errors caused by the caller's data or picks rather than the solver.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            LcFitError::InvalidInput(_)
                | LcFitError::UnsupportedModel { .. }
                | LcFitError::UnknownModel(_)
                | LcFitError::Parse { .. }
        )
    }
}

/// Result type alias for grb-lcfit operations.
pub type Result<T> = std::result::Result<T, LcFitError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::select_model;

    #[test]
    fn test_error_display() {
        let err = LcFitError::UnsupportedModel {
            num_flares: 8,
            num_breaks: 0,
        };
        assert!(format!("{}", err).contains("8 flare(s)"));

        let err = LcFitError::Parse {
            line: 3,
            message: "expected 4 tokens".to_string(),
        };
        assert!(format!("{}", err).contains("line 3"));
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LcFitError = io_err.into();

        match err {
            LcFitError::Io(_) => (),
            _ => panic!("Expected Io variant"),
        }
    }

    #[test]
    fn test_partial_result_is_exposed() {
        let model = select_model(0, 0).unwrap();
        let partial = FitResult::initial_guess(model, vec![10.0, 1.1], 4.0, 12.0).unwrap();
        let err = LcFitError::ConvergenceFailure {
            message: "maximum iterations reached".to_string(),
            partial: Box::new(partial),
        };

        assert!(!err.is_input_error());
        assert_eq!(err.partial_result().unwrap().param_values(), &[10.0, 1.1]);
        assert!(LcFitError::InvalidInput("empty".into()).partial_result().is_none());
    }
}
