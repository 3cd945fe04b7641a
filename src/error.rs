use thiserror::Error;

/// Error types for the attenfit library.
#[derive(Error, Debug)]
pub enum AttenFitError {
    /// Aggregation received a position vector whose length does not match the
    /// number of raw measurements.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// The dataset is too small for the requested model. A meaningful fit
    /// needs at least one more sample than free parameters.
    #[error("Insufficient data: {n_samples} samples for a {n_params}-parameter model")]
    InsufficientData { n_samples: usize, n_params: usize },

    /// Malformed box constraints: a lower bound above its upper bound, a bound
    /// vector of the wrong length, or an initial guess outside the box.
    #[error("Invalid bounds: {0}")]
    InvalidBounds(String),

    /// A sample that cannot be weighted, e.g. a non-positive value
    /// uncertainty.
    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    /// Error indicating a mismatch in matrix or vector dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Error during model or residual evaluation.
    #[error("Function evaluation error: {0}")]
    FunctionEvaluation(String),

    /// Error during matrix conversion operations.
    #[error("Matrix conversion error: {0}")]
    ConversionError(String),

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Generic error for cases that don't fit the other categories.
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for attenfit operations.
pub type Result<T> = std::result::Result<T, AttenFitError>;

impl From<String> for AttenFitError {
    fn from(s: String) -> Self {
        AttenFitError::Other(s)
    }
}

impl From<&str> for AttenFitError {
    fn from(s: &str) -> Self {
        AttenFitError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AttenFitError::InsufficientData {
            n_samples: 3,
            n_params: 5,
        };
        assert!(format!("{}", err).contains("3 samples"));

        let err = AttenFitError::InvalidBounds("lower[1] = 100 > upper[1] = 50".to_string());
        assert!(format!("{}", err).contains("lower[1]"));
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: AttenFitError = io_err.into();

        match err {
            AttenFitError::IoError(_) => (),
            _ => panic!("Expected IoError variant"),
        }

        let str_err: AttenFitError = "test error".into();
        match str_err {
            AttenFitError::Other(s) => assert_eq!(s, "test error"),
            _ => panic!("Expected Other variant"),
        }
    }
}
