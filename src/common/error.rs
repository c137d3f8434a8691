//! Error types for crane_control

use thiserror::Error;

/// Main error type for the crane pipelines
#[derive(Debug, Error)]
pub enum CraneError {
    /// Invalid parameter or configuration value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// Model declaration is inconsistent
    #[error("Model error: {0}")]
    ModelError(String),
    /// Numerical computation failed (non-finite state, singular system, etc.)
    #[error("Numerical error: {0}")]
    NumericalError(String),
    /// Local solver did not produce a solution
    #[error("Solver error: {0}")]
    SolverError(String),
    /// Remote session operation issued out of order
    #[error("Session error: {0}")]
    SessionError(String),
    /// Network or server failure
    #[error("Transport error: {0}")]
    TransportError(String),
    /// Solution could not be fetched or parsed after a remote solve
    #[error("Failed to retrieve solution: {0}")]
    SolutionUnavailable(#[source] Box<CraneError>),
    /// Malformed tabular data
    #[error("Data error: {0}")]
    DataError(String),
    /// Configuration file could not be read or parsed
    #[error("Configuration error: {0}")]
    ConfigError(String),
    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    /// CSV encoding or decoding error
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    /// Visualization error
    #[error("Visualization error: {0}")]
    VisualizationError(String),
}

/// Result type alias for crane operations
pub type CraneResult<T> = Result<T, CraneError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_display() {
        let err = CraneError::ModelError("state y has no equation".to_string());
        assert_eq!(format!("{}", err), "Model error: state y has no equation");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CraneError = io_err.into();
        assert!(matches!(err, CraneError::IoError(_)));
    }

    #[test]
    fn test_solution_unavailable_keeps_cause() {
        let cause = CraneError::TransportError("HTTP 404".to_string());
        let err = CraneError::SolutionUnavailable(Box::new(cause));
        assert_eq!(
            err.to_string(),
            "Failed to retrieve solution: Transport error: HTTP 404"
        );
        assert!(err.source().is_some());
    }
}
