//! Error types for registration operations.

use fluidreg_core::error::CoreError;
use fluidreg_core::spatial::Bounds2;
use thiserror::Error;

/// Main error type for registration operations.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// Error in cost-function setup or evaluation.
    #[error("Cost error: {0}")]
    CostError(String),

    /// Error in optimizer operation.
    #[error("Optimizer error: {0}")]
    OptimizerError(String),

    /// Error in a regularization solver.
    #[error("Solver error: {0}")]
    SolverError(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Grid sizes that were required to match do not.
    #[error("Size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: Bounds2, actual: Bounds2 },

    /// Error bubbled up from the core data model.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

impl RegistrationError {
    /// Create a cost error.
    pub fn cost(msg: impl Into<String>) -> Self {
        Self::CostError(msg.into())
    }

    /// Create an optimizer error.
    pub fn optimizer(msg: impl Into<String>) -> Self {
        Self::OptimizerError(msg.into())
    }

    /// Create a solver error.
    pub fn solver(msg: impl Into<String>) -> Self {
        Self::SolverError(msg.into())
    }

    /// Create an invalid-configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}
