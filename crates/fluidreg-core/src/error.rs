//! Error types for the core data model and transformation models.

use crate::spatial::Bounds2;
use thiserror::Error;

/// Main error type for core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid configuration (zero-dof transform, empty grid, ...).
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A transform inversion was requested but is not possible.
    #[error("Non-invertible transform: {0}")]
    NonInvertibleTransform(String),

    /// A grid allocation overflowed the addressable size.
    #[error("Allocation failure: grid of {size} elements exceeds the addressable range")]
    AllocationFailure { size: u128 },

    /// Grid sizes that were required to match do not.
    #[error("Size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: Bounds2, actual: Bounds2 },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create an invalid-configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a non-invertible-transform error.
    pub fn non_invertible(msg: impl Into<String>) -> Self {
        Self::NonInvertibleTransform(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::invalid_configuration("zero degrees of freedom");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: zero degrees of freedom"
        );
    }

    #[test]
    fn test_size_mismatch_display() {
        let err = CoreError::SizeMismatch {
            expected: Bounds2::new(4, 4),
            actual: Bounds2::new(2, 4),
        };
        assert!(err.to_string().contains("4x4"));
        assert!(err.to_string().contains("2x4"));
    }
}
