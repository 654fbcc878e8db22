//! Structured error types for dmkit.
//!
//! Numeric degeneracy (too few observations, a covariance that is not
//! positive-definite) is never reported through [`DmError`]; estimators leave
//! their distribution unparameterized instead. The variants below are for
//! contract violations by the caller.

use thiserror::Error;

/// Unified error type for all dmkit operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DmError {
    /// Invalid input (bad arguments, out-of-support values, wrong column type)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Vector or matrix sizes that do not agree
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// A column name that the dataset does not contain
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    /// A column name that the dataset already contains
    #[error("duplicate column: {0}")]
    DuplicateColumn(String),

    /// A candidate model that cannot be normalized (e.g. zero mixing mass)
    #[error("degenerate model: {0}")]
    Degenerate(String),
}

/// Convenience alias used throughout dmkit.
pub type Result<T> = std::result::Result<T, DmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let e = DmError::DimensionMismatch {
            expected: 3,
            found: 2,
        };
        assert_eq!(e.to_string(), "dimension mismatch: expected 3, found 2");
        assert_eq!(
            DmError::UnknownColumn("x".into()).to_string(),
            "unknown column: x"
        );
    }
}
