//! Configuration and input validation errors.

use thiserror::Error;

/// Errors raised while building or validating problem data.
///
/// These are preconditions: they are checked before any decomposition starts
/// and abort the run immediately.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A cost or capacity table has the wrong shape.
    #[error("{table}: expected {expected} entries, found {found}")]
    DimensionMismatch {
        table: &'static str,
        expected: usize,
        found: usize,
    },

    /// A scalar that must be finite and non-negative is not.
    #[error("{field} must be finite and non-negative, got {value}")]
    InvalidValue { field: String, value: f64 },

    /// No distribution centers, return centers or customers.
    #[error("problem needs at least one {0}")]
    Empty(&'static str),

    /// Demand weights cannot be normalized into a density.
    #[error("demand weights must sum to a positive finite value, got {0}")]
    DegenerateDemand(f64),

    /// Triangular distribution parameters are malformed.
    #[error("triangular parameters for {name} are invalid: min={min}, mode={mode}, max={max}")]
    InvalidTriangular {
        name: &'static str,
        min: f64,
        mode: f64,
        max: f64,
    },

    /// A facility pin refers to a facility that does not exist.
    #[error("pin refers to {0} which is out of range")]
    PinOutOfRange(String),

    /// The same facility is pinned both open and closed.
    #[error("{0} is pinned both open and closed")]
    ContradictoryPin(String),

    /// The minimum number of return centers cannot be met.
    #[error("at least {required} return centers requested but only {available} can open")]
    ReturnCenterMinimum { required: usize, available: usize },

    /// Economic parameters are inconsistent.
    #[error("economic parameters are inconsistent: {0}")]
    Economics(String),
}
