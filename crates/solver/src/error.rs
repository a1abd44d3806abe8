use thiserror::Error;

/// Failures reported by the linear algebra routines.
///
/// None of these are fatal: callers abort the current solve and keep their
/// previous state untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinalgError {
    #[error("singular matrix: pivot {pivot:e} at row {row} is below tolerance")]
    Singular { row: usize, pivot: f64 },
    #[error("solution contains non-finite values")]
    NonFinite,
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("duplicate abscissa x = {x} in interpolation input")]
    DuplicateAbscissa { x: f64 },
    #[error("at least {required} points are required, got {actual}")]
    NotEnoughPoints { required: usize, actual: usize },
}
