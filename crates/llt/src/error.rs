use aero_solver::LinalgError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LltError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid wing: {0}")]
    InvalidWing(String),
    #[error("invalid polar: {0}")]
    InvalidPolar(String),
    #[error("non-positive lift at alpha = {alpha:.3} deg")]
    NegativeLift { alpha: f64 },
    #[error("analysis was cancelled")]
    Cancelled,
    #[error(transparent)]
    Linalg(#[from] LinalgError),
}
