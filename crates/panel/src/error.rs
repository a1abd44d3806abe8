use aero_kernel::GeometryError;
use aero_solver::LinalgError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("analysis was cancelled")]
    Cancelled,
    #[error("numerical degeneracy: {0}")]
    NumericalDegeneracy(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid panel mesh: {0}")]
    InvalidMesh(String),
    #[error("{0} must run first")]
    NotReady(&'static str),
    #[error("no zero-moment angle found between -30 and 30 degrees")]
    NoZeroMomentAngle,
    #[error("non-positive lift at alpha = {alpha:.3} deg")]
    NegativeLift { alpha: f64 },
    #[error("worker pool: {0}")]
    ThreadPool(String),
    #[error(transparent)]
    Linalg(#[from] LinalgError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

impl AnalysisError {
    /// True for failures that only concern the current operating point.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            AnalysisError::Cancelled | AnalysisError::InvalidConfig(_) | AnalysisError::ThreadPool(_)
        )
    }
}
