use aero_solver::LinalgError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("at least {required} control points are required, got {actual}")]
    NotEnoughControlPoints { required: usize, actual: usize },
    #[error("invalid degree {degree} for {n_points} control points")]
    InvalidDegree { degree: usize, n_points: usize },
    #[error("{required} data points are needed to fit {n_ctrl} control points, got {actual}")]
    NotEnoughDataPoints {
        required: usize,
        actual: usize,
        n_ctrl: usize,
    },
    #[error("knot vector is out of date; call update_spline() after changing control points")]
    KnotsOutOfDate,
    #[error("weighted basis sum vanishes at t = {t}")]
    DegenerateWeights { t: f64 },
    #[error("index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("triangle connections are stale; rebuild them before querying")]
    StaleConnections,
    #[error("nodes have not been built")]
    NodesNotBuilt,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Linalg(#[from] LinalgError),
}

/// Errors from the triangulation binary codec.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unsupported format tag {0}")]
    UnknownFormat(i32),
    #[error("negative triangle count {0}")]
    InvalidCount(i32),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
