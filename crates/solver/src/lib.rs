//! Dense linear algebra used by the geometry kernel and the flow solvers.
//!
//! Everything here is small: LU solves with explicit status,
//! a reusable factorization for many right-hand sides, Householder QR
//! least squares and a piecewise cubic interpolant.

pub mod cubic;
pub mod error;
pub mod lu;
pub mod qr;

pub use cubic::{CubicInterpolation, EndCondition};
pub use error::LinalgError;
pub use lu::{DenseLu, Precision, solve_linear_system, solve_linear_system_multi};
pub use qr::qr_least_squares;
