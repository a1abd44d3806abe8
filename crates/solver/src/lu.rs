//! Dense LU factorization with partial pivoting.
//!
//! `solve_linear_system` is the one-shot entry point used throughout the
//! geometry code. `DenseLu` keeps the factors and pivots around so that the
//! panel solver can back-substitute many right-hand sides against a single
//! O(N³) factorization.

use nalgebra::{DMatrix, DVector, Dyn, LU, RealField};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::LinalgError;

/// Relative pivot threshold below which a factorization is declared singular.
const PIVOT_TOLERANCE_F64: f64 = 1e-14;
const PIVOT_TOLERANCE_F32: f64 = 1e-7;

/// Storage precision of a retained factorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Precision {
    #[default]
    Double,
    Single,
}

/// Solve `matrix * x = rhs` with partial pivoting.
///
/// The right-hand side is never modified; on failure the caller keeps
/// whatever solution it had before.
pub fn solve_linear_system(
    matrix: &DMatrix<f64>,
    rhs: &DVector<f64>,
) -> Result<DVector<f64>, LinalgError> {
    check_square(matrix, rhs.len())?;
    let lu = matrix.clone().lu();
    check_pivots(&lu, matrix.nrows(), PIVOT_TOLERANCE_F64)?;
    let sol = lu.solve(rhs).ok_or(LinalgError::Singular { row: 0, pivot: 0.0 })?;
    if sol.iter().any(|v| !v.is_finite()) {
        return Err(LinalgError::NonFinite);
    }
    Ok(sol)
}

/// Solve `matrix * X = rhs` for several right-hand sides stored as columns.
pub fn solve_linear_system_multi(
    matrix: &DMatrix<f64>,
    rhs: &DMatrix<f64>,
) -> Result<DMatrix<f64>, LinalgError> {
    check_square(matrix, rhs.nrows())?;
    let lu = matrix.clone().lu();
    check_pivots(&lu, matrix.nrows(), PIVOT_TOLERANCE_F64)?;
    let sol = lu.solve(rhs).ok_or(LinalgError::Singular { row: 0, pivot: 0.0 })?;
    if sol.iter().any(|v| !v.is_finite()) {
        return Err(LinalgError::NonFinite);
    }
    Ok(sol)
}

#[derive(Debug, Clone)]
enum Factors {
    Double(LU<f64, Dyn, Dyn>),
    Single(LU<f32, Dyn, Dyn>),
}

/// A retained LU factorization.
#[derive(Debug, Clone)]
pub struct DenseLu {
    factors: Factors,
    size: usize,
}

impl DenseLu {
    /// Factorize a square matrix given in row-major order.
    pub fn from_row_major(
        size: usize,
        data: &[f64],
        precision: Precision,
    ) -> Result<Self, LinalgError> {
        if data.len() != size * size {
            return Err(LinalgError::DimensionMismatch {
                expected: size * size,
                actual: data.len(),
            });
        }
        let matrix = DMatrix::from_row_slice(size, size, data);
        Self::factorize(matrix, precision)
    }

    /// Factorize `matrix`, consuming it.
    pub fn factorize(matrix: DMatrix<f64>, precision: Precision) -> Result<Self, LinalgError> {
        let size = matrix.nrows();
        if matrix.ncols() != size {
            return Err(LinalgError::DimensionMismatch {
                expected: size,
                actual: matrix.ncols(),
            });
        }
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(LinalgError::NonFinite);
        }
        debug!(size, ?precision, "LU factorization");

        let factors = match precision {
            Precision::Double => {
                let lu = matrix.lu();
                check_pivots(&lu, size, PIVOT_TOLERANCE_F64)?;
                Factors::Double(lu)
            }
            Precision::Single => {
                let lu = matrix.map(|v| v as f32).lu();
                check_pivots(&lu, size, PIVOT_TOLERANCE_F32)?;
                Factors::Single(lu)
            }
        };
        Ok(Self { factors, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn precision(&self) -> Precision {
        match self.factors {
            Factors::Double(_) => Precision::Double,
            Factors::Single(_) => Precision::Single,
        }
    }

    /// Back-substitute one right-hand side.
    pub fn solve(&self, rhs: &[f64]) -> Result<Vec<f64>, LinalgError> {
        if rhs.len() != self.size {
            return Err(LinalgError::DimensionMismatch {
                expected: self.size,
                actual: rhs.len(),
            });
        }
        let sol: Vec<f64> = match &self.factors {
            Factors::Double(lu) => {
                let mut b = DVector::from_column_slice(rhs);
                if !lu.solve_mut(&mut b) {
                    return Err(LinalgError::Singular { row: 0, pivot: 0.0 });
                }
                b.iter().copied().collect()
            }
            Factors::Single(lu) => {
                let mut b = DVector::from_iterator(self.size, rhs.iter().map(|&v| v as f32));
                if !lu.solve_mut(&mut b) {
                    return Err(LinalgError::Singular { row: 0, pivot: 0.0 });
                }
                b.iter().map(|&v| f64::from(v)).collect()
            }
        };
        if sol.iter().any(|v| !v.is_finite()) {
            return Err(LinalgError::NonFinite);
        }
        Ok(sol)
    }

    /// Back-substitute several right-hand sides. Either all succeed or none
    /// of the inputs is touched.
    pub fn solve_many(&self, rhs: &mut [Vec<f64>]) -> Result<(), LinalgError> {
        let solved = rhs
            .iter()
            .map(|b| self.solve(b))
            .collect::<Result<Vec<_>, _>>()?;
        for (dst, src) in rhs.iter_mut().zip(solved) {
            *dst = src;
        }
        Ok(())
    }
}

fn check_square(matrix: &DMatrix<f64>, rhs_rows: usize) -> Result<(), LinalgError> {
    if matrix.nrows() != matrix.ncols() {
        return Err(LinalgError::DimensionMismatch {
            expected: matrix.nrows(),
            actual: matrix.ncols(),
        });
    }
    if rhs_rows != matrix.nrows() {
        return Err(LinalgError::DimensionMismatch {
            expected: matrix.nrows(),
            actual: rhs_rows,
        });
    }
    Ok(())
}

fn check_pivots<T>(lu: &LU<T, Dyn, Dyn>, size: usize, tolerance: f64) -> Result<(), LinalgError>
where
    T: RealField + Copy + Into<f64>,
{
    let u = lu.u();
    let diag: Vec<f64> = (0..size)
        .map(|i| {
            let d: f64 = u[(i, i)].into();
            d.abs()
        })
        .collect();
    let scale = diag.iter().copied().fold(0.0_f64, f64::max);
    for (row, &pivot) in diag.iter().enumerate() {
        if !pivot.is_finite() || pivot <= tolerance * scale || pivot == 0.0 {
            warn!(row, pivot, scale, "singular pivot in LU factorization");
            return Err(LinalgError::Singular { row, pivot });
        }
    }
    Ok(())
}
