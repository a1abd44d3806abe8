//! Least squares by Householder QR with column pivoting.

use nalgebra::{DMatrix, DVector};

use crate::error::LinalgError;

/// Columns whose remaining norm falls below this fraction of the largest
/// initial column norm are treated as rank deficient.
const PRECISION: f64 = 1e-12;

/// Solve the over-determined system `a * x ≈ b` in the least-squares sense.
///
/// At each step the remaining column with the largest sub-column norm is
/// brought into position and reduced by a Householder reflector. Columns
/// found to be dependent get a zero coefficient. The inputs are borrowed;
/// all reductions happen on internal copies.
pub fn qr_least_squares(a: &DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>, LinalgError> {
    let rows = a.nrows();
    let cols = a.ncols();
    if b.len() != rows {
        return Err(LinalgError::DimensionMismatch {
            expected: rows,
            actual: b.len(),
        });
    }

    let mut r = a.clone();
    let mut rhs = b.clone();
    let mut perm: Vec<usize> = (0..cols).collect();
    let mut rank = 0;

    let max_norm = a.column_iter().map(|c| c.norm()).fold(0.0, f64::max);
    let threshold = PRECISION * max_norm;

    for k in 0..rows.min(cols) {
        let Some((best, norm)) = next_column(&r, &perm, k, threshold) else {
            break;
        };
        perm.swap(k, best);
        let col = perm[k];

        // v = x - alpha e1, with alpha signed opposite to x0 to avoid cancellation
        let x0 = r[(k, col)];
        let alpha = if x0 > 0.0 { -norm } else { norm };
        let mut v: Vec<f64> = (k..rows).map(|i| r[(i, col)]).collect();
        v[0] -= alpha;
        let v_norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        for x in v.iter_mut() {
            *x /= v_norm;
        }

        for &j in &perm[k..] {
            let mut sub: Vec<f64> = (k..rows).map(|i| r[(i, j)]).collect();
            reflect(&v, &mut sub);
            for (offset, val) in sub.into_iter().enumerate() {
                r[(k + offset, j)] = val;
            }
        }
        reflect(&v, &mut rhs.as_mut_slice()[k..]);
        rank += 1;
    }

    let mut sol = DVector::zeros(cols);
    for i in (0..rank).rev() {
        let col = perm[i];
        let mut s = rhs[i];
        for &pj in &perm[i + 1..rank] {
            s -= r[(i, pj)] * sol[pj];
        }
        let pivot = r[(i, col)];
        sol[col] = if pivot.abs() > threshold { s / pivot } else { 0.0 };
    }

    if sol.iter().any(|v| !v.is_finite()) {
        return Err(LinalgError::NonFinite);
    }
    Ok(sol)
}

/// Pick the not-yet-used column with the largest norm below row `k`.
fn next_column(r: &DMatrix<f64>, perm: &[usize], k: usize, threshold: f64) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, &col) in perm.iter().enumerate().skip(k) {
        let norm = (k..r.nrows()).map(|i| r[(i, col)] * r[(i, col)]).sum::<f64>().sqrt();
        if norm > threshold && best.is_none_or(|(_, n)| norm > n) {
            best = Some((idx, norm));
        }
    }
    best
}

/// Apply `H = I - 2 v vᵀ` to a sub-column.
fn reflect(v: &[f64], x: &mut [f64]) {
    let dot: f64 = v.iter().zip(x.iter()).map(|(a, b)| a * b).sum();
    for (xi, vi) in x.iter_mut().zip(v) {
        *xi -= 2.0 * vi * dot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_square_system_is_exact() {
        let a = DMatrix::from_row_slice(3, 3, &[1.0, 2.0, 3.0, 0.0, 1.0, 4.0, 5.0, 6.0, 0.0]);
        let x_true = DVector::from_column_slice(&[1.0, -2.0, 0.5]);
        let b = &a * &x_true;
        let x = qr_least_squares(&a, &b).unwrap();
        for i in 0..3 {
            assert_relative_eq!(x[i], x_true[i], epsilon = 1e-10);
        }
    }

    #[test]
    fn test_line_fit() {
        // y = 2x + 1 with symmetric noise
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0];
        let noise = [0.1, -0.1, 0.0, 0.1, -0.1];
        let mut a = DMatrix::zeros(5, 2);
        let mut b = DVector::zeros(5);
        for i in 0..5 {
            a[(i, 0)] = xs[i];
            a[(i, 1)] = 1.0;
            b[i] = 2.0 * xs[i] + 1.0 + noise[i];
        }
        let x = qr_least_squares(&a, &b).unwrap();
        // normal equations give the same answer
        let at = a.transpose();
        let expected = (&at * &a).try_inverse().unwrap() * (&at * &b);
        assert_relative_eq!(x[0], expected[0], epsilon = 1e-10);
        assert_relative_eq!(x[1], expected[1], epsilon = 1e-10);
    }

    #[test]
    fn test_dependent_column_gets_zero() {
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 2.0, 0.0, 3.0, 0.0]);
        let b = DVector::from_column_slice(&[1.0, 2.0, 3.0]);
        let x = qr_least_squares(&a, &b).unwrap();
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-12);
        assert_eq!(x[1], 0.0);
    }

    #[test]
    fn test_tiny_scale_system_is_solved() {
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]) * 1e-13;
        let b = &a * DVector::from_column_slice(&[1.0, 2.0]);
        let x = qr_least_squares(&a, &b).unwrap();
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(x[1], 2.0, epsilon = 1e-9);

        // dependence is still detected relative to the matrix scale
        let dependent = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 2.0, 0.0, 3.0, 0.0]) * 1e-13;
        let b = DVector::from_column_slice(&[1.0, 2.0, 3.0]) * 1e-13;
        let x = qr_least_squares(&dependent, &b).unwrap();
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-9);
        assert_eq!(x[1], 0.0);
    }

    #[test]
    fn test_zero_matrix_gives_zero_solution() {
        let a = DMatrix::<f64>::zeros(3, 2);
        let b = DVector::from_column_slice(&[1.0, 2.0, 3.0]);
        let x = qr_least_squares(&a, &b).unwrap();
        assert_eq!(x, DVector::zeros(2));
    }

    #[test]
    fn test_inputs_untouched() {
        let a = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 3.0]);
        let b = DVector::from_column_slice(&[1.0, 1.0]);
        let a_copy = a.clone();
        let b_copy = b.clone();
        let _ = qr_least_squares(&a, &b).unwrap();
        assert_eq!(a, a_copy);
        assert_eq!(b, b_copy);
    }
}
