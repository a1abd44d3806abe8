//! Piecewise cubic interpolation through sorted samples.
//!
//! Each segment `i` carries `a t³ + b t² + c t + d` with `t = x - x_i`, so the
//! conditioning of the system does not depend on where the samples sit. The
//! 4n unknowns are fixed by 2n interpolation rows, C¹ and C² continuity at the
//! n-1 interior knots and one end condition on each side.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::LinalgError;
use crate::lu::solve_linear_system;

/// Two abscissas closer than this are considered duplicates.
const DUPLICATE_TOLERANCE: f64 = 1e-12;

/// End condition of the interpolant.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum EndCondition {
    /// Zero second derivative.
    #[default]
    Natural,
    /// Prescribed first derivative.
    Clamped(f64),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CubicInterpolation {
    x: Vec<f64>,
    y: Vec<f64>,
    left: EndCondition,
    right: EndCondition,
    coefs: Vec<[f64; 4]>,
    singular: bool,
}

impl CubicInterpolation {
    /// Build from unsorted `(x, y)` samples. Call [`make_spline`](Self::make_spline) before evaluating.
    pub fn new(points: &[(f64, f64)]) -> Self {
        let mut sorted = points.to_vec();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self {
            x: sorted.iter().map(|p| p.0).collect(),
            y: sorted.iter().map(|p| p.1).collect(),
            ..Default::default()
        }
    }

    pub fn with_end_conditions(mut self, left: EndCondition, right: EndCondition) -> Self {
        self.left = left;
        self.right = right;
        self
    }

    pub fn is_singular(&self) -> bool {
        self.singular
    }

    pub fn n_points(&self) -> usize {
        self.x.len()
    }

    /// Assemble and solve the 4n x 4n system.
    pub fn make_spline(&mut self) -> Result<(), LinalgError> {
        self.coefs.clear();
        self.singular = true;

        let np = self.x.len();
        if np < 2 {
            return Err(LinalgError::NotEnoughPoints {
                required: 2,
                actual: np,
            });
        }
        if let Some(w) = self.x.windows(2).find(|w| (w[1] - w[0]).abs() < DUPLICATE_TOLERANCE) {
            warn!(x = w[0], "duplicate abscissa in cubic interpolation input");
            return Err(LinalgError::DuplicateAbscissa { x: w[0] });
        }

        let ns = np - 1;
        let size = 4 * ns;
        let mut m = DMatrix::<f64>::zeros(size, size);
        let mut rhs = DVector::<f64>::zeros(size);
        let mut row = 0;

        // interpolation, with d = y_i at the left end of each segment
        for i in 0..ns {
            let h = self.x[i + 1] - self.x[i];
            let c = 4 * i;
            m[(row, c + 3)] = 1.0;
            rhs[row] = self.y[i];
            row += 1;

            m[(row, c)] = h * h * h;
            m[(row, c + 1)] = h * h;
            m[(row, c + 2)] = h;
            m[(row, c + 3)] = 1.0;
            rhs[row] = self.y[i + 1];
            row += 1;
        }

        // slope and curvature continuity: segment i-1 at t = h against segment i at t = 0
        for i in 1..ns {
            let h = self.x[i] - self.x[i - 1];
            let (c0, c1) = (4 * (i - 1), 4 * i);
            m[(row, c0)] = 3.0 * h * h;
            m[(row, c0 + 1)] = 2.0 * h;
            m[(row, c0 + 2)] = 1.0;
            m[(row, c1 + 2)] = -1.0;
            row += 1;

            m[(row, c0)] = 6.0 * h;
            m[(row, c0 + 1)] = 2.0;
            m[(row, c1 + 1)] = -2.0;
            row += 1;
        }

        let h_last = self.x[ns] - self.x[ns - 1];
        for (condition, t, c) in [(self.left, 0.0, 0), (self.right, h_last, 4 * (ns - 1))] {
            match condition {
                EndCondition::Natural => {
                    m[(row, c)] = 6.0 * t;
                    m[(row, c + 1)] = 2.0;
                }
                EndCondition::Clamped(slope) => {
                    m[(row, c)] = 3.0 * t * t;
                    m[(row, c + 1)] = 2.0 * t;
                    m[(row, c + 2)] = 1.0;
                    rhs[row] = slope;
                }
            }
            row += 1;
        }
        debug_assert_eq!(row, size);

        let sol = solve_linear_system(&m, &rhs)?;
        self.coefs = (0..ns)
            .map(|i| [sol[4 * i], sol[4 * i + 1], sol[4 * i + 2], sol[4 * i + 3]])
            .collect();
        self.singular = false;
        Ok(())
    }

    /// Segment index used for `x` and the local abscissa inside it; values
    /// outside the range extrapolate the end segments.
    fn segment(&self, x: f64) -> (usize, f64) {
        let ns = self.coefs.len();
        let idx = self.x.partition_point(|&xi| xi <= x);
        let i = idx.saturating_sub(1).min(ns - 1);
        (i, x - self.x[i])
    }

    /// Interpolated value, or 0 if the spline is singular.
    pub fn value(&self, x: f64) -> f64 {
        if self.singular || self.coefs.is_empty() {
            return 0.0;
        }
        let (i, t) = self.segment(x);
        let [a, b, c, d] = self.coefs[i];
        ((a * t + b) * t + c) * t + d
    }

    /// First derivative, or 0 if the spline is singular.
    pub fn derivative(&self, x: f64) -> f64 {
        if self.singular || self.coefs.is_empty() {
            return 0.0;
        }
        let (i, t) = self.segment(x);
        let [a, b, c, _] = self.coefs[i];
        (3.0 * a * t + 2.0 * b) * t + c
    }

    pub fn second_derivative(&self, x: f64) -> f64 {
        if self.singular || self.coefs.is_empty() {
            return 0.0;
        }
        let (i, t) = self.segment(x);
        let [a, b, _, _] = self.coefs[i];
        6.0 * a * t + 2.0 * b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_passes_through_samples() {
        let pts = [(0.0, 1.0), (1.0, 3.0), (2.5, 2.0), (4.0, -1.0)];
        let mut spline = CubicInterpolation::new(&pts);
        spline.make_spline().unwrap();
        for (x, y) in pts {
            assert_relative_eq!(spline.value(x), y, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_unsorted_input_is_sorted() {
        let mut spline = CubicInterpolation::new(&[(2.0, 4.0), (0.0, 0.0), (1.0, 1.0)]);
        spline.make_spline().unwrap();
        assert_relative_eq!(spline.value(1.0), 1.0, epsilon = 1e-10);
        assert_relative_eq!(spline.value(2.0), 4.0, epsilon = 1e-10);
    }

    #[test]
    fn test_natural_end_has_zero_curvature() {
        let mut spline = CubicInterpolation::new(&[(0.0, 0.0), (1.0, 1.0), (2.0, 0.0), (3.0, 2.0)]);
        spline.make_spline().unwrap();
        assert_relative_eq!(spline.second_derivative(0.0), 0.0, epsilon = 1e-9);
        assert_relative_eq!(spline.second_derivative(3.0), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_clamped_reproduces_cubic() {
        // f(x) = x³ is reproduced exactly with clamped slopes
        let pts: Vec<(f64, f64)> = (0..5).map(|i| (i as f64, (i as f64).powi(3))).collect();
        let mut spline = CubicInterpolation::new(&pts)
            .with_end_conditions(EndCondition::Clamped(0.0), EndCondition::Clamped(48.0));
        spline.make_spline().unwrap();
        assert_relative_eq!(spline.value(2.5), 15.625, epsilon = 1e-8);
        assert_relative_eq!(spline.derivative(1.5), 6.75, epsilon = 1e-8);
    }

    #[test]
    fn test_offset_abscissae_stay_regular() {
        let shape = |x: f64| (1.3 * x).sin() + 0.2 * x;
        let base: Vec<(f64, f64)> = (0..8).map(|i| (0.5 * i as f64, shape(0.5 * i as f64))).collect();
        let mut reference = CubicInterpolation::new(&base);
        reference.make_spline().unwrap();

        for offset in [1000.0, 1.0e4] {
            let shifted: Vec<(f64, f64)> = base.iter().map(|&(x, y)| (x + offset, y)).collect();
            let mut spline = CubicInterpolation::new(&shifted);
            assert!(spline.make_spline().is_ok(), "singular at offset {offset}");
            assert!(!spline.is_singular());
            for &(x, y) in &shifted {
                assert_relative_eq!(spline.value(x), y, epsilon = 1e-9);
            }
            for k in 0..15 {
                let x = 0.25 * k as f64;
                assert_relative_eq!(spline.value(x + offset), reference.value(x), epsilon = 1e-8);
                assert_relative_eq!(spline.derivative(x + offset), reference.derivative(x), epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_duplicate_abscissa_rejected() {
        let mut spline = CubicInterpolation::new(&[(0.0, 0.0), (1.0, 1.0), (1.0, 2.0)]);
        let result = spline.make_spline();
        assert!(matches!(result, Err(LinalgError::DuplicateAbscissa { .. })));
        assert!(spline.is_singular());
        assert_eq!(spline.value(0.5), 0.0);
    }

    #[test]
    fn test_single_point_rejected() {
        let mut spline = CubicInterpolation::new(&[(0.0, 1.0)]);
        assert!(matches!(
            spline.make_spline(),
            Err(LinalgError::NotEnoughPoints { required: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_extrapolation_uses_end_segments() {
        let mut spline = CubicInterpolation::new(&[(0.0, 0.0), (1.0, 1.0)]);
        spline.make_spline().unwrap();
        // two points, natural ends: straight line
        assert_relative_eq!(spline.value(-1.0), -1.0, epsilon = 1e-10);
        assert_relative_eq!(spline.value(2.0), 2.0, epsilon = 1e-10);
    }
}
