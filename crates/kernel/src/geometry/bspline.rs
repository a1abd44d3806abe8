use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use aero_solver::solve_linear_system_multi;

use super::distribution::bunched_parameter;
use super::point::Point3d;
use super::vector::Vec3;
use crate::error::GeometryError;

const DEFAULT_OUTPUT_SIZE: usize = 79;
const MIN_WEIGHT_SUM: f64 = 1e-300;

/// A rational B-spline curve in 3D with a clamped, uniformly spaced knot vector.
///
/// The knot vector is derived state: after changing the number of control
/// points or the degree, call [`BSpline3d::update_spline`] before evaluating.
/// Evaluation against an out-of-date knot vector is refused rather than
/// silently reading past the knots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BSpline3d {
    control_points: Vec<Point3d>,
    weights: Vec<f64>,
    degree: usize,
    knots: Vec<f64>,
    output: Vec<Point3d>,
    bunch_amp: f64,
    bunch_dist: f64,
    singular: bool,
}

impl Default for BSpline3d {
    fn default() -> Self {
        Self {
            control_points: Vec::new(),
            weights: Vec::new(),
            degree: 3,
            knots: Vec::new(),
            output: vec![Point3d::ORIGIN; DEFAULT_OUTPUT_SIZE],
            bunch_amp: 0.0,
            bunch_dist: 0.5,
            singular: true,
        }
    }
}

impl BSpline3d {
    pub fn new(degree: usize) -> Result<Self, GeometryError> {
        let mut spline = Self::default();
        spline.set_degree(degree)?;
        Ok(spline)
    }

    /// Build a spline through the given control points with a common weight
    /// and make the knot vector.
    pub fn with_control_points(
        degree: usize,
        points: &[Point3d],
        weight: f64,
    ) -> Result<Self, GeometryError> {
        let mut spline = Self::new(degree)?;
        for p in points {
            spline.append_control_point(*p, weight);
        }
        if !spline.update_spline() {
            return Err(GeometryError::NotEnoughControlPoints {
                required: 2,
                actual: points.len(),
            });
        }
        Ok(spline)
    }

    /// Requested degree. The curve is built with [`BSpline3d::effective_degree`].
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Degree actually used for the knots and the basis: never more than `n - 1`.
    pub fn effective_degree(&self) -> usize {
        self.degree.min(self.control_points.len().saturating_sub(1)).max(1)
    }

    pub fn set_degree(&mut self, degree: usize) -> Result<(), GeometryError> {
        if degree == 0 {
            return Err(GeometryError::InvalidDegree {
                degree,
                n_points: self.control_points.len(),
            });
        }
        self.degree = degree;
        Ok(())
    }

    pub fn control_points(&self) -> &[Point3d] {
        &self.control_points
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    pub fn output_points(&self) -> &[Point3d] {
        &self.output
    }

    pub fn output_size(&self) -> usize {
        self.output.len()
    }

    /// Number of samples produced by [`BSpline3d::make_curve`]; at least 2.
    pub fn set_output_size(&mut self, n: usize) {
        self.output.resize(n.max(2), Point3d::ORIGIN);
    }

    pub fn set_bunching(&mut self, amp: f64, dist: f64) {
        self.bunch_amp = amp;
        self.bunch_dist = dist.clamp(0.0, 1.0);
    }

    pub fn is_singular(&self) -> bool {
        self.singular
    }

    pub fn append_control_point(&mut self, point: Point3d, weight: f64) {
        self.control_points.push(point);
        self.weights.push(weight);
    }

    pub fn insert_control_point(
        &mut self,
        index: usize,
        point: Point3d,
        weight: f64,
    ) -> Result<(), GeometryError> {
        if index > self.control_points.len() {
            return Err(GeometryError::IndexOutOfRange {
                index,
                len: self.control_points.len(),
            });
        }
        self.control_points.insert(index, point);
        self.weights.insert(index, weight);
        Ok(())
    }

    pub fn remove_control_point(&mut self, index: usize) -> Result<Point3d, GeometryError> {
        if index >= self.control_points.len() {
            return Err(GeometryError::IndexOutOfRange {
                index,
                len: self.control_points.len(),
            });
        }
        self.weights.remove(index);
        Ok(self.control_points.remove(index))
    }

    /// Move a control point. The knot vector stays valid.
    pub fn set_control_point(&mut self, index: usize, point: Point3d) -> Result<(), GeometryError> {
        let len = self.control_points.len();
        let slot = self
            .control_points
            .get_mut(index)
            .ok_or(GeometryError::IndexOutOfRange { index, len })?;
        *slot = point;
        Ok(())
    }

    pub fn set_uniform_weights(&mut self) {
        self.weights = vec![1.0; self.control_points.len()];
    }

    /// Replace the control polygon by `n` points.
    ///
    /// The end points are kept. Interior points are sampled along the current
    /// curve when it can be evaluated, otherwise spaced along the chord.
    pub fn resize_control_points(&mut self, n: usize) -> Result<(), GeometryError> {
        let current = self.control_points.len();
        if n < 2 || current < 2 {
            return Err(GeometryError::NotEnoughControlPoints {
                required: 2,
                actual: n.min(current),
            });
        }
        if n == current {
            return Ok(());
        }

        let first = self.control_points[0];
        let last = self.control_points[current - 1];
        let (w0, w1) = (self.weights[0], self.weights[current - 1]);
        let on_curve = self.check_ready().is_ok();

        let mut points = Vec::with_capacity(n);
        let mut weights = Vec::with_capacity(n);
        for j in 0..n {
            let tau = j as f64 / (n - 1) as f64;
            let p = if j == 0 {
                first
            } else if j == n - 1 {
                last
            } else if on_curve {
                self.spline_point(tau)?
            } else {
                first.lerp(&last, tau)
            };
            points.push(p);
            weights.push(w0 + tau * (w1 - w0));
        }
        self.control_points = points;
        self.weights = weights;
        self.update_spline();
        Ok(())
    }

    /// Rebuild the clamped knot vector from the control-point count and degree.
    ///
    /// Returns `false` and leaves the curve singular when fewer than two
    /// control points are present.
    pub fn update_spline(&mut self) -> bool {
        let n = self.control_points.len();
        if n < 2 {
            self.knots.clear();
            self.singular = true;
            return false;
        }
        let p = self.effective_degree();
        if p < self.degree {
            debug!(
                degree = self.degree,
                effective_degree = p,
                n_points = n,
                "spline degree capped by the control point count"
            );
        }
        let n_knots = p + n + 1;
        self.knots = (0..n_knots)
            .map(|j| {
                if j <= p {
                    0.0
                } else if j < n {
                    (j - p) as f64 / (n - p) as f64
                } else {
                    1.0
                }
            })
            .collect();
        self.singular = false;
        true
    }

    fn check_ready(&self) -> Result<usize, GeometryError> {
        let n = self.control_points.len();
        if n < 2 {
            return Err(GeometryError::NotEnoughControlPoints {
                required: 2,
                actual: n,
            });
        }
        let p = self.effective_degree();
        if self.knots.len() != p + n + 1 || self.weights.len() != n {
            return Err(GeometryError::KnotsOutOfDate);
        }
        Ok(p)
    }

    /// Evaluate the rational curve at `t` in [0,1].
    pub fn spline_point(&self, t: f64) -> Result<Point3d, GeometryError> {
        let p = self.check_ready()?;
        let t = t.clamp(0.0, 1.0);
        let span = find_span(&self.knots, self.control_points.len(), p, t);
        let basis = basis_functions(&self.knots, span, p, t);

        let mut sum = Vec3::ZERO;
        let mut w = 0.0;
        for (k, b) in basis.iter().enumerate() {
            let i = span - p + k;
            let bw = b * self.weights[i];
            sum += self.control_points[i].to_vec3() * bw;
            w += bw;
        }
        if w.abs() < MIN_WEIGHT_SUM || !w.is_finite() {
            return Err(GeometryError::DegenerateWeights { t });
        }
        Ok(Point3d::ORIGIN + sum / w)
    }

    /// First derivative dC/dt of the rational curve.
    ///
    /// Basis derivatives use the degree p-1 recurrence; terms over
    /// zero-length knot spans are dropped.
    pub fn spline_derivative(&self, t: f64) -> Result<Vec3, GeometryError> {
        let p = self.check_ready()?;
        let t = t.clamp(0.0, 1.0);
        let n = self.control_points.len();
        let pf = p as f64;

        let mut a = Vec3::ZERO;
        let mut da = Vec3::ZERO;
        let mut w = 0.0;
        let mut dw = 0.0;
        for i in 0..n {
            let k0 = self.knots[i + p] - self.knots[i];
            let k1 = self.knots[i + p + 1] - self.knots[i + 1];
            let mut dn = 0.0;
            if k0.abs() > 0.0 {
                dn += pf / k0 * one_basis(&self.knots, i, p - 1, t);
            }
            if k1.abs() > 0.0 {
                dn -= pf / k1 * one_basis(&self.knots, i + 1, p - 1, t);
            }
            let nb = one_basis(&self.knots, i, p, t);
            let pi = self.control_points[i].to_vec3();
            let wi = self.weights[i];
            a += pi * (nb * wi);
            w += nb * wi;
            da += pi * (dn * wi);
            dw += dn * wi;
        }
        if w.abs() < MIN_WEIGHT_SUM || !w.is_finite() {
            return Err(GeometryError::DegenerateWeights { t });
        }
        let c = a / w;
        Ok((da - c * dw) / w)
    }

    /// Sample the curve into the output buffer at bunched parameters.
    /// The last sample is the last control point exactly.
    pub fn make_curve(&mut self) -> Result<(), GeometryError> {
        self.check_ready()?;
        let size = self.output.len();
        let mut output = Vec::with_capacity(size);
        for j in 0..size {
            let t = j as f64 / (size - 1) as f64;
            let u = bunched_parameter(self.bunch_dist, self.bunch_amp, t);
            output.push(self.spline_point(u)?);
        }
        if let (Some(slot), Some(last)) = (output.last_mut(), self.control_points.last()) {
            *slot = *last;
        }
        self.output = output;
        Ok(())
    }

    /// Least-squares fit of `n_ctrl` control points to `points`.
    ///
    /// The curve passes through the first and last data points. The interior
    /// control points solve the normal equations built from the basis sampled
    /// at uniformly spaced parameters, one right-hand side per axis. Requires
    /// `1 <= degree < n_ctrl < points.len()`.
    pub fn approximate(
        &mut self,
        degree: usize,
        n_ctrl: usize,
        points: &[Point3d],
    ) -> Result<(), GeometryError> {
        let h = n_ctrl.saturating_sub(1);
        if degree == 0 || degree > h {
            self.singular = true;
            return Err(GeometryError::InvalidDegree {
                degree,
                n_points: n_ctrl,
            });
        }
        if points.len() < n_ctrl + 1 {
            self.singular = true;
            return Err(GeometryError::NotEnoughDataPoints {
                required: n_ctrl + 1,
                actual: points.len(),
                n_ctrl,
            });
        }
        let n = points.len() - 1;
        let p = degree;
        let (d0, dn) = (points[0], points[n]);

        self.degree = p;
        self.control_points = vec![d0; h + 1];
        self.control_points[h] = dn;
        self.set_uniform_weights();
        self.update_spline();

        let n_int = h - 1;
        if n_int > 0 {
            let tk: Vec<f64> = (0..=n).map(|k| k as f64 / n as f64).collect();
            // rows: interior data points, cols: interior control points
            let basis = DMatrix::from_fn(n - 1, n_int, |r, c| one_basis(&self.knots, c + 1, p, tk[r + 1]));
            let ntn = basis.transpose() * &basis;

            let mut residual = DMatrix::zeros(n - 1, 3);
            for k in 1..n {
                let b0 = one_basis(&self.knots, 0, p, tk[k]);
                let bh = one_basis(&self.knots, h, p, tk[k]);
                let q = points[k].to_vec3() - d0.to_vec3() * b0 - dn.to_vec3() * bh;
                residual[(k - 1, 0)] = q.x;
                residual[(k - 1, 1)] = q.y;
                residual[(k - 1, 2)] = q.z;
            }
            let rhs = basis.transpose() * residual;

            let sol = match solve_linear_system_multi(&ntn, &rhs) {
                Ok(sol) => sol,
                Err(e) => {
                    warn!(degree, n_ctrl, n_data = points.len(), "spline approximation is singular");
                    self.singular = true;
                    return Err(e.into());
                }
            };
            for r in 0..n_int {
                self.control_points[r + 1] = Point3d::new(sol[(r, 0)], sol[(r, 1)], sol[(r, 2)]);
            }
        }
        debug!(degree, n_ctrl, n_data = points.len(), "spline approximated");
        self.make_curve()
    }
}

/// Knot span containing `t` (Piegl & Tiller A2.1), for `n` control points.
fn find_span(knots: &[f64], n: usize, p: usize, t: f64) -> usize {
    let last = n - 1;
    if t >= knots[last + 1] {
        return last;
    }
    if t <= knots[p] {
        return p;
    }
    let mut low = p;
    let mut high = last + 1;
    let mut mid = (low + high) / 2;
    while t < knots[mid] || t >= knots[mid + 1] {
        if t < knots[mid] {
            high = mid;
        } else {
            low = mid;
        }
        mid = (low + high) / 2;
    }
    mid
}

/// The p+1 non-vanishing basis functions on `span` (Piegl & Tiller A2.2).
fn basis_functions(knots: &[f64], span: usize, p: usize, t: f64) -> Vec<f64> {
    let mut n_vals = vec![0.0; p + 1];
    let mut left = vec![0.0; p + 1];
    let mut right = vec![0.0; p + 1];

    n_vals[0] = 1.0;
    for j in 1..=p {
        left[j] = t - knots[span + 1 - j];
        right[j] = knots[span + j] - t;
        let mut saved = 0.0;
        for r in 0..j {
            let temp = n_vals[r] / (right[r + 1] + left[j - r]);
            n_vals[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        n_vals[j] = saved;
    }
    n_vals
}

/// A single basis function N_{i,p}(t) (Piegl & Tiller A2.4).
fn one_basis(knots: &[f64], i: usize, p: usize, t: f64) -> f64 {
    let m = knots.len() - 1;
    if (i == 0 && t == knots[0]) || (i + p + 1 == m && t == knots[m]) {
        return 1.0;
    }
    if t < knots[i] || t >= knots[i + p + 1] {
        return 0.0;
    }
    let mut n: Vec<f64> = (0..=p)
        .map(|j| {
            if t >= knots[i + j] && t < knots[i + j + 1] {
                1.0
            } else {
                0.0
            }
        })
        .collect();
    for k in 1..=p {
        let mut saved = if n[0] == 0.0 {
            0.0
        } else {
            (t - knots[i]) * n[0] / (knots[i + k] - knots[i])
        };
        for j in 0..(p - k + 1) {
            let u_left = knots[i + j + 1];
            let u_right = knots[i + j + k + 1];
            if n[j + 1] == 0.0 {
                n[j] = saved;
                saved = 0.0;
            } else {
                let temp = n[j + 1] / (u_right - u_left);
                n[j] = saved + (u_right - t) * temp;
                saved = (t - u_left) * temp;
            }
        }
    }
    n[0]
}
