//! Section polars and their interpolation over angle, Reynolds number and span.

use aero_solver::qr_least_squares;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::LltError;

/// Half-width of the angle window, degrees, around the zero-lift angle used to
/// fit the lift slope.
const LINEAR_RANGE: f64 = 6.0;

/// One row of a section polar.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PolarPoint {
    /// Degrees.
    pub alpha: f64,
    pub cl: f64,
    pub cd: f64,
    /// Quarter-chord pitching moment coefficient.
    pub cm: f64,
    pub xtr_top: f64,
    pub xtr_bot: f64,
    /// Centre of pressure, fraction of chord. Zero when unknown.
    pub xcp: f64,
}

impl PolarPoint {
    fn lerp(&self, other: &PolarPoint, t: f64) -> PolarPoint {
        let f = |a: f64, b: f64| a + (b - a) * t;
        PolarPoint {
            alpha: f(self.alpha, other.alpha),
            cl: f(self.cl, other.cl),
            cd: f(self.cd, other.cd),
            cm: f(self.cm, other.cm),
            xtr_top: f(self.xtr_top, other.xtr_top),
            xtr_bot: f(self.xtr_bot, other.xtr_bot),
            xcp: f(self.xcp, other.xcp),
        }
    }
}

/// Interpolated section data and whether the query left the tabulated range.
/// Out-of-range queries are clamped to the nearest edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolarLookup {
    pub point: PolarPoint,
    pub out_of_re: bool,
    pub out_of_alpha: bool,
}

/// A fixed-Reynolds polar, sorted by angle of attack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polar {
    reynolds: f64,
    points: Vec<PolarPoint>,
    alpha0: f64,
    slope: f64,
}

impl Polar {
    pub fn new(reynolds: f64, mut points: Vec<PolarPoint>) -> Result<Self, LltError> {
        if !(reynolds.is_finite() && reynolds > 0.0) {
            return Err(LltError::InvalidPolar(format!("bad Reynolds number {reynolds}")));
        }
        if points.len() < 2 {
            return Err(LltError::InvalidPolar(format!(
                "Re = {reynolds:.0}: at least two points are required"
            )));
        }
        if points.iter().any(|p| !(p.alpha.is_finite() && p.cl.is_finite() && p.cd.is_finite())) {
            return Err(LltError::InvalidPolar(format!("Re = {reynolds:.0}: non-finite point")));
        }
        points.sort_by(|a, b| a.alpha.total_cmp(&b.alpha));
        if points.windows(2).any(|w| w[0].alpha == w[1].alpha) {
            return Err(LltError::InvalidPolar(format!(
                "Re = {reynolds:.0}: duplicate angles of attack"
            )));
        }
        let (alpha0, slope) = linear_fit(&points)?;
        Ok(Self {
            reynolds,
            points,
            alpha0,
            slope,
        })
    }

    pub fn reynolds(&self) -> f64 {
        self.reynolds
    }

    pub fn points(&self) -> &[PolarPoint] {
        &self.points
    }

    /// Linear interpolation in alpha; clamps and flags angles outside the table.
    pub fn interpolate(&self, alpha: f64) -> (PolarPoint, bool) {
        let first = &self.points[0];
        let last = &self.points[self.points.len() - 1];
        if alpha < first.alpha {
            return (*first, true);
        }
        if alpha > last.alpha {
            return (*last, true);
        }
        let k = self
            .points
            .windows(2)
            .position(|w| alpha <= w[1].alpha)
            .unwrap_or(self.points.len() - 2);
        let (p0, p1) = (&self.points[k], &self.points[k + 1]);
        (p0.lerp(p1, (alpha - p0.alpha) / (p1.alpha - p0.alpha)), false)
    }

    /// Angle where the tabulated lift changes sign, else the fitted one.
    pub fn zero_lift_angle(&self) -> f64 {
        self.points
            .windows(2)
            .find(|w| w[0].cl <= 0.0 && w[1].cl > 0.0)
            .map(|w| w[0].alpha - w[0].cl * (w[1].alpha - w[0].alpha) / (w[1].cl - w[0].cl))
            .unwrap_or(self.alpha0)
    }

    /// Fitted zero-lift angle (degrees) and lift slope (per radian).
    pub fn linearized(&self) -> (f64, f64) {
        (self.alpha0, self.slope)
    }
}

/// Least-squares line through the points near the zero-lift angle.
fn linear_fit(points: &[PolarPoint]) -> Result<(f64, f64), LltError> {
    let guess = points
        .iter()
        .min_by(|a, b| a.cl.abs().total_cmp(&b.cl.abs()))
        .map_or(0.0, |p| p.alpha);
    let mut window: Vec<&PolarPoint> = points
        .iter()
        .filter(|p| (p.alpha - guess).abs() <= LINEAR_RANGE)
        .collect();
    if window.len() < 2 {
        window = points.iter().collect();
    }
    let a = DMatrix::from_fn(window.len(), 2, |i, j| {
        if j == 0 { window[i].alpha.to_radians() } else { 1.0 }
    });
    let b = DVector::from_iterator(window.len(), window.iter().map(|p| p.cl));
    let x = qr_least_squares(&a, &b)?;
    let slope = x[0];
    if !(slope.is_finite() && slope > 0.0) {
        return Err(LltError::InvalidPolar(format!("non-positive lift slope {slope}")));
    }
    Ok(((-x[1] / slope).to_degrees(), slope))
}

/// Section data for the lifting line at relative span `yob` in [-1, 1].
pub trait ViscousPolars {
    fn lookup(&self, yob: f64, re: f64, alpha: f64) -> PolarLookup;
    fn zero_lift_angle(&self, yob: f64, re: f64) -> f64;
    /// Zero-lift angle (degrees) and lift slope (per radian).
    fn linearized(&self, yob: f64, re: f64) -> (f64, f64);
}

/// Polars of one foil at several Reynolds numbers, linear in Re between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolarMesh {
    polars: Vec<Polar>,
}

impl PolarMesh {
    pub fn new(mut polars: Vec<Polar>) -> Result<Self, LltError> {
        if polars.is_empty() {
            return Err(LltError::InvalidPolar("empty polar mesh".into()));
        }
        polars.sort_by(|a, b| a.reynolds.total_cmp(&b.reynolds));
        if polars.windows(2).any(|w| w[0].reynolds == w[1].reynolds) {
            return Err(LltError::InvalidPolar("duplicate Reynolds numbers".into()));
        }
        Ok(Self { polars })
    }

    pub fn polars(&self) -> &[Polar] {
        &self.polars
    }

    /// The bracketing polars and the Re weight of the second, plus whether
    /// `re` fell outside the mesh.
    fn bracket(&self, re: f64) -> (&Polar, &Polar, f64, bool) {
        let n = self.polars.len();
        let (first, last) = (&self.polars[0], &self.polars[n - 1]);
        if re < first.reynolds {
            return (first, first, 0.0, true);
        }
        if re > last.reynolds || n == 1 {
            return (last, last, 0.0, re != last.reynolds);
        }
        let k = self
            .polars
            .windows(2)
            .position(|w| re <= w[1].reynolds)
            .unwrap_or(n - 2);
        let (p0, p1) = (&self.polars[k], &self.polars[k + 1]);
        (p0, p1, (re - p0.reynolds) / (p1.reynolds - p0.reynolds), false)
    }

    pub fn interpolate(&self, re: f64, alpha: f64) -> PolarLookup {
        let (p0, p1, t, out_of_re) = self.bracket(re);
        let (a, out0) = p0.interpolate(alpha);
        let (b, out1) = p1.interpolate(alpha);
        PolarLookup {
            point: a.lerp(&b, t),
            out_of_re,
            out_of_alpha: out0 || out1,
        }
    }

    pub fn zero_lift(&self, re: f64) -> f64 {
        let (p0, p1, t, _) = self.bracket(re);
        let (a0, a1) = (p0.zero_lift_angle(), p1.zero_lift_angle());
        a0 + (a1 - a0) * t
    }

    pub fn linear(&self, re: f64) -> (f64, f64) {
        let (p0, p1, t, _) = self.bracket(re);
        let ((a0, s0), (a1, s1)) = (p0.linearized(), p1.linearized());
        (a0 + (a1 - a0) * t, s0 + (s1 - s0) * t)
    }
}

impl ViscousPolars for PolarMesh {
    fn lookup(&self, _yob: f64, re: f64, alpha: f64) -> PolarLookup {
        self.interpolate(re, alpha)
    }

    fn zero_lift_angle(&self, _yob: f64, re: f64) -> f64 {
        self.zero_lift(re)
    }

    fn linearized(&self, _yob: f64, re: f64) -> (f64, f64) {
        self.linear(re)
    }
}

/// Root and tip foils blended linearly along the half span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendedPolars {
    pub root: PolarMesh,
    pub tip: PolarMesh,
}

impl BlendedPolars {
    pub fn new(root: PolarMesh, tip: PolarMesh) -> Self {
        Self { root, tip }
    }
}

impl ViscousPolars for BlendedPolars {
    fn lookup(&self, yob: f64, re: f64, alpha: f64) -> PolarLookup {
        let tau = yob.abs().min(1.0);
        let r = self.root.interpolate(re, alpha);
        let t = self.tip.interpolate(re, alpha);
        PolarLookup {
            point: r.point.lerp(&t.point, tau),
            out_of_re: r.out_of_re || t.out_of_re,
            out_of_alpha: r.out_of_alpha || t.out_of_alpha,
        }
    }

    fn zero_lift_angle(&self, yob: f64, re: f64) -> f64 {
        let tau = yob.abs().min(1.0);
        let (r, t) = (self.root.zero_lift(re), self.tip.zero_lift(re));
        r + (t - r) * tau
    }

    fn linearized(&self, yob: f64, re: f64) -> (f64, f64) {
        let tau = yob.abs().min(1.0);
        let ((ar, sr), (at, st)) = (self.root.linear(re), self.tip.linear(re));
        (ar + (at - ar) * tau, sr + (st - sr) * tau)
    }
}
