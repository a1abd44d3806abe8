//! Influence kernels of uniform source and doublet densities on flat
//! polygonal panels, after NASA TN D-4023, plus the straight vortex segment.
//!
//! Strengths are scaled by 1/4π: a unit doublet density produces a solid
//! angle, a unit source density an inverse distance. The same edge loop
//! serves quads and triangles.

use std::f64::consts::PI;

use aero_kernel::{Point3d, Vec3};
use serde::{Deserialize, Serialize};

/// Normal distance under which a field point is treated as lying in the panel plane.
const IN_PLANE_PRECISION: f64 = 1e-10;
/// Edges shorter than this are collapsed and skipped.
const NODE_PRECISION: f64 = 1e-10;

/// Local frame of a flat panel: origin at the collocation point, `n` the
/// unit normal, `m` towards the middle of the right side, `l = m × n`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PanelFrame {
    pub origin: Point3d,
    pub l: Vec3,
    pub m: Vec3,
    pub n: Vec3,
    pub area: f64,
    pub max_size: f64,
}

impl PanelFrame {
    pub fn to_local(&self, v: &Vec3) -> Vec3 {
        Vec3::new(v.dot(&self.l), v.dot(&self.m), v.dot(&self.n))
    }

    pub fn to_global(&self, v: &Vec3) -> Vec3 {
        self.l * v.x + self.m * v.y + self.n * v.z
    }

    /// True if `c` is far enough for the point-singularity approximation.
    fn is_far(&self, c: &Point3d, rff: Option<f64>) -> Option<(Vec3, f64, f64)> {
        let pjk = *c - self.origin;
        let r = pjk.norm();
        match rff {
            Some(f) if r > f * self.max_size => Some((pjk, r, pjk.dot(&self.n))),
            _ => None,
        }
    }
}

/// Velocity induced at `c` by a straight vortex segment `a -> b` of unit
/// circulation. Points within `core` of the segment see nothing.
pub fn vortex_velocity(a: &Point3d, b: &Point3d, c: &Point3d, core: f64) -> Vec3 {
    let r0 = *b - *a;
    let r1 = *c - *a;
    let r2 = *c - *b;
    let h = r1.cross(&r2);
    let h2 = h.norm_squared();
    let l0 = r0.norm_squared();
    let (n1, n2) = (r1.norm(), r2.norm());
    if l0 < NODE_PRECISION * NODE_PRECISION || n1 < core || n2 < core {
        return Vec3::ZERO;
    }
    if h2 <= core * core * l0 || h2 < 1e-30 {
        return Vec3::ZERO;
    }
    let t = r0.dot(&(r1 / n1 - r2 / n2));
    h * (t / h2 / (4.0 * PI))
}

/// Per-edge quantities shared by the potential formulas.
struct EdgeTerms {
    /// Solid-angle contribution of the edge.
    cjk: f64,
    /// `Al · GL` source log term, unused by doublets.
    log_term: f64,
    sm: f64,
    sl: f64,
    gl: f64,
}

fn edge_terms(
    c: &Point3d,
    p0: &Point3d,
    p1: &Point3d,
    frame: &PanelFrame,
    pn: f64,
    core: f64,
) -> Option<EdgeTerms> {
    let a = *c - *p0;
    let b = *c - *p1;
    let s = *p1 - *p0;
    let sn = s.norm();
    if sn < NODE_PRECISION {
        return None;
    }
    let (na, nb) = (a.norm(), b.norm());
    if na < core || nb < core {
        return None;
    }
    let h = a.cross(&s);
    if h.norm() < core && a.dot(&s) >= 0.0 && b.dot(&s) <= 0.0 {
        return None;
    }

    let sm = s.dot(&frame.m);
    let sl = s.dot(&frame.l);
    let am = a.dot(&frame.m);
    let al = a.dot(&frame.l);
    let a_l = am * sl - al * sm;
    let pa = pn * pn * sl + a_l * am;
    let pb = pa - a_l * sm;

    let gl = if (na + nb - sn).abs() > 0.0 {
        ((na + nb + sn) / (na + nb - sn)).abs().ln() / sn
    } else {
        0.0
    };

    let rnum = sm * pn * (nb * pa - na * pb);
    let dnom = pa * pb + pn * pn * na * nb * sm * sm;

    let cjk = if pn.abs() < IN_PLANE_PRECISION {
        let sign = if frame.n.dot(&h) >= 0.0 { 1.0 } else { -1.0 };
        let side = if pn > 0.0 { sign } else { -sign };
        if dnom < 0.0 {
            PI * side
        } else if dnom == 0.0 {
            PI / 2.0 * side
        } else {
            0.0
        }
    } else {
        rnum.atan2(dnom)
    };

    Some(EdgeTerms {
        cjk,
        log_term: a_l * gl,
        sm,
        sl,
        gl,
    })
}

fn edges(nodes: &[Point3d]) -> impl Iterator<Item = (&Point3d, &Point3d)> {
    nodes.iter().zip(nodes.iter().cycle().skip(1))
}

/// Potential of a unit doublet density. `self_influence` returns the
/// interior limit 2π at the panel's own collocation point.
pub fn doublet_potential(
    nodes: &[Point3d],
    frame: &PanelFrame,
    c: &Point3d,
    self_influence: bool,
    core: f64,
    rff: Option<f64>,
) -> f64 {
    if self_influence {
        return 2.0 * PI;
    }
    if let Some((_, r, pn)) = frame.is_far(c, rff) {
        return -pn * frame.area / (r * r * r);
    }
    let pn = (*c - frame.origin).dot(&frame.n);
    let sum: f64 = edges(nodes)
        .filter_map(|(p0, p1)| edge_terms(c, p0, p1, frame, pn, core))
        .map(|e| e.cjk)
        .sum();
    -sum
}

/// Velocity of a unit doublet density, computed as the equivalent vortex ring.
pub fn doublet_velocity(
    nodes: &[Point3d],
    frame: &PanelFrame,
    c: &Point3d,
    core: f64,
    rff: Option<f64>,
) -> Vec3 {
    if let Some((pjk, r, pn)) = frame.is_far(c, rff) {
        let t = pjk * (3.0 * pn) - frame.n * (r * r);
        return t * (frame.area / r.powi(5));
    }
    let v: Vec3 = edges(nodes)
        .map(|(p0, p1)| vortex_velocity(p0, p1, c, core))
        .sum();
    v * (4.0 * PI)
}

/// Potential of a unit source density.
pub fn source_potential(
    nodes: &[Point3d],
    frame: &PanelFrame,
    c: &Point3d,
    rff: Option<f64>,
) -> f64 {
    if let Some((_, r, _)) = frame.is_far(c, rff) {
        return -frame.area / r;
    }
    let pn = (*c - frame.origin).dot(&frame.n);
    let sum: f64 = edges(nodes)
        .filter_map(|(p0, p1)| edge_terms(c, p0, p1, frame, pn, 0.0))
        .map(|e| e.log_term - pn * e.cjk)
        .sum();
    -sum
}

/// Velocity of a unit source density. `self_influence` returns the
/// exterior limit 2π·n.
pub fn source_velocity(
    nodes: &[Point3d],
    frame: &PanelFrame,
    c: &Point3d,
    self_influence: bool,
    rff: Option<f64>,
) -> Vec3 {
    if self_influence {
        return frame.n * (2.0 * PI);
    }
    if let Some((pjk, r, _)) = frame.is_far(c, rff) {
        return pjk * (frame.area / (r * r * r));
    }
    let pn = (*c - frame.origin).dot(&frame.n);
    edges(nodes)
        .filter_map(|(p0, p1)| edge_terms(c, p0, p1, frame, pn, 0.0))
        .map(|e| frame.n * e.cjk + frame.l * (e.sm * e.gl) - frame.m * (e.sl * e.gl))
        .sum()
}
