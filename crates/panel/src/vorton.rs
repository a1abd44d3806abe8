//! Vorton wake: point vortices that continue a short panel wake downstream.

use std::f64::consts::PI;

use aero_kernel::{Point3d, Vec3};
use serde::{Deserialize, Serialize};

use crate::config::GroundPlane;
use crate::kernels::vortex_velocity;

/// Vortons of a freshly shed row closer than this are merged.
pub const MERGE_DISTANCE: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vorton {
    pub position: Point3d,
    /// Vortex vector: direction times circulation times length.
    pub omega: Vec3,
    pub active: bool,
}

impl Vorton {
    pub fn new(position: Point3d, omega: Vec3) -> Self {
        Self {
            position,
            omega,
            active: true,
        }
    }

    /// Regularised Biot-Savart velocity, Rosenhead-Moore kernel of core `core`.
    pub fn induced_velocity(&self, c: &Point3d, core: f64) -> Vec3 {
        let r = *c - self.position;
        let d2 = r.norm_squared() + core * core;
        if d2 <= 0.0 {
            return Vec3::ZERO;
        }
        self.omega.cross(&r) / (4.0 * PI * d2 * d2.sqrt())
    }
}

/// Straight vortex closing the last wake panel of a column, cancelling its
/// trailing side so the vortons take over.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NegatingVortex {
    pub a: Point3d,
    pub b: Point3d,
    pub circulation: f64,
    /// Indices of the station's two vortons, the same in every row.
    pub vortons: [usize; 2],
}

impl NegatingVortex {
    pub fn induced_velocity(&self, c: &Point3d, core: f64) -> Vec3 {
        vortex_velocity(&self.a, &self.b, c, core) * self.circulation
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VortonWake {
    /// Rows ordered downstream; each row holds two vortons per station.
    pub rows: Vec<Vec<Vorton>>,
    pub negating: Vec<NegatingVortex>,
}

impl VortonWake {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.negating.is_empty()
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_vortons(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    pub fn n_active(&self) -> usize {
        self.rows.iter().flatten().filter(|v| v.active).count()
    }

    /// Put `row` upstream of the existing rows. The most downstream row is
    /// dropped once none of its vortons is active.
    pub fn prepend_row(&mut self, row: Vec<Vorton>) {
        self.rows.insert(0, row);
        if self.rows.len() > 1 && self.rows.last().is_some_and(|r| r.iter().all(|v| !v.active)) {
            self.rows.pop();
        }
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.negating.clear();
    }

    /// Velocity induced at `c` by every active vorton and negating vortex,
    /// mirrored in the ground plane when one is set.
    pub fn velocity(
        &self,
        c: &Point3d,
        vorton_core: f64,
        vortex_core: f64,
        ground: Option<&GroundPlane>,
    ) -> Vec3 {
        let direct = |p: &Point3d| -> Vec3 {
            let v: Vec3 = self
                .rows
                .iter()
                .flatten()
                .filter(|v| v.active)
                .map(|v| v.induced_velocity(p, vorton_core))
                .sum();
            v + self
                .negating
                .iter()
                .map(|nv| nv.induced_velocity(p, vortex_core))
                .sum::<Vec3>()
        };
        let mut v = direct(c);
        if let Some(g) = ground {
            let vg = direct(&c.ground_image(g.height));
            v += Vec3::new(vg.x, vg.y, -vg.z) * g.coef();
        }
        v
    }
}

/// Fold vortons of `row` lying within `distance` of an earlier one into it,
/// summing their vortex vectors, and remap the negating vortex indices.
pub fn merge_coincident(row: &mut Vec<Vorton>, negating: &mut [NegatingVortex], distance: f64) {
    let mut i = 0;
    while i < row.len() {
        let mut j = row.len() - 1;
        while j > i {
            if (row[i].position - row[j].position).norm() < distance {
                let absorbed = row.remove(j);
                row[i].omega += absorbed.omega;
                for index in negating.iter_mut().flat_map(|nv| nv.vortons.iter_mut()) {
                    if *index == j {
                        *index = i;
                    } else if *index > j {
                        *index -= 1;
                    }
                }
            }
            j -= 1;
        }
        i += 1;
    }
}
