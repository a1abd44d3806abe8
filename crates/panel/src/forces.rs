//! Surface pressures and the two force estimates: pressure integration on
//! the body, and Kutta-Joukowski strip forces with the wake downwash.

use aero_kernel::{Point3d, Vec3};
use aero_solver::qr_least_squares;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::axes::{wind_direction, wind_normal, wind_side};
use crate::config::ReferenceDimensions;
use crate::engine::{FOUR_PI, PanelAnalysis};
use crate::error::AnalysisError;
use crate::panel::PanelKernel;
use crate::wake::WakeColumn;

/// Body-axis force (N) and moment about the CoG (N·m).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AeroForces {
    pub force: Vec3,
    pub moment: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AeroCoefficients {
    pub cl: f64,
    pub cd: f64,
    pub cy: f64,
    /// Rolling moment.
    pub cl_roll: f64,
    pub cm: f64,
    pub cn: f64,
}

impl AeroForces {
    pub fn coefficients(
        &self,
        alpha: f64,
        beta: f64,
        q_dyn: f64,
        reference: &ReferenceDimensions,
    ) -> AeroCoefficients {
        let qs = q_dyn * reference.area;
        AeroCoefficients {
            cl: self.force.dot(&wind_normal(alpha, beta)) / qs,
            cd: self.force.dot(&wind_direction(alpha, beta)) / qs,
            cy: self.force.dot(&wind_side(alpha, beta)) / qs,
            cl_roll: self.moment.x / (qs * reference.span),
            cm: self.moment.y / (qs * reference.chord),
            cn: self.moment.z / (qs * reference.span),
        }
    }
}

/// Loading of one spanwise strip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpanStation {
    /// Middle of the strip's bound vortex.
    pub position: Point3d,
    pub strip_area: f64,
    pub gamma: f64,
    pub cl: f64,
    /// Induced drag coefficient of the strip.
    pub icd: f64,
    /// Induced angle, degrees.
    pub ai: f64,
    /// Downwash at the bound vortex.
    pub vd: Vec3,
    /// Induced force divided by the dynamic pressure.
    pub force: Vec3,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpanDistribution {
    pub stations: Vec<SpanStation>,
    /// Sum of the strip induced forces divided by the dynamic pressure.
    pub induced_force: Vec3,
}

impl SpanDistribution {
    /// Induced drag coefficient on the reference area.
    pub fn cdi(&self, alpha: f64, beta: f64, reference_area: f64) -> f64 {
        self.induced_force.dot(&wind_direction(alpha, beta)) / reference_area
    }

    pub fn cl(&self, reference_area: f64) -> f64 {
        self.stations.iter().map(|s| s.cl * s.strip_area).sum::<f64>() / reference_area
    }
}

impl PanelAnalysis {
    /// Surface gradient of the doublet density in the panel's (l, m) axes,
    /// least squares over the neighbouring collocation points.
    pub fn doublet_gradient(&self, i: usize, mu: &[f64]) -> (f64, f64) {
        let panels = self.mesh().panels();
        let frame = panels[i].frame();
        let rows: Vec<(f64, f64, f64)> = panels[i]
            .neighbours
            .iter()
            .flatten()
            .map(|&j| {
                let d = panels[j].collocation_point() - frame.origin;
                (d.dot(&frame.l), d.dot(&frame.m), mu[j] - mu[i])
            })
            .collect();
        if rows.is_empty() {
            return (0.0, 0.0);
        }
        let a = DMatrix::from_fn(rows.len(), 2, |r, c| if c == 0 { rows[r].0 } else { rows[r].1 });
        let b = DVector::from_iterator(rows.len(), rows.iter().map(|r| r.2));
        match qr_least_squares(&a, &b) {
            Ok(x) => (x[0], x[1]),
            Err(_) => (0.0, 0.0),
        }
    }

    /// Pressure coefficients from the local onset velocity and the doublet
    /// gradient. Thin panels return the upper minus lower difference.
    pub fn on_body_cp(&self, mu: &[f64], v_field: &[Vec3]) -> Vec<f64> {
        self.mesh()
            .panels()
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let q2 = v_field[i].norm_squared();
                if q2 < 1e-20 {
                    return 0.0;
                }
                let (gl, gm) = self.doublet_gradient(i, mu);
                let vl = Vec3::new(-FOUR_PI * gl, -FOUR_PI * gm, 0.0);
                let local = p.frame().to_local(&v_field[i]);
                let vt = Vec3::new(local.x, local.y, 0.0);
                if p.is_mid() {
                    let upper = (vt + vl * 0.5).norm_squared();
                    let lower = (vt - vl * 0.5).norm_squared();
                    (lower - upper) / q2
                } else {
                    1.0 - (vt + vl).norm_squared() / q2
                }
            })
            .collect()
    }

    /// Pressure forces summed over the panels.
    pub fn near_field_forces(&self, cp: &[f64], v_field: &[Vec3]) -> AeroForces {
        let rho = self.config().density;
        let cog = self.config().cog;
        self.mesh()
            .panels()
            .iter()
            .enumerate()
            .fold(AeroForces::default(), |mut acc, (i, p)| {
                let q = 0.5 * rho * v_field[i].norm_squared();
                let f = p.normal() * (-cp[i] * p.area() * q);
                acc.force += f;
                acc.moment += (p.collocation_point() - cog).cross(&f);
                acc
            })
    }

    /// Downwash at a strip's bound vortex: half the wake-induced velocity
    /// halfway down its wake column.
    pub fn strip_downwash(&self, column: &WakeColumn, mu: &[f64]) -> Vec3 {
        match column.mid_point() {
            Some(p) => self.perturbation_velocity(&p, mu, &[], true) * 0.5,
            None => Vec3::ZERO,
        }
    }

    /// Strip circulation of a wake column, positive for lift.
    pub fn strip_circulation(column: &WakeColumn, mu: &[f64]) -> f64 {
        -FOUR_PI * column.strength(mu)
    }

    /// Kutta-Joukowski strip forces for the force, pressure integration for
    /// the moment.
    pub fn forces(&self, mu: &[f64], cp: &[f64], v_field: &[Vec3]) -> AeroForces {
        let rho = self.config().density;
        let panels = self.mesh().panels();
        let force: Vec3 = self
            .wake_columns()
            .iter()
            .map(|column| {
                let vd = self.strip_downwash(column, mu);
                let vortex = panels[column.upper].trailing_vortex();
                let gamma = Self::strip_circulation(column, mu);
                (vd + v_field[column.upper]).cross(&vortex) * (gamma * rho)
            })
            .sum();
        AeroForces {
            force,
            moment: self.near_field_forces(cp, v_field).moment,
        }
    }

    fn span_station(
        &self,
        column: &WakeColumn,
        gamma: f64,
        vortex: Vec3,
        position: Point3d,
        vd: Vec3,
        v_inf: Vec3,
    ) -> SpanStation {
        let upper = &self.mesh().panels()[column.upper];
        let speed = v_inf.norm();
        let winddir = v_inf / speed;
        let q_factor = 2.0 / (speed * speed);
        let strip_area = self.mesh().strip_area(column.strip);
        let force = vd.cross(&vortex) * (gamma * q_factor);
        let lift = v_inf.cross(&vortex) * (gamma * q_factor);
        let normal = upper.surface_normal();
        SpanStation {
            position,
            strip_area,
            gamma,
            cl: lift.dot(&normal) / strip_area,
            icd: force.dot(&winddir) / strip_area,
            ai: vd.dot(&normal).atan2(speed).to_degrees(),
            vd,
            force,
        }
    }

    /// Span loading and induced force from the downwash of the panel wake.
    pub fn trefftz_drag(&self, mu: &[f64], alpha: f64, beta: f64, speed: f64) -> SpanDistribution {
        let v_inf = wind_direction(alpha, beta) * speed;
        let panels = self.mesh().panels();
        let stations: Vec<SpanStation> = self
            .wake_columns()
            .iter()
            .map(|column| {
                let upper = &panels[column.upper];
                let (va, vb) = upper.vortex_points();
                let vd = self.strip_downwash(column, mu);
                let gamma = Self::strip_circulation(column, mu);
                self.span_station(column, gamma, vb - va, va.midpoint(&vb), vd, v_inf)
            })
            .collect();
        let induced_force: Vec3 = stations.iter().map(|s| s.force).sum();
        SpanDistribution {
            stations,
            induced_force,
        }
    }

    /// Span loading from the vorton wake, evaluated on the middle row.
    pub fn vorton_drag(
        &self,
        mu: &[f64],
        alpha: f64,
        beta: f64,
        speed: f64,
    ) -> Result<SpanDistribution, AnalysisError> {
        let rows = &self.vortons().rows;
        if rows.is_empty() {
            return Err(AnalysisError::NotReady("make_vortons"));
        }
        let row = &rows[rows.len() / 2];
        let negating = &self.vortons().negating;
        let winddir = wind_direction(alpha, beta);
        let v_inf = winddir * speed;
        let stations: Vec<SpanStation> = self
            .wake_columns()
            .iter()
            .filter(|c| c.last_panel().is_some())
            .enumerate()
            .filter_map(|(m, column)| {
                let [i0, i1] = negating.get(m)?.vortons;
                let (v0, v1) = (row.get(i0)?, row.get(i1)?);
                let mid = v0.position.midpoint(&v1.position);
                let vd = self.perturbation_velocity(&mid, mu, &[], true) * 0.5;
                let vortex = v1.position - v0.position;
                let gamma = Self::strip_circulation(column, mu);
                let mut station = self.span_station(column, gamma, vortex, mid, vd, v_inf);
                let normal = winddir.cross(&vortex.normalized_or_zero());
                station.ai = vd.dot(&normal).atan2(speed).to_degrees();
                Some(station)
            })
            .collect();
        let induced_force: Vec3 = stations.iter().map(|s| s.force).sum();
        Ok(SpanDistribution {
            stations,
            induced_force,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::mesh::PanelMesh;

    #[test]
    fn test_coefficients_in_wind_axes() {
        let f = AeroForces {
            force: Vec3::new(1.0, 0.0, 10.0),
            moment: Vec3::new(0.0, -2.0, 0.0),
        };
        let reference = ReferenceDimensions {
            area: 2.0,
            span: 4.0,
            chord: 0.5,
        };
        let c = f.coefficients(0.0, 0.0, 0.5, &reference);
        assert_eq!(c.cl, 10.0);
        assert_eq!(c.cd, 1.0);
        assert_eq!(c.cm, -4.0);
        assert_eq!(c.cy, 0.0);
    }

    #[test]
    fn test_doublet_gradient_of_linear_field() {
        let mesh = PanelMesh::thin_wing(4.0, 1.0, 6, 8).unwrap();
        let a = PanelAnalysis::new(mesh, AnalysisConfig::single_threaded()).unwrap();
        let mu: Vec<f64> = a
            .mesh()
            .panels()
            .iter()
            .map(|p| {
                let c = p.collocation_point();
                2.0 * c.x - 0.5 * c.y
            })
            .collect();
        for i in 0..a.mesh().len() {
            let (gl, gm) = a.doublet_gradient(i, &mu);
            // l = x and m = y on a flat wing
            assert!((gl - 2.0).abs() < 1e-9, "panel {i}: {gl}");
            assert!((gm + 0.5).abs() < 1e-9, "panel {i}: {gm}");
        }
    }

    #[test]
    fn test_uniform_doublets_leave_freestream_pressure() {
        let mesh = PanelMesh::thin_wing(4.0, 1.0, 3, 4).unwrap();
        let a = PanelAnalysis::new(mesh, AnalysisConfig::single_threaded()).unwrap();
        let mu = vec![-0.3; a.mesh().len()];
        let field = a.onset_velocities(Vec3::X, Vec3::ZERO);
        assert!(a.on_body_cp(&mu, &field).iter().all(|cp| cp.abs() < 1e-12));
    }
}
