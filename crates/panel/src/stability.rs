//! Trim and dynamic stability derivatives from the unit solutions.

use aero_kernel::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::axes::{wind_direction, wind_normal};
use crate::engine::PanelAnalysis;
use crate::error::AnalysisError;
use crate::forces::AeroForces;

const GRAVITY: f64 = 9.81;
const LIFT_PRECISION: f64 = 1e-10;
/// Speed perturbation, m/s.
const DELTA_SPEED: f64 = 0.001;
/// Rotation rate perturbation, rad/s.
const DELTA_RATE: f64 = 0.01;

/// Dimensional derivatives in stability axes: x forward, y right, z down.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StabilityDerivatives {
    pub alpha: f64,
    pub u0: f64,
    pub x_u: f64,
    pub x_w: f64,
    pub z_u: f64,
    pub z_w: f64,
    pub m_u: f64,
    pub m_w: f64,
    pub y_v: f64,
    pub l_v: f64,
    pub n_v: f64,
    pub y_p: f64,
    pub l_p: f64,
    pub n_p: f64,
    pub x_q: f64,
    pub z_q: f64,
    pub m_q: f64,
    pub y_r: f64,
    pub l_r: f64,
    pub n_r: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimmedState {
    pub alpha: f64,
    pub u0: f64,
    /// Lift at unit speed, N.
    pub unit_lift: f64,
}

struct StabilityAxes {
    is: Vec3,
    js: Vec3,
    ks: Vec3,
}

impl StabilityAxes {
    fn new(alpha: f64) -> Self {
        let a = alpha.to_radians();
        Self {
            is: Vec3::new(-a.cos(), 0.0, -a.sin()),
            js: Vec3::Y,
            ks: Vec3::new(a.sin(), 0.0, -a.cos()),
        }
    }
}

impl PanelAnalysis {
    /// Far-field force and on-body moment for an onset flow, by combination.
    fn combined_forces(&self, v_inf: Vec3, omega: Vec3) -> Result<AeroForces, AnalysisError> {
        let mu = self.combine_unit_rhs(v_inf, omega)?;
        let field = self.onset_velocities(v_inf, omega);
        let cp = self.on_body_cp(&mu, &field);
        Ok(self.forces(&mu, &cp, &field))
    }

    /// Pitching moment coefficient at unit speed and zero sideslip.
    pub fn pitching_moment(&mut self, alpha: f64) -> Result<f64, AnalysisError> {
        self.prepare()?;
        let v_inf = wind_direction(alpha, 0.0);
        let mu = self.combine_unit_rhs(v_inf, Vec3::ZERO)?;
        let field = self.onset_velocities(v_inf, Vec3::ZERO);
        let cp = self.on_body_cp(&mu, &field);
        let moment = self.near_field_forces(&cp, &field).moment;
        let reference = &self.config().reference;
        let q = 0.5 * self.config().density;
        Ok(moment.y / (q * reference.area * reference.chord))
    }

    /// Angle of attack where the pitching moment vanishes: bracket by
    /// shrinking ±30° until the moments change sign, then regula falsi.
    #[instrument(skip(self))]
    pub fn zero_moment_angle(&mut self) -> Result<f64, AnalysisError> {
        const EPS: f64 = 1e-7;
        let (mut a0, mut a1) = (-30.0_f64, 30.0_f64);
        let mut cm0 = self.pitching_moment(a0)?;
        let mut cm1 = self.pitching_moment(a1)?;
        for _ in 0..20 {
            if cm0 * cm1 <= 0.0 {
                break;
            }
            a0 *= 0.9;
            a1 *= 0.9;
            cm0 = self.pitching_moment(a0)?;
            cm1 = self.pitching_moment(a1)?;
        }
        if cm0 * cm1 > 0.0 {
            return Err(AnalysisError::NoZeroMomentAngle);
        }

        let mut alpha = a0;
        for iter in 0..50 {
            if (cm1 - cm0).abs() < f64::EPSILON {
                break;
            }
            alpha = a0 - cm0 * (a1 - a0) / (cm1 - cm0);
            let cm = self.pitching_moment(alpha)?;
            if cm.abs() < EPS || (a1 - a0).abs() < EPS {
                debug!(alpha, iter, "zero-moment angle converged");
                return Ok(alpha);
            }
            if cm * cm0 > 0.0 {
                a0 = alpha;
                cm0 = cm;
            } else {
                a1 = alpha;
                cm1 = cm;
            }
        }
        warn!(alpha, "zero-moment angle search stopped before convergence");
        Ok(alpha)
    }

    /// Balanced angle and the speed at which lift carries `mass`.
    pub fn trimmed_conditions(&mut self, mass: f64) -> Result<TrimmedState, AnalysisError> {
        if !(mass > 0.0) {
            return Err(AnalysisError::InvalidConfig(format!(
                "mass must be positive, got {mass}"
            )));
        }
        let alpha = self.zero_moment_angle()?;
        let forces = self.combined_forces(wind_direction(alpha, 0.0), Vec3::ZERO)?;
        let unit_lift = forces.force.dot(&wind_normal(alpha, 0.0));
        if unit_lift <= LIFT_PRECISION {
            return Err(AnalysisError::NegativeLift { alpha });
        }
        let u0 = (GRAVITY * mass / unit_lift).sqrt();
        info!(alpha, u0, "trimmed conditions");
        Ok(TrimmedState {
            alpha,
            u0,
            unit_lift,
        })
    }

    /// Central differences of the forces about the state (alpha, u0): speed
    /// perturbations along each stability axis, then rotations about them.
    #[instrument(skip(self))]
    pub fn stability_derivatives(
        &mut self,
        alpha: f64,
        u0: f64,
    ) -> Result<StabilityDerivatives, AnalysisError> {
        if !(u0 > 0.0) {
            return Err(AnalysisError::InvalidConfig(format!(
                "reference speed must be positive, got {u0}"
            )));
        }
        self.prepare()?;
        let StabilityAxes { is, js, ks } = StabilityAxes::new(alpha);
        let v0 = is * (-u0);

        // the body moving along `axis` sees the air coming the other way
        let translate = |s: &Self, axis: Vec3| -> Result<(Vec3, Vec3), AnalysisError> {
            let plus = s.combined_forces(v0 - axis * DELTA_SPEED, Vec3::ZERO)?;
            let minus = s.combined_forces(v0 + axis * DELTA_SPEED, Vec3::ZERO)?;
            Ok((
                (plus.force - minus.force) / (2.0 * DELTA_SPEED),
                (plus.moment - minus.moment) / (2.0 * DELTA_SPEED),
            ))
        };
        let rotate = |s: &Self, axis: Vec3| -> Result<(Vec3, Vec3), AnalysisError> {
            let plus = s.combined_forces(v0, axis * DELTA_RATE)?;
            let minus = s.combined_forces(v0, axis * -DELTA_RATE)?;
            Ok((
                (plus.force - minus.force) / (2.0 * DELTA_RATE),
                (plus.moment - minus.moment) / (2.0 * DELTA_RATE),
            ))
        };

        let (fu, mu) = translate(self, is)?;
        let (fv, mv) = translate(self, js)?;
        let (fw, mw) = translate(self, ks)?;
        let (fp, mp) = rotate(self, is)?;
        let (fq, mq) = rotate(self, js)?;
        let (fr, mr) = rotate(self, ks)?;

        let d = StabilityDerivatives {
            alpha,
            u0,
            x_u: fu.dot(&is),
            x_w: fw.dot(&is),
            z_u: fu.dot(&ks),
            z_w: fw.dot(&ks),
            m_u: mu.dot(&js),
            m_w: mw.dot(&js),
            y_v: fv.dot(&js),
            l_v: mv.dot(&is),
            n_v: mv.dot(&ks),
            y_p: fp.dot(&js),
            l_p: mp.dot(&is),
            n_p: mp.dot(&ks),
            x_q: fq.dot(&is),
            z_q: fq.dot(&ks),
            m_q: mq.dot(&js),
            y_r: fr.dot(&js),
            l_r: mr.dot(&is),
            n_r: mr.dot(&ks),
        };
        debug!(?d, "stability derivatives");
        Ok(d)
    }
}
