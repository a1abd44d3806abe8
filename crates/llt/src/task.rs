//! Nonlinear lifting-line analysis over a range of angles of attack.
//!
//! The span is sampled at `y_k = b/2 cos(kπ/n)`. A linear solution with a
//! 2π-like slope seeds the induced angles, then a relaxed fixed-point
//! iteration couples the induced angles to the viscous section polars.

use std::f64::consts::PI;
use std::sync::Arc;
use std::time::Duration;

use aero_kernel::{Point3d, Vec3};
use aero_panel::{AnalysisStatus, StatusCell};
use aero_solver::solve_linear_system;
use nalgebra::{DMatrix, DVector};
use tracing::{debug, info, instrument, warn};

use crate::config::{LltConfig, SpeedMode};
use crate::error::LltError;
use crate::polar::ViscousPolars;
use crate::results::{LltOpPoint, LltOppReport, ReportQueue, SpanResults};
use crate::wing::LltWing;

const GRAVITY: f64 = 9.81;

/// Wing totals of the last `compute_wing`.
#[derive(Debug, Clone, Copy, Default)]
struct WingTotals {
    cl: f64,
    cdi: f64,
    cdv: f64,
    yaw_viscous: f64,
    yaw_induced: f64,
    cm_viscous: f64,
    cm_induced: f64,
    roll: f64,
    cp: Point3d,
}

pub struct LltTask<P> {
    config: LltConfig,
    wing: LltWing,
    polars: P,
    status: StatusCell,
    reports: Arc<ReportQueue>,
    alphas: Vec<f64>,
    /// Station arrays of length n + 1; entries 0 and n are the tips.
    st: SpanResults,
    q_inf0: f64,
    q_inf: f64,
    converged: bool,
    wing_out: bool,
    has_error: bool,
    has_warning: bool,
    max_a: Vec<f64>,
    totals: WingTotals,
    op_points: Vec<LltOpPoint>,
}

impl<P: ViscousPolars> LltTask<P> {
    pub fn new(wing: LltWing, polars: P, config: LltConfig) -> Result<Self, LltError> {
        config.validate()?;
        let n = config.n_stations;
        Ok(Self {
            config,
            wing,
            polars,
            status: StatusCell::new(),
            reports: Arc::new(ReportQueue::new()),
            alphas: Vec::new(),
            st: SpanResults::zeroed(n + 1),
            q_inf0: 0.0,
            q_inf: 0.0,
            converged: false,
            wing_out: false,
            has_error: false,
            has_warning: false,
            max_a: Vec::new(),
            totals: WingTotals::default(),
            op_points: Vec::new(),
        })
    }

    pub fn set_alpha_range(&mut self, alphas: &[f64]) {
        self.alphas = alphas.to_vec();
    }

    pub fn config(&self) -> &LltConfig {
        &self.config
    }

    pub fn wing(&self) -> &LltWing {
        &self.wing
    }

    pub fn status(&self) -> AnalysisStatus {
        self.status.get()
    }

    pub fn cancel_handle(&self) -> StatusCell {
        self.status.clone()
    }

    pub fn cancel(&self) {
        self.status.cancel();
    }

    /// Shared handle for observers on other threads.
    pub fn reports(&self) -> Arc<ReportQueue> {
        Arc::clone(&self.reports)
    }

    pub fn next_report(&self, timeout: Duration) -> Option<LltOppReport> {
        self.reports.next_report(timeout)
    }

    pub fn drain_reports(&self) -> Vec<LltOppReport> {
        self.reports.drain()
    }

    pub fn op_points(&self) -> &[LltOpPoint] {
        &self.op_points
    }

    pub fn has_errors(&self) -> bool {
        self.has_error || self.has_warning
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn wing_out(&self) -> bool {
        self.wing_out
    }

    pub fn speed(&self) -> f64 {
        self.q_inf
    }

    /// Raw station arrays, tips included.
    pub fn stations(&self) -> &SpanResults {
        &self.st
    }

    /// Largest induced-angle change per iteration of the last angle.
    pub fn max_a(&self) -> &[f64] {
        &self.max_a
    }

    fn n(&self) -> usize {
        self.config.n_stations
    }

    fn yob(&self, k: usize) -> f64 {
        (k as f64 * PI / self.n() as f64).cos()
    }

    fn trace(&self, message: impl Into<String>) {
        self.reports.push(LltOppReport::log(message));
    }

    fn trace_opp(&self, alpha: f64, message: impl Into<String>) {
        self.reports.push(LltOppReport {
            alpha: Some(alpha),
            max_a: self.max_a.clone(),
            message: message.into(),
        });
    }

    /// Span integration weight of station m.
    fn eta(&self, m: usize) -> f64 {
        let n = self.n() as f64;
        PI / 2.0 / n * (m as f64 * PI / n).sin()
    }

    /// Weight of the antisymmetric moments.
    fn sigma(&self, m: usize) -> f64 {
        let n = self.n() as f64;
        PI / 8.0 / n * (2.0 * m as f64 * PI / n).sin()
    }

    /// Induced-angle influence of station m on station k, degrees.
    fn beta(&self, m: usize, k: usize) -> f64 {
        let (fm, fk, fr) = (m as f64, k as f64, self.n() as f64);
        if m == k {
            180.0 * fr / 8.0 / PI / (fk * PI / fr).sin()
        } else if (m + k) % 2 == 0 {
            0.0
        } else {
            let c1 = 180.0 / 4.0 / PI / fr / (fk * PI / fr).sin();
            let c2 = 1.0 / (1.0 - ((fk + fm) * PI / fr).cos()) - 1.0 / (1.0 - ((fk - fm) * PI / fr).cos());
            c1 * c2
        }
    }

    /// Station positions, chords, offsets, twists and strip areas.
    pub fn initialize_geom(&mut self) {
        self.wing_out = false;
        self.converged = false;
        self.q_inf0 = match self.config.speed_mode {
            SpeedMode::FixedLift { mass } => {
                (2.0 * mass * GRAVITY / self.config.density / self.wing.planform_area()).sqrt()
            }
            SpeedMode::FixedSpeed { .. } => 0.0,
        };

        let n = self.n();
        let half_span = self.wing.planform_span() / 2.0;
        self.st = SpanResults::zeroed(n + 1);
        for k in 0..=n {
            let yob = self.yob(k);
            let s = self.wing.section_at(yob);
            self.st.chord[k] = s.chord;
            self.st.offset[k] = s.offset;
            self.st.twist[k] = s.twist;
            self.st.position[k] = half_span * yob;
        }
        for j in 1..n {
            let dy = (self.st.position[j - 1] - self.st.position[j + 1]) / 2.0;
            self.st.strip_area[j] = self.st.chord[j] * dy;
        }
        debug!(n_stations = n, q_inf0 = self.q_inf0, "lifting line geometry");
    }

    /// Freestream speed for `alpha` and the station Reynolds numbers. Under
    /// fixed lift the speed comes from a thin-airfoil lift estimate.
    pub fn initialize_velocity(&mut self, alpha: f64) -> Result<f64, LltError> {
        let n = self.n();
        let q_inf = match self.config.speed_mode {
            SpeedMode::FixedSpeed { speed } => speed,
            SpeedMode::FixedLift { .. } => {
                let mut lift = 0.0;
                for k in 1..n {
                    let a0 = self.polars.zero_lift_angle(self.yob(k), f64::MAX);
                    let cl = 2.0 * PI * (alpha - a0 + self.st.twist[k]).to_radians();
                    lift += self.eta(k) * cl * self.st.chord[k];
                }
                lift *= self.wing.aspect_ratio() / self.wing.planform_span();
                if lift <= 0.0 {
                    return Err(LltError::NegativeLift { alpha });
                }
                self.q_inf0 / lift.sqrt()
            }
        };
        for k in 1..n {
            self.st.re[k] = self.st.chord[k] * q_inf / self.config.viscosity;
        }
        self.q_inf = q_inf;
        Ok(q_inf)
    }

    /// Linear lifting-line solution used as the starting point of the
    /// iterations, assuming a lift slope of 2π everywhere.
    pub fn set_linear_solution(&mut self, alpha: f64) -> Result<(), LltError> {
        let n = self.n();
        let size = n - 1;
        let cs = self.wing.root_chord();
        let b = self.wing.planform_span();
        let mut a = DMatrix::zeros(size, size);
        let mut rhs = DVector::zeros(size);

        for i in 1..n {
            let t0 = i as f64 * PI / n as f64;
            let yob = t0.cos();
            let s = self.wing.section_at(yob);
            let st0 = t0.sin();
            for j in 1..n {
                let snt0 = (j as f64 * t0).sin();
                a[(i - 1, j - 1)] = snt0 + s.chord * PI / b / 2.0 * j as f64 * snt0 / st0;
            }
            let a0 = self.polars.zero_lift_angle(yob, self.st.re[i]);
            rhs[i - 1] = s.chord / cs * (alpha - a0 + s.twist).to_radians();
        }

        let x = solve_linear_system(&a, &rhs)?;

        for i in 1..n {
            let t0 = i as f64 * PI / n as f64;
            let yob = t0.cos();
            let s = self.wing.section_at(yob);
            let sum: f64 = (1..n).map(|j| x[j - 1] * (j as f64 * t0).sin()).sum();
            let (_, slope) = self.polars.linearized(yob, self.st.re[i]);
            let a0 = self.polars.zero_lift_angle(yob, self.st.re[i]);
            self.st.cl[i] = sum * slope * cs / s.chord;
            self.st.ai[i] = -(alpha - a0 + s.twist) + (self.st.cl[i] / slope).to_degrees();
        }
        Ok(())
    }

    /// Induced angle at station k from the current lift distribution, degrees.
    pub fn alpha_induced(&self, k: usize) -> f64 {
        let b = self.wing.planform_span();
        (1..self.n())
            .map(|m| self.beta(m, k) * self.st.cl[m] * self.st.chord[m] / b)
            .sum()
    }

    fn station_cl(&self, k: usize, alpha: f64) -> f64 {
        let a = alpha + self.st.ai[k] + self.st.twist[k];
        self.polars.lookup(self.yob(k), self.st.re[k], a).point.cl
    }

    /// Relaxed fixed-point iteration. Returns the number of iterations; the
    /// `converged` flag tells whether the precision was reached.
    pub fn iterate(&mut self, alpha: f64) -> Result<usize, LltError> {
        let n = self.n();
        let mut iter = 0;
        while iter < self.config.max_iter {
            let mut maxa: f64 = 0.0;
            for k in 1..n {
                let a = self.st.ai[k];
                let anext = -self.alpha_induced(k);
                self.st.ai[k] = a + (anext - a) / self.config.relaxation;
                maxa = maxa.max((a - anext).abs());
            }

            let mut lift = 0.0;
            for k in 1..n {
                self.st.cl[k] = self.station_cl(k, alpha);
                lift += self.eta(k) * self.st.cl[k] * self.st.chord[k];
            }

            if self.config.is_fixed_lift() {
                lift *= self.wing.aspect_ratio() / self.wing.planform_span();
                if lift <= 0.0 {
                    return Err(LltError::NegativeLift { alpha });
                }
                self.q_inf = self.q_inf0 / lift.sqrt();
                for k in 1..n {
                    self.st.re[k] = self.st.chord[k] * self.q_inf / self.config.viscosity;
                    self.st.cl[k] = self.station_cl(k, alpha);
                }
            }

            if maxa < self.config.precision {
                self.converged = true;
                break;
            }
            self.max_a.push(maxa);
            iter += 1;
            if self.status.is_cancelled() {
                return Err(LltError::Cancelled);
            }
        }
        Ok(iter)
    }

    /// Viscous station data and integrated wing coefficients. Returns the
    /// out-of-range diagnostics, empty when every lookup was in range.
    pub fn compute_wing(&mut self, alpha: f64) -> String {
        let n = self.n();
        let b = self.wing.planform_span();
        let ar = self.wing.aspect_ratio();
        let mac = self.wing.mac();
        let g_chord = self.wing.geometric_chord();
        let cog = self.config.cog;

        let (mut i0, mut i1, mut i2) = (0.0, 0.0, 0.0);
        let (mut induced_drag, mut viscous_drag) = (0.0, 0.0);
        let (mut induced_yaw, mut viscous_yaw) = (0.0, 0.0);
        let (mut vcm, mut icm) = (0.0, 0.0);
        let mut message = String::new();
        self.wing_out = false;

        for m in 1..n {
            let yob = self.yob(m);
            let a = alpha + self.st.ai[m] + self.st.twist[m];
            let lookup = self.polars.lookup(yob, self.st.re[m], a);
            let p = lookup.point;
            let chord = self.st.chord[m];

            self.st.cl[m] = p.cl;
            self.st.pcd[m] = p.cd;
            self.st.icd[m] = -p.cl * self.st.ai[m].to_radians();
            self.st.xtr_top[m] = p.xtr_top;
            self.st.xtr_bot[m] = p.xtr_bot;
            self.st.cm_airfoil[m] = p.cm;
            self.st.xcp_rel[m] = if p.xcp.abs() > 1e-6 {
                p.xcp
            } else if p.cl != 0.0 {
                0.25 - p.cm / p.cl
            } else {
                0.25
            };
            self.st.xcp_abs[m] = self.st.offset[m] + self.st.xcp_rel[m] * chord;

            // moments about the CoG, per unit dynamic pressure and strip area
            let c4 = self.wing.c4(yob) - cog.x;
            let zpos = -cog.z;
            let lever = Vec3::new(c4, 0.0, zpos);
            let m_inv = lever.cross(&Vec3::new(self.st.icd[m], 0.0, p.cl));
            let m_visc = lever.cross(&Vec3::new(p.cd, 0.0, 0.0));
            let cm_i = p.cm + m_inv.y / mac;
            let cm_v = m_visc.y / mac;
            self.st.cm[m] = cm_i + cm_v;

            let (eta, sigma) = (self.eta(m), self.sigma(m));
            i0 += eta * p.cl * chord;
            i1 += sigma * p.cl * chord;
            i2 += eta * p.cl * chord * (self.st.offset[m] + self.st.xcp_rel[m] * chord);
            induced_drag += eta * p.cl * chord * (-self.st.ai[m]);
            viscous_drag += eta * p.cd * chord;
            induced_yaw += sigma * p.cl * chord * (-self.st.ai[m]);
            viscous_yaw += sigma * p.cd * chord;
            vcm += eta * cm_v * chord * chord;
            icm += eta * cm_i * chord * chord;

            if lookup.out_of_alpha || lookup.out_of_re {
                let what = if lookup.out_of_alpha {
                    "could not be interpolated"
                } else {
                    "is outside the flight envelope"
                };
                message.push_str(&format!(
                    "       Span pos = {:9.2} m,  Re = {:.0},  A+Ai+Twist = {:.2} {what}\n",
                    self.st.position[m], self.st.re[m], a
                ));
                self.wing_out = true;
                if lookup.out_of_alpha {
                    self.converged = false;
                }
            }
        }

        let cl = i0 * ar / b;
        let cp_x = if cl != 0.0 { i2 * ar / b / cl } else { 0.0 };
        let yaw_viscous = viscous_yaw / g_chord;
        let yaw_induced = induced_yaw / b * PI * ar / 180.0;
        self.totals = WingTotals {
            cl,
            cdi: induced_drag * ar / b * PI / 180.0,
            cdv: viscous_drag / g_chord,
            yaw_viscous,
            yaw_induced,
            cm_viscous: vcm / g_chord / mac,
            cm_induced: icm / g_chord / mac,
            roll: -i1 * ar / b,
            cp: Point3d::new(cp_x, 0.0, 0.0),
        };
        self.set_bending(self.q_inf);
        message
    }

    /// Bending moment at each station from the lift outboard of it, N·m.
    pub fn set_bending(&mut self, q_inf: f64) {
        let n = self.n();
        let q = 0.5 * self.config.density * q_inf * q_inf;
        for j in 1..n {
            let y = self.st.position[j];
            let outboard: Vec<usize> = if y >= 0.0 { (0..j).collect() } else { (j + 1..n).collect() };
            let bm: f64 = outboard
                .into_iter()
                .map(|jj| (self.st.position[jj] - y).abs() * self.st.cl[jj] * self.st.strip_area[jj])
                .sum();
            self.st.bending_moment[j] = bm * q;
        }
    }

    fn make_op_point(&self, alpha: f64, iterations: usize) -> LltOpPoint {
        let n = self.n();
        let indices: Vec<usize> = (1..n).rev().collect();
        let span = self.st.select(&indices);
        let t = &self.totals;
        let area = self.wing.planform_area();
        let (fx, fz) = (t.cdi * area, t.cl * area);
        let (sa, ca) = alpha.to_radians().sin_cos();
        let max_bending = span
            .bending_moment
            .iter()
            .copied()
            .fold(0.0, |m: f64, v| if v.abs() > m.abs() { v } else { m });
        LltOpPoint {
            alpha,
            speed: self.q_inf,
            cl: t.cl,
            cdi: t.cdi,
            cdv: t.cdv,
            cm: t.cm_viscous + t.cm_induced,
            cm_induced: t.cm_induced,
            cm_viscous: t.cm_viscous,
            rolling_moment: t.roll,
            yawing_moment: t.yaw_viscous + t.yaw_induced,
            yawing_induced: t.yaw_induced,
            yawing_viscous: t.yaw_viscous,
            center_of_pressure: t.cp,
            force_per_q: Vec3::new(fx * ca - fz * sa, 0.0, fx * sa + fz * ca),
            max_bending,
            iterations,
            converged: self.converged,
            wing_out: self.wing_out,
            span,
        }
    }

    /// Solve every angle of the range. Per-angle failures are reported and
    /// the loop goes on; only cancellation stops it early.
    #[instrument(skip(self), fields(n_alphas = self.alphas.len()))]
    pub fn alpha_loop(&mut self) -> Result<(), LltError> {
        let n = self.n();
        let mut init_calc = true;
        let alphas = self.alphas.clone();

        for alpha in alphas {
            self.max_a.clear();
            self.converged = false;
            if self.status.is_cancelled() {
                self.trace("Analysis cancelled on user request....\n");
                break;
            }

            if init_calc {
                let seeded = self
                    .initialize_velocity(alpha)
                    .and_then(|_| self.set_linear_solution(alpha));
                match seeded {
                    Ok(()) => {}
                    Err(e @ LltError::NegativeLift { .. }) => {
                        warn!(alpha, "negative lift in the initial solution");
                        self.trace_opp(alpha, format!("    ...{e}... Aborting\n"));
                        self.has_error = true;
                        continue;
                    }
                    Err(e) => {
                        warn!(alpha, %e, "linear solution failed");
                        self.trace_opp(alpha, format!("    ...linear solution failed: {e}\n"));
                        self.has_error = true;
                        continue;
                    }
                }
            }
            for k in 1..n {
                self.st.cl[k] = self.station_cl(k, alpha);
            }
            self.trace(format!("Calculating alpha = {alpha:5.2}°..."));

            match self.iterate(alpha) {
                Err(LltError::Cancelled) => {
                    self.trace("Analysis cancelled on user request....\n");
                    break;
                }
                Err(LltError::NegativeLift { .. }) => {
                    warn!(alpha, "negative lift, angle skipped");
                    self.trace("    ...negative Lift... Aborting\n");
                    self.has_error = true;
                    init_calc = true;
                }
                Err(e) => return Err(e),
                Ok(iter) if self.converged => {
                    self.trace_opp(alpha, format!("    ...converged after {iter} iterations\n"));
                    let diagnostics = self.compute_wing(alpha);
                    if !diagnostics.is_empty() {
                        self.trace(diagnostics);
                    }
                    if self.wing_out {
                        self.has_warning = true;
                    }
                    let point = self.make_op_point(alpha, iter);
                    info!(alpha, cl = point.cl, cdi = point.cdi, iter, "lifting line converged");
                    self.op_points.push(point);
                    init_calc = false;
                }
                Ok(iter) => {
                    let diagnostics = self.compute_wing(alpha);
                    if self.wing_out {
                        self.has_warning = true;
                        self.trace(diagnostics);
                    }
                    self.converged = false;
                    self.has_error = true;
                    warn!(alpha, iter, "lifting line did not converge");
                    self.trace_opp(
                        alpha,
                        format!(
                            "    ...unconverged after {iter} iterations out of {}\n",
                            self.config.max_iter
                        ),
                    );
                    let point = self.make_op_point(alpha, iter);
                    self.op_points.push(point);
                    init_calc = true;
                }
            }
        }
        Ok(())
    }

    /// Pending -> Running, geometry, every angle, then Finished unless the
    /// run was cancelled, in which case the results are dropped.
    pub fn run(&mut self) -> Result<AnalysisStatus, LltError> {
        if !self.status.start() {
            return Err(LltError::Cancelled);
        }
        self.has_error = false;
        self.has_warning = false;
        self.op_points.clear();
        self.trace("\nLaunching the LLT Analysis....\n");
        self.initialize_geom();

        self.alpha_loop()?;

        let status = self.status.finish();
        if status == AnalysisStatus::Cancelled {
            self.op_points.clear();
        }
        self.trace("\nDone processing ranges.\n");
        Ok(status)
    }
}
