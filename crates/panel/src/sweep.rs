//! Angle-of-attack sweeps over one factorized system.

use aero_kernel::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::axes::wind_direction;
use crate::engine::{BUFFER_WAKE_PANELS, PanelAnalysis};
use crate::error::AnalysisError;
use crate::forces::{AeroCoefficients, AeroForces, SpanDistribution};
use crate::status::AnalysisStatus;

/// Results of one converged flow condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatingPoint {
    pub alpha: f64,
    pub beta: f64,
    pub speed: f64,
    pub forces: AeroForces,
    pub coefficients: AeroCoefficients,
    /// Coefficients from surface pressure integration.
    pub near_field: AeroCoefficients,
    pub span: SpanDistribution,
    pub cp: Vec<f64>,
    pub mu: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointOutcome {
    pub alpha: f64,
    pub result: Result<OperatingPoint, AnalysisError>,
}

impl PanelAnalysis {
    /// Solve every angle in `alphas`. A failure at one point is recorded and
    /// the sweep goes on; cancellation and configuration errors end it.
    #[instrument(skip(self, alphas), fields(n_points = alphas.len()))]
    pub fn run_alpha_sweep(
        &mut self,
        alphas: &[f64],
        beta: f64,
        speed: f64,
    ) -> Result<Vec<PointOutcome>, AnalysisError> {
        if !(speed > 0.0) {
            return Err(AnalysisError::InvalidConfig(format!(
                "freestream speed must be positive, got {speed}"
            )));
        }
        self.begin()?;
        if let Err(e) = self.prepare() {
            if !e.is_recoverable() {
                return Err(e);
            }
            warn!(%e, "system setup failed, every point fails");
            self.finish();
            return Ok(alphas
                .iter()
                .map(|&alpha| PointOutcome {
                    alpha,
                    result: Err(e.clone()),
                })
                .collect());
        }

        let mut outcomes = Vec::with_capacity(alphas.len());
        for &alpha in alphas {
            if self.status() == AnalysisStatus::Cancelled {
                return Err(self.fail(AnalysisError::Cancelled));
            }
            match self.operating_point(alpha, beta, speed) {
                Ok(point) => outcomes.push(PointOutcome {
                    alpha,
                    result: Ok(point),
                }),
                Err(e) if e.is_recoverable() => {
                    warn!(alpha, %e, "operating point failed");
                    outcomes.push(PointOutcome {
                        alpha,
                        result: Err(e),
                    });
                }
                Err(e) => return Err(self.fail(e)),
            }
        }
        if self.finish() == AnalysisStatus::Cancelled {
            return Err(AnalysisError::Cancelled);
        }
        info!(
            n_converged = outcomes.iter().filter(|o| o.result.is_ok()).count(),
            "alpha sweep done"
        );
        Ok(outcomes)
    }

    /// Solve one condition and post-process it.
    pub fn operating_point(
        &mut self,
        alpha: f64,
        beta: f64,
        speed: f64,
    ) -> Result<OperatingPoint, AnalysisError> {
        let v_inf = wind_direction(alpha, beta) * speed;
        let vorton_rows = self.vorton_rows();
        let solution = match vorton_rows {
            Some((dl, n_rows)) => self.solve_with_vorton_wake(v_inf, Vec3::ZERO, dl, n_rows)?,
            None => self.solve(v_inf, Vec3::ZERO)?,
        };
        let mu = solution.mu.clone();
        let cp = solution.cp.clone();
        let v_field = solution.v_field.clone();

        let forces = self.forces(&mu, &cp, &v_field);
        let near = self.near_field_forces(&cp, &v_field);
        let span = match vorton_rows {
            Some(_) => self.vorton_drag(&mu, alpha, beta, speed)?,
            None => self.trefftz_drag(&mu, alpha, beta, speed),
        };
        let q_dyn = 0.5 * self.config().density * speed * speed;
        let reference = self.config().reference;
        let coefficients = forces.coefficients(alpha, beta, q_dyn, &reference);
        let near_field = near.coefficients(alpha, beta, q_dyn, &reference);
        if !coefficients.cl.is_finite() {
            return Err(AnalysisError::NumericalDegeneracy(format!(
                "non-finite lift at alpha = {alpha}"
            )));
        }
        Ok(OperatingPoint {
            alpha,
            beta,
            speed,
            forces,
            coefficients,
            near_field,
            span,
            cp,
            mu,
        })
    }

    /// Vorton step and row count continuing the buffer wake to `wake_length`.
    fn vorton_rows(&self) -> Option<(f64, usize)> {
        let config = self.config();
        if !config.vorton_wake {
            return None;
        }
        let dl = config.buffer_wake_length / BUFFER_WAKE_PANELS as f64;
        let remaining = (config.wake_length - config.buffer_wake_length).max(dl);
        Some((dl, (remaining / dl).ceil() as usize))
    }
}
