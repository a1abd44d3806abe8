//! Panel-method analysis: influence matrix, factorization, unit right-hand
//! sides and their combination into operating-point solutions.
//!
//! Strengths follow the 1/4π convention of [`crate::kernels`]. Thick panels
//! carry a source density fixed by the onset flow, `σ = -V·n / 4π`, and an
//! unknown doublet density; thin (mid) panels carry a doublet density only.

use std::f64::consts::PI;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use aero_kernel::{Point3d, Vec3};
use aero_solver::DenseLu;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::{AnalysisConfig, BoundaryCondition};
use crate::error::AnalysisError;
use crate::mesh::PanelMesh;
use crate::panel::{Panel, PanelKernel};
use crate::status::{AnalysisStatus, StatusCell};
use crate::vorton::{MERGE_DISTANCE, NegatingVortex, Vorton, VortonWake, merge_coincident};
use crate::wake::{WakeColumn, make_wake_columns};

pub(crate) const FOUR_PI: f64 = 4.0 * PI;

/// Wake panels per column ahead of a vorton wake.
pub(crate) const BUFFER_WAKE_PANELS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    InfluenceMatrix,
    UnitRhs,
    Rhs,
    VortonVelocities,
}

/// Reported after each completed row block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub stage: Stage,
    pub blocks_done: usize,
    pub n_blocks: usize,
}

pub type ProgressFn = Arc<dyn Fn(&Progress) + Send + Sync>;

/// Doublet and source strengths of the six unit motions u, v, w, p, q, r.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSolutions {
    pub mu: [Vec<f64>; 6],
    pub sigma: [Vec<f64>; 6],
}

impl UnitSolutions {
    fn combine(vectors: &[Vec<f64>; 6], v_inf: &Vec3, omega: &Vec3) -> Vec<f64> {
        let coefs = [v_inf.x, v_inf.y, v_inf.z, omega.x, omega.y, omega.z];
        (0..vectors[0].len())
            .map(|i| coefs.iter().zip(vectors).map(|(c, v)| c * v[i]).sum())
            .collect()
    }
}

/// Strengths and surface pressures of one flow condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelSolution {
    pub v_inf: Vec3,
    pub omega: Vec3,
    pub mu: Vec<f64>,
    pub sigma: Vec<f64>,
    pub cp: Vec<f64>,
    /// Onset velocity at each collocation point.
    pub v_field: Vec<Vec3>,
}

/// A panel analysis owns its mesh, wake, matrix and results. Nothing is
/// shared with other instances; worker threads only write disjoint rows.
pub struct PanelAnalysis {
    config: AnalysisConfig,
    mesh: PanelMesh,
    wake: Vec<WakeColumn>,
    wake_direction: Vec3,
    status: StatusCell,
    progress: Option<ProgressFn>,
    pool: Option<rayon::ThreadPool>,
    /// Row-major influence matrix, dropped once factorized.
    matrix: Option<Vec<f64>>,
    matrix_error: bool,
    lu: Option<DenseLu>,
    unit: Option<UnitSolutions>,
    vortons: VortonWake,
    solution: Option<PanelSolution>,
}

impl std::fmt::Debug for PanelAnalysis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanelAnalysis")
            .field("n_panels", &self.mesh.len())
            .field("n_wake_columns", &self.wake.len())
            .field("status", &self.status.get())
            .field("factorized", &self.lu.is_some())
            .field("matrix_error", &self.matrix_error)
            .finish_non_exhaustive()
    }
}

impl PanelAnalysis {
    /// Validate inputs, spin up the worker pool and shed the wake along +x
    /// so that one factorization serves every angle of attack.
    pub fn new(mesh: PanelMesh, config: AnalysisConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        mesh.validate()?;
        let pool = if config.multithread {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.max_threads)
                .build()
                .map_err(|e| AnalysisError::ThreadPool(e.to_string()))?;
            Some(pool)
        } else {
            None
        };
        let mut analysis = Self {
            config,
            mesh,
            wake: Vec::new(),
            wake_direction: Vec3::X,
            status: StatusCell::new(),
            progress: None,
            pool,
            matrix: None,
            matrix_error: false,
            lu: None,
            unit: None,
            vortons: VortonWake::default(),
            solution: None,
        };
        analysis.make_wake_panels(Vec3::X)?;
        info!(
            n_panels = analysis.mesh.len(),
            n_wake_columns = analysis.wake.len(),
            multithread = analysis.config.multithread,
            "panel analysis created"
        );
        Ok(analysis)
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn mesh(&self) -> &PanelMesh {
        &self.mesh
    }

    pub fn wake_columns(&self) -> &[WakeColumn] {
        &self.wake
    }

    pub fn status(&self) -> AnalysisStatus {
        self.status.get()
    }

    /// A handle other threads can use to cancel the run.
    pub fn cancel_handle(&self) -> StatusCell {
        self.status.clone()
    }

    pub fn cancel(&self) {
        self.status.cancel();
    }

    /// Clear a cancellation so the analysis can run again from scratch.
    pub fn reset(&mut self) {
        self.invalidate();
        self.status.reset();
    }

    pub fn set_progress_observer(&mut self, observer: ProgressFn) {
        self.progress = Some(observer);
    }

    pub fn matrix_error(&self) -> bool {
        self.matrix_error
    }

    /// The assembled matrix, row major, until it is factorized.
    pub fn influence_matrix(&self) -> Option<&[f64]> {
        self.matrix.as_deref()
    }

    pub fn unit_solutions(&self) -> Option<&UnitSolutions> {
        self.unit.as_ref()
    }

    pub fn vortons(&self) -> &VortonWake {
        &self.vortons
    }

    pub fn solution(&self) -> Option<&PanelSolution> {
        if self.results_valid() {
            self.solution.as_ref()
        } else {
            None
        }
    }

    pub fn results_valid(&self) -> bool {
        self.solution.is_some() && !self.status.is_cancelled()
    }

    /// Running -> Finished, unless a cancel got there first.
    pub fn finish(&mut self) -> AnalysisStatus {
        let status = self.status.finish();
        if status == AnalysisStatus::Cancelled {
            self.invalidate();
        }
        status
    }

    pub(crate) fn begin(&mut self) -> Result<(), AnalysisError> {
        if self.status.start() {
            Ok(())
        } else {
            self.invalidate();
            Err(AnalysisError::Cancelled)
        }
    }

    /// Drop everything derived from the matrix.
    fn invalidate(&mut self) {
        self.matrix = None;
        self.lu = None;
        self.unit = None;
        self.solution = None;
        self.vortons.clear();
    }

    /// Record a failure; cancellation rolls back every result.
    pub(crate) fn fail(&mut self, e: AnalysisError) -> AnalysisError {
        if e == AnalysisError::Cancelled {
            debug!("analysis cancelled, results invalidated");
            self.invalidate();
        }
        e
    }

    /// Rebuild the wake columns along `direction`. Invalidates the system.
    pub fn make_wake_panels(&mut self, direction: Vec3) -> Result<usize, AnalysisError> {
        let (length, n_panels, factor) = if self.config.vorton_wake {
            (self.config.buffer_wake_length, BUFFER_WAKE_PANELS, 1.0)
        } else {
            (
                self.config.wake_length,
                self.config.wake_panels,
                self.config.wake_panel_factor,
            )
        };
        self.wake = make_wake_columns(&self.mesh, direction, length, n_panels, factor)?;
        self.wake_direction = direction.normalized_or_zero();
        self.invalidate();
        Ok(self.wake.len())
    }

    fn is_neumann(&self, p: &Panel) -> bool {
        p.is_mid() || self.config.boundary_condition == BoundaryCondition::Neumann
    }

    fn image(&self, c: &Point3d) -> Option<(Point3d, f64)> {
        self.config
            .ground
            .as_ref()
            .map(|g| (c.ground_image(g.height), g.coef()))
    }

    pub(crate) fn doublet_potential_at(
        &self,
        p: &impl PanelKernel,
        c: &Point3d,
        self_influence: bool,
        rff: Option<f64>,
    ) -> f64 {
        let core = self.config.core_radius;
        let mut phi = p.doublet_potential(c, self_influence, core, rff);
        if let Some((cg, coef)) = self.image(c) {
            phi += coef * p.doublet_potential(&cg, false, core, rff);
        }
        phi
    }

    pub(crate) fn doublet_velocity_at(&self, p: &impl PanelKernel, c: &Point3d, rff: Option<f64>) -> Vec3 {
        let core = self.config.core_radius;
        let mut v = p.doublet_velocity(c, core, rff);
        if let Some((cg, coef)) = self.image(c) {
            v += mirrored(p.doublet_velocity(&cg, core, rff)) * coef;
        }
        v
    }

    pub(crate) fn source_potential_at(&self, p: &impl PanelKernel, c: &Point3d, rff: Option<f64>) -> f64 {
        let mut phi = p.source_potential(c, rff);
        if let Some((cg, coef)) = self.image(c) {
            phi += coef * p.source_potential(&cg, rff);
        }
        phi
    }

    pub(crate) fn source_velocity_at(
        &self,
        p: &impl PanelKernel,
        c: &Point3d,
        self_influence: bool,
        rff: Option<f64>,
    ) -> Vec3 {
        let mut v = p.source_velocity(c, self_influence, rff);
        if let Some((cg, coef)) = self.image(c) {
            v += mirrored(p.source_velocity(&cg, false, rff)) * coef;
        }
        v
    }

    /// Split `data` into row blocks of `n_cols` values and fill each row with
    /// `row`. Cancellation is polled before every block.
    fn run_blocks<F>(
        &self,
        stage: Stage,
        n_cols: usize,
        data: &mut [f64],
        row: F,
    ) -> Result<(), AnalysisError>
    where
        F: Fn(usize, &mut [f64]) + Sync,
    {
        let n_rows = data.len() / n_cols.max(1);
        if n_rows == 0 {
            return Ok(());
        }
        let block_rows = n_rows.div_ceil(self.config.n_blocks().clamp(1, n_rows));
        let n_blocks = n_rows.div_ceil(block_rows);
        let done = AtomicUsize::new(0);
        let status = &self.status;
        let progress = self.progress.as_deref();
        let row = &row;

        let work = |(ib, chunk): (usize, &mut [f64])| -> Result<(), AnalysisError> {
            if status.is_cancelled() {
                return Err(AnalysisError::Cancelled);
            }
            for (k, values) in chunk.chunks_mut(n_cols).enumerate() {
                row(ib * block_rows + k, values);
            }
            let blocks_done = done.fetch_add(1, Ordering::AcqRel) + 1;
            if let Some(observer) = progress {
                observer(&Progress {
                    stage,
                    blocks_done,
                    n_blocks,
                });
            }
            Ok(())
        };

        let chunk_len = block_rows * n_cols;
        match &self.pool {
            Some(pool) => pool.install(|| data.par_chunks_mut(chunk_len).enumerate().try_for_each(work)),
            None => data.chunks_mut(chunk_len).enumerate().try_for_each(work),
        }?;
        if self.status.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        Ok(())
    }

    fn influence_row(&self, i: usize, row: &mut [f64]) {
        let panels = self.mesh.panels();
        let pi = &panels[i];
        let c = pi.collocation_point();
        let n = pi.normal();
        let neumann = self.is_neumann(pi);
        let rff = Some(self.config.rff);

        for (j, pj) in panels.iter().enumerate() {
            row[j] = if neumann {
                self.doublet_velocity_at(pj, &c, rff).dot(&n)
            } else {
                self.doublet_potential_at(pj, &c, i == j, rff)
            };
        }
        // Kutta condition: each wake column carries mu_upper - mu_lower
        for column in &self.wake {
            let w: f64 = column
                .panels
                .iter()
                .map(|wp| {
                    if neumann {
                        self.doublet_velocity_at(wp, &c, None).dot(&n)
                    } else {
                        self.doublet_potential_at(wp, &c, false, None)
                    }
                })
                .sum();
            row[column.upper] += w;
            if let Some(lower) = column.lower {
                row[lower] -= w;
            }
        }
    }

    #[instrument(skip(self), fields(n_panels = self.mesh.len()))]
    pub fn make_influence_matrix(&mut self) -> Result<(), AnalysisError> {
        self.begin()?;
        self.invalidate();
        let n = self.mesh.len();
        let mut data = vec![0.0; n * n];
        info!(n_blocks = self.config.n_blocks(), "assembling influence matrix");
        if let Err(e) = self.run_blocks(Stage::InfluenceMatrix, n, &mut data, |i, row| {
            self.influence_row(i, row)
        }) {
            return Err(self.fail(e));
        }
        if let Some(k) = data.iter().position(|v| !v.is_finite()) {
            self.matrix_error = true;
            warn!(row = k / n, col = k % n, "non-finite influence coefficient");
            return Err(AnalysisError::NumericalDegeneracy(format!(
                "non-finite influence coefficient at ({}, {})",
                k / n,
                k % n
            )));
        }
        self.matrix_error = false;
        self.matrix = Some(data);
        Ok(())
    }

    #[instrument(skip(self), fields(n_panels = self.mesh.len()))]
    pub fn lu_factorize(&mut self) -> Result<(), AnalysisError> {
        let data = self
            .matrix
            .take()
            .ok_or(AnalysisError::NotReady("make_influence_matrix"))?;
        match DenseLu::from_row_major(self.mesh.len(), &data, self.config.precision) {
            Ok(lu) => {
                self.lu = Some(lu);
                Ok(())
            }
            Err(e) => {
                self.matrix_error = true;
                warn!(%e, "influence matrix factorization failed");
                Err(AnalysisError::NumericalDegeneracy(e.to_string()))
            }
        }
    }

    /// Onset velocity at each collocation point for a freestream and a
    /// rotation about the CoG.
    pub fn onset_velocities(&self, v_inf: Vec3, omega: Vec3) -> Vec<Vec3> {
        self.mesh
            .panels()
            .iter()
            .map(|p| v_inf + (p.collocation_point() - self.config.cog).cross(&omega))
            .collect()
    }

    /// Source strengths balancing the normal onset velocity on thick panels.
    pub fn source_strengths(&self, v_field: &[Vec3]) -> Vec<f64> {
        self.mesh
            .panels()
            .iter()
            .zip(v_field)
            .map(|(p, v)| {
                if p.is_mid() {
                    0.0
                } else {
                    -v.dot(&p.normal()) / FOUR_PI
                }
            })
            .collect()
    }

    /// Right-hand side entries of row `i` for several onset fields at once.
    fn rhs_entries(&self, i: usize, fields: &[&[Vec3]], sigmas: &[&[f64]], out: &mut [f64]) {
        let panels = self.mesh.panels();
        let pi = &panels[i];
        let c = pi.collocation_point();
        let n = pi.normal();
        let neumann = self.is_neumann(pi);
        let rff = Some(self.config.rff);

        for (value, field) in out.iter_mut().zip(fields) {
            *value = if neumann { -field[i].dot(&n) } else { 0.0 };
        }
        for (j, pj) in panels.iter().enumerate() {
            if pj.is_mid() {
                continue;
            }
            let influence = if neumann {
                self.source_velocity_at(pj, &c, i == j, rff).dot(&n)
            } else {
                self.source_potential_at(pj, &c, rff)
            };
            for (value, sigma) in out.iter_mut().zip(sigmas) {
                *value -= sigma[j] * influence;
            }
        }
    }

    fn unit_fields(&self) -> [Vec<Vec3>; 6] {
        let axes = [Vec3::X, Vec3::Y, Vec3::Z];
        std::array::from_fn(|k| {
            if k < 3 {
                vec![axes[k]; self.mesh.len()]
            } else {
                self.onset_velocities(Vec3::ZERO, axes[k - 3])
            }
        })
    }

    /// Solve the six unit motions against the factorized matrix.
    #[instrument(skip(self), fields(n_panels = self.mesh.len()))]
    pub fn make_unit_rhs_vectors(&mut self) -> Result<(), AnalysisError> {
        if self.lu.is_none() {
            return Err(AnalysisError::NotReady("lu_factorize"));
        }
        let n = self.mesh.len();
        let fields = self.unit_fields();
        let sigma: [Vec<f64>; 6] = std::array::from_fn(|k| self.source_strengths(&fields[k]));
        let field_refs: Vec<&[Vec3]> = fields.iter().map(Vec::as_slice).collect();
        let sigma_refs: Vec<&[f64]> = sigma.iter().map(Vec::as_slice).collect();

        let mut data = vec![0.0; n * 6];
        if let Err(e) = self.run_blocks(Stage::UnitRhs, 6, &mut data, |i, row| {
            self.rhs_entries(i, &field_refs, &sigma_refs, row)
        }) {
            return Err(self.fail(e));
        }

        let mut mu: [Vec<f64>; 6] = std::array::from_fn(|k| (0..n).map(|i| data[i * 6 + k]).collect());
        let solved = match &self.lu {
            Some(lu) => lu.solve_many(&mut mu),
            None => return Err(AnalysisError::NotReady("lu_factorize")),
        };
        if let Err(e) = solved {
            self.matrix_error = true;
            return Err(AnalysisError::NumericalDegeneracy(e.to_string()));
        }
        debug!("unit right-hand sides solved");
        self.unit = Some(UnitSolutions { mu, sigma });
        Ok(())
    }

    /// Doublet strengths of an arbitrary flow by combination of the unit solutions.
    pub fn combine_unit_rhs(&self, v_inf: Vec3, omega: Vec3) -> Result<Vec<f64>, AnalysisError> {
        let unit = self
            .unit
            .as_ref()
            .ok_or(AnalysisError::NotReady("make_unit_rhs_vectors"))?;
        Ok(UnitSolutions::combine(&unit.mu, &v_inf, &omega))
    }

    pub fn combine_unit_sources(&self, v_inf: Vec3, omega: Vec3) -> Result<Vec<f64>, AnalysisError> {
        let unit = self
            .unit
            .as_ref()
            .ok_or(AnalysisError::NotReady("make_unit_rhs_vectors"))?;
        Ok(UnitSolutions::combine(&unit.sigma, &v_inf, &omega))
    }

    /// Right-hand side for an arbitrary onset field, one value per collocation point.
    pub fn make_rhs(&mut self, v_field: &[Vec3]) -> Result<Vec<f64>, AnalysisError> {
        let n = self.mesh.len();
        if v_field.len() != n {
            return Err(AnalysisError::InvalidConfig(format!(
                "onset field has {} values for {n} panels",
                v_field.len()
            )));
        }
        let sigma = self.source_strengths(v_field);
        let mut rhs = vec![0.0; n];
        if let Err(e) = self.run_blocks(Stage::Rhs, 1, &mut rhs, |i, row| {
            self.rhs_entries(i, &[v_field], &[sigma.as_slice()], row)
        }) {
            return Err(self.fail(e));
        }
        Ok(rhs)
    }

    /// Back-substitute one right-hand side.
    pub fn solve_rhs(&self, rhs: &[f64]) -> Result<Vec<f64>, AnalysisError> {
        let lu = self.lu.as_ref().ok_or(AnalysisError::NotReady("lu_factorize"))?;
        lu.solve(rhs)
            .map_err(|e| AnalysisError::NumericalDegeneracy(e.to_string()))
    }

    /// Matrix, factorization and unit solutions, each built once.
    pub fn prepare(&mut self) -> Result<(), AnalysisError> {
        if self.unit.is_some() {
            return Ok(());
        }
        if self.lu.is_none() {
            if self.matrix.is_none() {
                self.make_influence_matrix()?;
            }
            self.lu_factorize()?;
        }
        self.make_unit_rhs_vectors()
    }

    /// Solve one flow condition. Without vortons the strengths come from the
    /// unit solutions; with vortons their induced velocity joins the onset field.
    #[instrument(skip(self))]
    pub fn solve(&mut self, v_inf: Vec3, omega: Vec3) -> Result<&PanelSolution, AnalysisError> {
        self.begin()?;
        self.prepare()?;
        self.solution = None;
        let mut v_field = self.onset_velocities(v_inf, omega);
        let (mu, sigma) = if self.vortons.is_empty() {
            (
                self.combine_unit_rhs(v_inf, omega)?,
                self.combine_unit_sources(v_inf, omega)?,
            )
        } else {
            let induced = self.make_rhs_vorton_velocities()?;
            for (v, w) in v_field.iter_mut().zip(&induced) {
                *v += *w;
            }
            let rhs = self.make_rhs(&v_field)?;
            (self.solve_rhs(&rhs)?, self.source_strengths(&v_field))
        };
        if mu.iter().chain(&sigma).any(|v| !v.is_finite()) {
            return Err(AnalysisError::NumericalDegeneracy("non-finite panel strengths".into()));
        }
        if self.status.is_cancelled() {
            return Err(self.fail(AnalysisError::Cancelled));
        }
        let cp = self.on_body_cp(&mu, &v_field);
        Ok(&*self.solution.insert(PanelSolution {
            v_inf,
            omega,
            mu,
            sigma,
            cp,
            v_field,
        }))
    }

    /// Solve once with the short panel wake and seed `n_rows` rows of vortons
    /// from that solution. Each wake iteration then solves with the vortons'
    /// induced velocity, advects them and sheds a fresh row; a last solve
    /// matches the strengths to the final wake.
    pub fn solve_with_vorton_wake(
        &mut self,
        v_inf: Vec3,
        omega: Vec3,
        dl: f64,
        n_rows: usize,
    ) -> Result<&PanelSolution, AnalysisError> {
        self.vortons.clear();
        self.solve(v_inf, omega)?;
        self.make_vortons(dl, n_rows)?;
        for iteration in 0..self.config.vorton_iterations {
            self.solve(v_inf, omega)?;
            self.advect_vortons(dl)?;
            let n_rows = self.make_vorton_row(dl)?;
            debug!(iteration, n_rows, n_active = self.vortons.n_active(), "vorton wake iteration");
        }
        self.solve(v_inf, omega)
    }

    /// Perturbation velocity at `c`. `wake_only` skips the body panels.
    pub fn perturbation_velocity(&self, c: &Point3d, mu: &[f64], sigma: &[f64], wake_only: bool) -> Vec3 {
        let rff = Some(self.config.rff);
        let mut v = Vec3::ZERO;
        if !wake_only {
            for (j, p) in self.mesh.panels().iter().enumerate() {
                v += self.doublet_velocity_at(p, c, rff) * mu[j];
                if !p.is_mid() {
                    v += self.source_velocity_at(p, c, false, rff) * sigma[j];
                }
            }
        }
        for column in &self.wake {
            let g = column.strength(mu);
            for wp in &column.panels {
                v += self.doublet_velocity_at(wp, c, None) * g;
            }
        }
        if !self.vortons.is_empty() {
            v += self.vorton_velocity(c);
        }
        v
    }

    /// Perturbation potential at `c`, body and wake panels.
    pub fn perturbation_potential(&self, c: &Point3d, mu: &[f64], sigma: &[f64]) -> f64 {
        let rff = Some(self.config.rff);
        let mut phi = 0.0;
        for (j, p) in self.mesh.panels().iter().enumerate() {
            phi += self.doublet_potential_at(p, c, false, rff) * mu[j];
            if !p.is_mid() {
                phi += self.source_potential_at(p, c, rff) * sigma[j];
            }
        }
        for column in &self.wake {
            let g = column.strength(mu);
            for wp in &column.panels {
                phi += self.doublet_potential_at(wp, c, false, None) * g;
            }
        }
        phi
    }

    /// Two vortons per station half a step past its last wake panel's side
    /// edges, with those of neighbouring stations merged, and the negating
    /// vortices indexing into the row.
    fn shed_vorton_row(&self, dl: f64, mu: &[f64]) -> (Vec<Vorton>, Vec<NegatingVortex>) {
        let mut row = Vec::with_capacity(2 * self.wake.len());
        let mut negating = Vec::with_capacity(self.wake.len());
        for column in &self.wake {
            let Some(last) = column.last_panel() else {
                continue;
            };
            let gamma = column.strength(mu) * FOUR_PI;
            let left = (last.ta() - last.la()).normalized_or_zero();
            let right = (last.tb() - last.lb()).normalized_or_zero();
            negating.push(NegatingVortex {
                a: last.ta(),
                b: last.tb(),
                circulation: -gamma,
                vortons: [row.len(), row.len() + 1],
            });
            row.push(Vorton::new(last.ta() + left * (dl / 2.0), left * (gamma * dl)));
            row.push(Vorton::new(last.tb() + right * (dl / 2.0), right * (-gamma * dl)));
        }
        merge_coincident(&mut row, &mut negating, MERGE_DISTANCE);
        (row, negating)
    }

    fn solved_mu(&self) -> Result<Vec<f64>, AnalysisError> {
        match &self.solution {
            Some(s) => Ok(s.mu.clone()),
            None => Err(AnalysisError::NotReady("solve")),
        }
    }

    /// Seed the vorton wake from the current solution: a first row shed from
    /// the doublet sheet, then copies of it every `dl` along the wake direction.
    pub fn make_vortons(&mut self, dl: f64, n_rows: usize) -> Result<usize, AnalysisError> {
        if !(dl > 0.0) || n_rows == 0 {
            return Err(AnalysisError::InvalidConfig(format!(
                "vorton step {dl} and row count {n_rows} must be positive"
            )));
        }
        let mu = self.solved_mu()?;
        let (first, negating) = self.shed_vorton_row(dl, &mu);
        let step = self.wake_direction * dl;
        self.vortons.rows = (0..n_rows)
            .map(|k| {
                first
                    .iter()
                    .map(|v| Vorton {
                        position: v.position + step * k as f64,
                        ..*v
                    })
                    .collect()
            })
            .collect();
        self.vortons.negating = negating;
        let n = self.vortons.n_vortons();
        debug!(n_vortons = n, n_rows, dl, "vortons built");
        Ok(n)
    }

    /// Shed a new upstream row from the current doublet sheet. Returns the
    /// row count, which stays put once the last row has left the wake.
    pub fn make_vorton_row(&mut self, dl: f64) -> Result<usize, AnalysisError> {
        if !(dl > 0.0) {
            return Err(AnalysisError::InvalidConfig(format!("vorton step {dl} must be positive")));
        }
        let mu = self.solved_mu()?;
        let (row, negating) = self.shed_vorton_row(dl, &mu);
        self.vortons.prepend_row(row);
        self.vortons.negating = negating;
        Ok(self.vortons.n_rows())
    }

    /// Negating vortices for `mu`, one per station, indexed into a merged row.
    pub fn make_negating_vortices(&mut self, mu: &[f64]) {
        self.vortons.negating = self.shed_vorton_row(0.0, mu).1;
    }

    /// Convect the active vortons by one midpoint (RK2) step of the time the
    /// onset flow takes to cover `dl`, in the total velocity of the current
    /// solution. Rows are advected in parallel against the wake as it was
    /// before the step. Vortons beyond the discard distance from the origin
    /// are switched off; their count is returned.
    #[instrument(skip(self))]
    pub fn advect_vortons(&mut self, dl: f64) -> Result<usize, AnalysisError> {
        if !(dl > 0.0) {
            return Err(AnalysisError::InvalidConfig(format!("vorton step {dl} must be positive")));
        }
        let solution = self.solution.as_ref().ok_or(AnalysisError::NotReady("solve"))?;
        let speed = solution.v_inf.norm();
        if !(speed > 0.0) {
            return Err(AnalysisError::InvalidConfig(
                "vortons cannot be advected without an onset flow".into(),
            ));
        }
        let dt = dl / speed;
        let max_length = self.config.vorton_discard_length();
        let (v_inf, omega, cog) = (solution.v_inf, solution.omega, self.config.cog);
        let (mu, sigma) = (solution.mu.as_slice(), solution.sigma.as_slice());
        let velocity = |p: &Point3d| -> Vec3 {
            v_inf + (*p - cog).cross(&omega) + self.perturbation_velocity(p, mu, sigma, false)
        };
        let status = &self.status;

        let mut rows = self.vortons.rows.clone();
        let advect_row = |row: &mut Vec<Vorton>| -> Result<usize, AnalysisError> {
            if status.is_cancelled() {
                return Err(AnalysisError::Cancelled);
            }
            let mut deactivated = 0;
            for vorton in row.iter_mut().filter(|v| v.active) {
                let p0 = vorton.position;
                let p_mid = p0 + velocity(&p0) * (dt / 2.0);
                vorton.position = p0 + velocity(&p_mid) * dt;
                if (vorton.position - Point3d::ORIGIN).norm() > max_length {
                    vorton.active = false;
                    deactivated += 1;
                }
            }
            Ok(deactivated)
        };
        let counts: Result<Vec<usize>, AnalysisError> = match &self.pool {
            Some(pool) => pool.install(|| rows.par_iter_mut().map(&advect_row).collect()),
            None => rows.iter_mut().map(&advect_row).collect(),
        };
        let deactivated: usize = match counts {
            Ok(c) => c.iter().sum(),
            Err(e) => return Err(self.fail(e)),
        };
        self.vortons.rows = rows;
        debug!(deactivated, n_active = self.vortons.n_active(), dt, "vortons advected");
        Ok(deactivated)
    }

    pub fn clear_vortons(&mut self) {
        self.vortons.clear();
    }

    pub fn vorton_velocity(&self, c: &Point3d) -> Vec3 {
        self.vortons.velocity(
            c,
            self.config.vorton_core_length(),
            self.config.core_radius,
            self.config.ground.as_ref(),
        )
    }

    /// Vorton-induced velocity at every collocation point, in row blocks.
    pub fn make_rhs_vorton_velocities(&mut self) -> Result<Vec<Vec3>, AnalysisError> {
        let n = self.mesh.len();
        let mut data = vec![0.0; 3 * n];
        if let Err(e) = self.run_blocks(Stage::VortonVelocities, 3, &mut data, |i, row| {
            let c = self.mesh.panels()[i].collocation_point();
            row.copy_from_slice(&self.vorton_velocity(&c).to_array());
        }) {
            return Err(self.fail(e));
        }
        Ok(data
            .chunks_exact(3)
            .map(|v| Vec3::new(v[0], v[1], v[2]))
            .collect())
    }
}

fn mirrored(v: Vec3) -> Vec3 {
    Vec3::new(v.x, v.y, -v.z)
}
