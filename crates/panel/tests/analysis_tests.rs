//! End-to-end panel analyses on small wings and bodies.

use std::f64::consts::PI;
use std::sync::Arc;

use aero_kernel::{Point3d, Triangle3d, Triangulation, Vec3};
use aero_panel::{
    AnalysisConfig, AnalysisError, AnalysisStatus, BoundaryCondition, PanelAnalysis, PanelKernel,
    PanelMesh, Progress, ReferenceDimensions, Stage, SurfacePosition, wind_direction,
};
use approx::assert_relative_eq;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn wing_config(span: f64, chord: f64) -> AnalysisConfig {
    AnalysisConfig {
        reference: ReferenceDimensions {
            area: span * chord,
            span,
            chord,
        },
        ..AnalysisConfig::single_threaded()
    }
}

fn rectangular_wing(config: AnalysisConfig) -> PanelAnalysis {
    let mesh = PanelMesh::thin_wing(8.0, 1.0, 6, 16).unwrap();
    PanelAnalysis::new(mesh, config).unwrap()
}

/// Regular octahedron with outward triangles.
fn octahedron() -> Triangulation {
    let mut tri = Triangulation::new();
    for sx in [1.0, -1.0] {
        for sy in [1.0, -1.0] {
            for sz in [1.0, -1.0] {
                let a = Point3d::new(sx, 0.0, 0.0);
                let b = Point3d::new(0.0, sy, 0.0);
                let c = Point3d::new(0.0, 0.0, sz);
                let t = if sx * sy * sz > 0.0 {
                    Triangle3d::new(a, b, c)
                } else {
                    Triangle3d::new(a, c, b)
                };
                tri.append_triangle(t);
            }
        }
    }
    tri.make_triangle_connections();
    tri
}

fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max)
}

// ---------------------------------------------------------------------------
// Unit solutions
// ---------------------------------------------------------------------------

#[test]
fn unit_combination_matches_direct_solve_on_thick_wing() {
    let mesh = PanelMesh::thick_wing(4.0, 1.0, 0.12, 6, 4).unwrap();
    let mut config = wing_config(4.0, 1.0);
    config.boundary_condition = BoundaryCondition::Dirichlet;
    config.cog = Point3d::new(0.25, 0.0, 0.0);
    let mut a = PanelAnalysis::new(mesh, config).unwrap();
    a.prepare().unwrap();

    let v_inf = wind_direction(5.0, 3.0) * 12.0;
    let omega = Vec3::new(0.1, 0.2, -0.05);
    let combined = a.combine_unit_rhs(v_inf, omega).unwrap();
    let field = a.onset_velocities(v_inf, omega);
    let rhs = a.make_rhs(&field).unwrap();
    let direct = a.solve_rhs(&rhs).unwrap();

    let scale = direct.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    assert!(scale > 0.0);
    assert!(max_abs_diff(&combined, &direct) < 1e-8 * scale);
    assert!(
        max_abs_diff(&a.combine_unit_sources(v_inf, omega).unwrap(), &a.source_strengths(&field))
            < 1e-12
    );
}

#[test]
fn unit_combination_matches_direct_solve_on_thin_wing() {
    let mut a = rectangular_wing(wing_config(8.0, 1.0));
    a.prepare().unwrap();
    let v_inf = wind_direction(-2.0, 1.0) * 30.0;
    let omega = Vec3::new(0.0, 0.3, 0.1);
    let combined = a.combine_unit_rhs(v_inf, omega).unwrap();
    let field = a.onset_velocities(v_inf, omega);
    let rhs = a.make_rhs(&field).unwrap();
    let direct = a.solve_rhs(&rhs).unwrap();
    let scale = direct.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    assert!(max_abs_diff(&combined, &direct) < 1e-8 * scale);
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[test]
fn cancel_during_matrix_assembly() {
    let mesh = PanelMesh::thin_wing(10.0, 1.0, 25, 20).unwrap();
    assert_eq!(mesh.len(), 500);
    let mut a = PanelAnalysis::new(mesh, AnalysisConfig::single_threaded()).unwrap();
    let handle = a.cancel_handle();
    a.set_progress_observer(Arc::new(move |p: &Progress| {
        if p.stage == Stage::InfluenceMatrix && p.blocks_done == 1 {
            handle.cancel();
        }
    }));

    assert_eq!(a.make_influence_matrix(), Err(AnalysisError::Cancelled));
    assert_eq!(a.status(), AnalysisStatus::Cancelled);
    assert!(!a.results_valid());
    assert!(a.influence_matrix().is_none());
    assert!(a.unit_solutions().is_none());
    // later requests keep failing until reset
    assert!(matches!(a.solve(Vec3::X, Vec3::ZERO), Err(AnalysisError::Cancelled)));
    assert!(a.solution().is_none());
}

#[test]
fn cancelled_run_can_be_reset() {
    let mut a = rectangular_wing(wing_config(8.0, 1.0));
    a.cancel();
    assert_eq!(a.status(), AnalysisStatus::Cancelled);
    assert!(matches!(a.solve(Vec3::X, Vec3::ZERO), Err(AnalysisError::Cancelled)));

    a.reset();
    assert_eq!(a.status(), AnalysisStatus::Pending);
    a.solve(wind_direction(3.0, 0.0), Vec3::ZERO).unwrap();
    assert!(a.results_valid());
    assert_eq!(a.finish(), AnalysisStatus::Finished);
    // a finished run ignores late cancels
    a.cancel();
    assert_eq!(a.status(), AnalysisStatus::Finished);
    assert!(a.solution().is_some());
}

#[test]
fn progress_reaches_every_block() {
    let mut a = rectangular_wing(AnalysisConfig {
        max_threads: 2,
        ..wing_config(8.0, 1.0)
    });
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    a.set_progress_observer(Arc::new(move |p: &Progress| {
        if p.stage == Stage::InfluenceMatrix {
            sink.lock().unwrap().push((p.blocks_done, p.n_blocks));
        }
    }));
    a.make_influence_matrix().unwrap();
    let seen = seen.lock().unwrap();
    let n_blocks = seen[0].1;
    assert_eq!(seen.len(), n_blocks);
    assert_eq!(seen.iter().map(|s| s.0).max(), Some(n_blocks));
}

// ---------------------------------------------------------------------------
// Forces
// ---------------------------------------------------------------------------

#[test]
fn flat_plate_lift_and_induced_drag() {
    let mut a = rectangular_wing(wing_config(8.0, 1.0));
    let alpha = 5.0;
    let point = a.operating_point(alpha, 0.0, 20.0).unwrap();

    // positive circulation means negative doublets along the trailing edge
    for pair in a.mesh().trailing_pairs() {
        assert!(point.mu[pair.upper] < 0.0);
    }
    let cl = point.coefficients.cl;
    assert!(cl > 0.25 && cl < 0.6, "cl = {cl}");
    assert!(point.near_field.cl > 0.0);

    let area = a.config().reference.area;
    let cdi = point.span.cdi(alpha, 0.0, area);
    let cl_span = point.span.cl(area);
    assert!(cdi > 0.0);
    assert_relative_eq!(cl_span, cl, max_relative = 0.1);
    let aspect_ratio = 8.0;
    let inv_e = cdi * PI * aspect_ratio / (cl_span * cl_span);
    assert!((0.9..1.35).contains(&inv_e), "1/e = {inv_e}");

    // symmetric loading on a symmetric wing
    let stations = &point.span.stations;
    let n = stations.len();
    for k in 0..n / 2 {
        assert_relative_eq!(stations[k].gamma, stations[n - 1 - k].gamma, max_relative = 1e-6);
    }
    assert!(stations[n / 2].gamma > stations[0].gamma);
}

#[test]
fn zero_incidence_flat_plate_has_no_load() {
    let mut a = rectangular_wing(wing_config(8.0, 1.0));
    let point = a.operating_point(0.0, 0.0, 10.0).unwrap();
    assert!(point.mu.iter().all(|m| m.abs() < 1e-10));
    assert!(point.coefficients.cl.abs() < 1e-10);
}

#[test]
fn ground_effect_increases_lift() {
    let mut free = rectangular_wing(wing_config(8.0, 1.0));
    let mut ground_config = wing_config(8.0, 1.0);
    ground_config.ground = AnalysisConfig::with_ground_effect(0.5).ground;
    let mut ground = rectangular_wing(ground_config);

    let cl_free = free.operating_point(4.0, 0.0, 10.0).unwrap().coefficients.cl;
    let cl_ground = ground.operating_point(4.0, 0.0, 10.0).unwrap().coefficients.cl;
    assert!(cl_ground > cl_free, "ground {cl_ground} vs free {cl_free}");
}

// ---------------------------------------------------------------------------
// Stability
// ---------------------------------------------------------------------------

#[test]
fn stability_derivative_signs() {
    let mut a = rectangular_wing(wing_config(8.0, 1.0));
    let d = a.stability_derivatives(5.0, 10.0).unwrap();
    assert!(d.x_u < 0.0, "Xu = {}", d.x_u);
    assert!(d.z_w < 0.0, "Zw = {}", d.z_w);
    assert!(d.l_p < 0.0, "Lp = {}", d.l_p);
    assert!(d.m_q < 0.0, "Mq = {}", d.m_q);
}

#[test]
fn flat_plate_trims_at_zero_lift() {
    let mut a = rectangular_wing(wing_config(8.0, 1.0));
    let alpha = a.zero_moment_angle().unwrap();
    assert!(alpha.abs() < 1e-6, "alpha = {alpha}");
    assert!(matches!(a.trimmed_conditions(1.0), Err(AnalysisError::NegativeLift { .. })));
    assert!(matches!(a.trimmed_conditions(0.0), Err(AnalysisError::InvalidConfig(_))));
}

// ---------------------------------------------------------------------------
// Sweeps
// ---------------------------------------------------------------------------

#[test]
fn alpha_sweep_is_linear_in_lift() {
    let mut a = rectangular_wing(wing_config(8.0, 1.0));
    let outcomes = a.run_alpha_sweep(&[-2.0, 0.0, 2.0, 4.0], 0.0, 15.0).unwrap();
    assert_eq!(outcomes.len(), 4);
    let cl: Vec<f64> = outcomes
        .iter()
        .map(|o| o.result.as_ref().unwrap().coefficients.cl)
        .collect();
    assert!(cl.windows(2).all(|w| w[1] > w[0]));
    assert!(cl[1].abs() < 1e-10);
    assert_relative_eq!(cl[0], -cl[2], max_relative = 1e-6);
    assert_eq!(a.status(), AnalysisStatus::Finished);
    assert!(a.results_valid());
}

#[test]
fn cancelled_sweep_returns_cancelled() {
    let mut a = rectangular_wing(wing_config(8.0, 1.0));
    let handle = a.cancel_handle();
    a.set_progress_observer(Arc::new(move |_: &Progress| handle.cancel()));
    assert_eq!(
        a.run_alpha_sweep(&[0.0, 5.0], 0.0, 10.0).map(|o| o.len()),
        Err(AnalysisError::Cancelled)
    );
    assert!(!a.results_valid());
}

#[test]
fn sweep_rejects_bad_speed() {
    let mut a = rectangular_wing(wing_config(8.0, 1.0));
    assert!(matches!(
        a.run_alpha_sweep(&[0.0], 0.0, 0.0),
        Err(AnalysisError::InvalidConfig(_))
    ));
}

#[test]
fn sweep_with_vorton_wake() {
    let mut config = wing_config(8.0, 1.0);
    config.vorton_wake = true;
    config.buffer_wake_length = 0.6;
    config.wake_length = 3.0;
    config.vorton_iterations = 3;
    let mut a = rectangular_wing(config);
    let outcomes = a.run_alpha_sweep(&[4.0], 0.0, 10.0).unwrap();
    let point = outcomes[0].result.as_ref().unwrap();
    assert!(point.coefficients.cl > 0.0);
    assert_eq!(point.span.stations.len(), 16);
    // 12 seeded rows plus one per wake iteration, 17 merged vortons each
    let wake = a.vortons();
    assert_eq!(wake.n_rows(), 15);
    assert_eq!(wake.rows[0].len(), 17);
    assert_eq!(wake.n_active(), wake.n_vortons());
}

// ---------------------------------------------------------------------------
// Closed bodies
// ---------------------------------------------------------------------------

#[test]
fn closed_body_sources_balance() {
    let mesh = PanelMesh::from_triangulation(&octahedron(), SurfacePosition::Body).unwrap();
    assert_eq!(mesh.len(), 8);
    for p in mesh.panels() {
        let c = p.collocation_point();
        assert!(p.normal().dot(&(c - Point3d::ORIGIN)) > 0.0);
    }
    let mut a = PanelAnalysis::new(mesh, AnalysisConfig::single_threaded()).unwrap();
    assert!(a.wake_columns().is_empty());

    let v_inf = Vec3::new(3.0, 0.5, -1.0);
    let solution = a.solve(v_inf, Vec3::ZERO).unwrap().clone();
    let flux: f64 = a
        .mesh()
        .panels()
        .iter()
        .zip(&solution.sigma)
        .map(|(p, s)| s * p.area())
        .sum();
    assert!(flux.abs() < 1e-12);
    assert!(solution.mu.iter().all(|m| m.is_finite()));
    assert!(solution.cp.iter().all(|c| c.is_finite()));
}
