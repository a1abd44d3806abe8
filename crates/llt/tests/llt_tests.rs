//! Lifting-line runs on rectangular and tapered wings with synthetic polars.

use std::f64::consts::PI;
use std::thread;
use std::time::Duration;

use aero_llt::{
    LltConfig, LltError, LltTask, LltWing, Polar, PolarMesh, PolarPoint, SpeedMode,
};
use aero_panel::AnalysisStatus;
use approx::assert_relative_eq;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Tabulated from -10° to 15° every half degree.
fn foil(reynolds: f64, cl: impl Fn(f64) -> f64) -> Polar {
    let points = (-20..=30)
        .map(|i| {
            let alpha = i as f64 * 0.5;
            let c = cl(alpha.to_radians());
            PolarPoint {
                alpha,
                cl: c,
                cd: 0.008 + 0.01 * c * c,
                cm: -0.02,
                xtr_top: 0.4,
                xtr_bot: 0.7,
                xcp: 0.0,
            }
        })
        .collect();
    Polar::new(reynolds, points).unwrap()
}

/// Thin-airfoil polars spanning the Reynolds numbers of the test wings.
fn thin_polars() -> PolarMesh {
    PolarMesh::new(vec![
        foil(1.0e5, |a| 2.0 * PI * a),
        foil(1.0e7, |a| 2.0 * PI * a),
    ])
    .unwrap()
}

/// Lift curve bending over at high incidence.
fn soft_stall_polars() -> PolarMesh {
    let cl = |a: f64| 2.0 * PI * a - 12.0 * a * a * a;
    PolarMesh::new(vec![foil(1.0e5, cl), foil(1.0e7, cl)]).unwrap()
}

fn rectangular_task(config: LltConfig) -> LltTask<PolarMesh> {
    let wing = LltWing::rectangular(8.0, 1.0).unwrap();
    LltTask::new(wing, thin_polars(), config).unwrap()
}

fn messages(task: &LltTask<PolarMesh>) -> Vec<String> {
    task.drain_reports().into_iter().map(|r| r.message).collect()
}

// ---------------------------------------------------------------------------
// Convergence
// ---------------------------------------------------------------------------

#[test]
fn rectangular_wing_matches_lifting_line_theory() {
    let mut task = rectangular_task(LltConfig::default());
    task.set_alpha_range(&[4.0]);
    assert_eq!(task.run().unwrap(), AnalysisStatus::Finished);

    let points = task.op_points();
    assert_eq!(points.len(), 1);
    let p = &points[0];
    assert!(p.converged);
    assert!(!p.wing_out);
    assert!(p.iterations < task.config().max_iter);

    // classical AR 8 rectangular wing: CL_alpha near 4.9 per radian
    let cl_alpha = p.cl / 4f64.to_radians();
    assert!(cl_alpha > 4.6 && cl_alpha < 5.2, "CL_alpha = {cl_alpha}");
    let e = p.cl * p.cl / (PI * 8.0 * p.cdi);
    assert!(e > 0.88 && e < 1.0, "span efficiency {e}");
    assert!(p.cdv > 0.008);
    assert_relative_eq!(p.speed, 10.0);

    // stations run from -b/2 to b/2 and the loading is symmetric
    let span = &p.span;
    assert_eq!(span.len(), task.config().n_stations - 1);
    assert!(span.position.windows(2).all(|w| w[1] > w[0]));
    let n = span.len();
    for k in 0..n {
        assert_relative_eq!(span.cl[k], span.cl[n - 1 - k], epsilon = 1e-9);
        assert_relative_eq!(span.position[k], -span.position[n - 1 - k], epsilon = 1e-12);
        assert!(span.ai[k] < 0.0);
    }
    assert!(span.cl[n / 2] > span.cl[0]);
    assert!(p.rolling_moment.abs() < 1e-9);
    assert!(p.yawing_moment.abs() < 1e-9);

    // wing root carries the largest bending moment
    let root = span.bending_moment[n / 2];
    assert!(root > 0.0);
    assert_relative_eq!(p.max_bending, root, max_relative = 0.05);

    // lift force along the wind normal, induced drag along the wind
    let (sa, ca) = 4f64.to_radians().sin_cos();
    let lift = -p.force_per_q.x * sa + p.force_per_q.z * ca;
    assert_relative_eq!(lift, p.cl * 8.0, epsilon = 1e-9);
}

#[test]
fn lift_grows_with_alpha_and_washout_reduces_it() {
    let mut plain = rectangular_task(LltConfig::default());
    plain.set_alpha_range(&[0.0, 2.0, 4.0, 6.0]);
    plain.run().unwrap();
    let cl: Vec<f64> = plain.op_points().iter().map(|p| p.cl).collect();
    assert_eq!(cl.len(), 4);
    assert!(cl[0].abs() < 1e-9);
    assert!(cl.windows(2).all(|w| w[1] > w[0]));
    assert_relative_eq!(cl[2], 2.0 * cl[1], max_relative = 0.01);

    let wing = LltWing::tapered(8.0, 1.2, 0.8, 0.0, -3.0).unwrap();
    let mut twisted = LltTask::new(wing, thin_polars(), LltConfig::default()).unwrap();
    twisted.set_alpha_range(&[4.0]);
    twisted.run().unwrap();
    let p = &twisted.op_points()[0];
    assert!(p.converged);
    assert!(p.cl < cl[2]);
    let span = &p.span;
    assert!(span.twist[0] < span.twist[span.len() / 2]);
}

#[test]
fn fixed_lift_speed_balances_weight() {
    let mass = 2.0;
    let config = LltConfig::fixed_lift(mass);
    let mut task = rectangular_task(config.clone());
    task.set_alpha_range(&[3.0, 5.0]);
    task.run().unwrap();

    let points = task.op_points();
    assert_eq!(points.len(), 2);
    for p in points {
        assert!(p.converged);
        let lift = 0.5 * config.density * p.speed * p.speed * 8.0 * p.cl;
        assert_relative_eq!(lift, mass * 9.81, max_relative = 0.02);
    }
    assert!(points[1].speed < points[0].speed);
}

// ---------------------------------------------------------------------------
// Failures and diagnostics
// ---------------------------------------------------------------------------

#[test]
fn fixed_lift_negative_alpha_is_skipped() {
    let mut task = rectangular_task(LltConfig::fixed_lift(2.0));
    task.set_alpha_range(&[-4.0, 4.0]);
    assert_eq!(task.run().unwrap(), AnalysisStatus::Finished);

    let points = task.op_points();
    assert_eq!(points.len(), 1);
    assert_relative_eq!(points[0].alpha, 4.0);
    assert!(task.has_errors());
    let log = messages(&task);
    assert!(log.iter().any(|m| m.contains("lift") && m.contains("Aborting")));
}

#[test]
fn polar_overrun_sets_wing_out() {
    let mut task = rectangular_task(LltConfig::default());
    task.set_alpha_range(&[25.0]);
    task.run().unwrap();

    let p = &task.op_points()[0];
    assert!(p.wing_out);
    assert!(!p.converged);
    assert!(task.has_errors());
    assert!(messages(&task).iter().any(|m| m.contains("could not be interpolated")));
}

#[test]
fn single_iteration_leaves_point_unconverged() {
    let config = LltConfig {
        max_iter: 1,
        precision: 1e-6,
        ..LltConfig::default()
    };
    let wing = LltWing::rectangular(8.0, 1.0).unwrap();
    let mut task = LltTask::new(wing, soft_stall_polars(), config).unwrap();
    task.set_alpha_range(&[10.0]);
    task.run().unwrap();

    let p = &task.op_points()[0];
    assert!(!p.converged);
    assert_eq!(p.iterations, 1);
    assert!(task.has_errors());
    assert!(messages(&task).iter().any(|m| m.contains("unconverged after 1 iterations out of 1")));
}

#[test]
fn iterations_converge_on_nonlinear_polar() {
    let wing = LltWing::rectangular(8.0, 1.0).unwrap();
    let config = LltConfig {
        max_iter: 400,
        ..LltConfig::default()
    };
    let mut task = LltTask::new(wing, soft_stall_polars(), config).unwrap();
    task.set_alpha_range(&[10.0]);
    task.run().unwrap();

    let p = &task.op_points()[0];
    assert!(p.converged);
    assert!(p.iterations > 0);
    let history = task.max_a();
    assert_eq!(history.len(), p.iterations);
    assert!(history.last() < history.first());
}

#[test]
fn invalid_settings_are_rejected() {
    let wing = LltWing::rectangular(8.0, 1.0).unwrap();
    let config = LltConfig {
        speed_mode: SpeedMode::FixedSpeed { speed: -1.0 },
        ..LltConfig::default()
    };
    assert!(matches!(
        LltTask::new(wing, thin_polars(), config),
        Err(LltError::InvalidConfig(_))
    ));
}

// ---------------------------------------------------------------------------
// Reports and cancellation
// ---------------------------------------------------------------------------

#[test]
fn reports_reach_an_observer_thread() {
    let mut task = rectangular_task(LltConfig::default());
    task.set_alpha_range(&[2.0]);
    let queue = task.reports();

    let observer = thread::spawn(move || {
        let mut seen = Vec::new();
        while let Some(report) = queue.next_report(Duration::from_secs(10)) {
            let done = report.message.contains("Done processing");
            seen.push(report);
            if done {
                break;
            }
        }
        seen
    });
    task.run().unwrap();
    let seen = observer.join().unwrap();

    assert!(seen[0].message.contains("Launching"));
    let converged = seen
        .iter()
        .find(|r| r.message.contains("converged after"))
        .unwrap();
    assert_eq!(converged.alpha, Some(2.0));
    assert!(seen.last().unwrap().message.contains("Done processing"));
}

#[test]
fn cancel_before_run() {
    let mut task = rectangular_task(LltConfig::default());
    task.set_alpha_range(&[2.0]);
    task.cancel();
    assert_eq!(task.run(), Err(LltError::Cancelled));
    assert!(task.op_points().is_empty());
}

#[test]
fn cancel_from_observer_stops_the_loop() {
    let config = LltConfig {
        n_stations: 60,
        max_iter: 2000,
        precision: 1e-12,
        ..LltConfig::default()
    };
    let wing = LltWing::rectangular(8.0, 1.0).unwrap();
    let mut task = LltTask::new(wing, soft_stall_polars(), config).unwrap();
    let alphas: Vec<f64> = (0..40).map(|i| i as f64 * 0.25).collect();
    task.set_alpha_range(&alphas);

    let queue = task.reports();
    let handle = task.cancel_handle();
    let observer = thread::spawn(move || {
        while let Some(report) = queue.next_report(Duration::from_secs(10)) {
            if report.message.contains("Calculating") {
                handle.cancel();
                break;
            }
        }
    });
    let status = task.run().unwrap();
    observer.join().unwrap();

    assert_eq!(status, AnalysisStatus::Cancelled);
    assert_eq!(task.status(), AnalysisStatus::Cancelled);
    assert!(task.op_points().is_empty());
    assert!(messages(&task).iter().any(|m| m.contains("cancelled")));
}
