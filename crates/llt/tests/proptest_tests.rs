//! Property-based tests for polar lookups and lifting-line symmetry.

use std::f64::consts::PI;

use proptest::prelude::*;

use aero_llt::{LltConfig, LltTask, LltWing, Polar, PolarMesh, PolarPoint, ViscousPolars};

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn foil(reynolds: f64, alpha0: f64) -> Polar {
    let points = (-20..=30)
        .map(|i| {
            let alpha = i as f64 * 0.5;
            let cl = 2.0 * PI * (alpha - alpha0).to_radians();
            PolarPoint {
                alpha,
                cl,
                cd: 0.01 + 0.02 * cl * cl,
                cm: -0.03,
                xtr_top: 0.5,
                xtr_bot: 0.9,
                xcp: 0.0,
            }
        })
        .collect();
    Polar::new(reynolds, points).unwrap()
}

fn mesh() -> PolarMesh {
    PolarMesh::new(vec![foil(1.0e5, -1.0), foil(1.0e7, -2.0)]).unwrap()
}

/// Span, root chord, taper ratio and tip twist of a straight wing.
fn arb_wing() -> impl Strategy<Value = (f64, f64, f64, f64)> {
    (4.0f64..12.0, 0.6f64..1.5, 0.4f64..1.0, -3.0f64..0.0)
}

// ---------------------------------------------------------------------------
// 1. Lookups stay inside the table and flag what falls outside it
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn lookup_is_bounded(re in 1.0e4f64..1.0e8, alpha in -20.0f64..25.0) {
        let polars = mesh();
        let l = polars.lookup(0.0, re, alpha);
        prop_assert_eq!(l.out_of_alpha, !(-10.0..=15.0).contains(&alpha));
        prop_assert_eq!(l.out_of_re, !(1.0e5..=1.0e7).contains(&re));

        let cl_min = 2.0 * PI * (-10.0f64 + 1.0).to_radians();
        let cl_max = 2.0 * PI * (15.0f64 + 2.0).to_radians();
        prop_assert!(l.point.cl >= cl_min - 1e-12 && l.point.cl <= cl_max + 1e-12);
        let a0 = polars.zero_lift_angle(0.0, re);
        prop_assert!((-2.0 - 1e-9..=-1.0 + 1e-9).contains(&a0));
    }
}

// ---------------------------------------------------------------------------
// 2. A symmetric wing carries a symmetric load
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn span_loading_is_symmetric((span, root, taper, twist) in arb_wing(), alpha in 1.0f64..8.0) {
        let wing = LltWing::tapered(span, root, root * taper, 0.0, twist).unwrap();
        let mut task = LltTask::new(wing, mesh(), LltConfig::default()).unwrap();
        task.set_alpha_range(&[alpha]);
        task.run().unwrap();

        let p = &task.op_points()[0];
        prop_assert!(p.converged);
        prop_assert!(p.cl > 0.0 && p.cdi > 0.0);
        let n = p.span.len();
        for k in 0..n {
            prop_assert!((p.span.cl[k] - p.span.cl[n - 1 - k]).abs() < 1e-9);
            prop_assert!((p.span.bending_moment[k] - p.span.bending_moment[n - 1 - k]).abs() < 1e-6 * (1.0 + p.max_bending.abs()));
        }
    }
}
