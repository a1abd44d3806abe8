//! Property-based tests for wind axes, wake spacing and unit-solution linearity.

use std::sync::OnceLock;

use proptest::prelude::*;

use aero_kernel::Vec3;
use aero_panel::wake::progression;
use aero_panel::{AnalysisConfig, PanelAnalysis, PanelMesh, wind_direction, wind_normal, wind_side};

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn arb_vec() -> impl Strategy<Value = Vec3> {
    (-20.0f64..20.0, -20.0f64..20.0, -20.0f64..20.0).prop_map(|(x, y, z)| Vec3::new(x, y, z))
}

/// One small wing shared by every case; the unit solutions only need building once.
fn prepared_wing() -> &'static PanelAnalysis {
    static WING: OnceLock<PanelAnalysis> = OnceLock::new();
    WING.get_or_init(|| {
        let mesh = PanelMesh::thin_wing(4.0, 1.0, 3, 6).unwrap();
        let mut a = PanelAnalysis::new(mesh, AnalysisConfig::single_threaded()).unwrap();
        a.prepare().unwrap();
        a
    })
}

const TOL: f64 = 1e-9;

// ---------------------------------------------------------------------------
// 1. Wind axes are orthonormal in symmetric flight
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn wind_axes_orthonormal(alpha in -90.0f64..90.0) {
        let d = wind_direction(alpha, 0.0);
        let n = wind_normal(alpha, 0.0);
        let s = wind_side(alpha, 0.0);
        prop_assert!((d.norm() - 1.0).abs() < TOL);
        prop_assert!((n.norm() - 1.0).abs() < TOL);
        prop_assert!(d.dot(&n).abs() < TOL);
        prop_assert!(d.dot(&s).abs() < TOL);
        prop_assert!((d.cross(&s).dot(&n) - 1.0).abs() < TOL);
    }
}

// ---------------------------------------------------------------------------
// 2. Wake node fractions run from 0 to 1 in geometric steps
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn wake_progression_is_geometric(n in 1usize..20, factor in 0.8f64..1.25) {
        let f = progression(n, factor);
        prop_assert_eq!(f.len(), n + 1);
        prop_assert_eq!(f[0], 0.0);
        prop_assert!((f[n] - 1.0).abs() < TOL);
        prop_assert!(f.windows(2).all(|w| w[1] > w[0]));
        for k in 1..n {
            let ratio = (f[k + 1] - f[k]) / (f[k] - f[k - 1]);
            prop_assert!((ratio - factor).abs() < 1e-6);
        }
    }
}

// ---------------------------------------------------------------------------
// 3. Unit-solution combination is linear in the onset flow
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn unit_combination_is_linear(v1 in arb_vec(), v2 in arb_vec(), w in arb_vec(), k in -3.0f64..3.0) {
        let a = prepared_wing();
        let zero = Vec3::new(0.0, 0.0, 0.0);
        let mu1 = a.combine_unit_rhs(v1, zero).unwrap();
        let mu2 = a.combine_unit_rhs(v2, w).unwrap();
        let sum = a.combine_unit_rhs(v1 * k + v2, w).unwrap();
        let scale = 1.0 + mu1.iter().chain(&mu2).fold(0.0f64, |m, v| m.max(v.abs()));
        for i in 0..sum.len() {
            prop_assert!((sum[i] - (k * mu1[i] + mu2[i])).abs() < 1e-9 * scale * (1.0 + k.abs()));
        }
    }
}
