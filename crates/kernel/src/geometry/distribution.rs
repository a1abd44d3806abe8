//! Parameter distributions used to cluster curve samples and panel stations.

use std::f64::consts::PI;

/// Map a uniform parameter `t` in [0,1] to a bunched parameter in [0,1].
///
/// `dist` < 0.5 blends a linear law with a tanh law that packs samples
/// towards the middle; `dist` > 0.5 blends with an atanh law that packs
/// them towards the end points. `amp` = 0 is close to uniform.
pub fn bunched_parameter(dist: f64, amp: f64, t: f64) -> f64 {
    let flin = -1.0 + 2.0 * t;
    if dist < 0.5 {
        let mix = 2.0 * dist;
        let a0 = (0.001 + amp.tanh()) * 3.5;
        let fth = (a0 * (2.0 * t - 1.0)).tanh() / a0.tanh();
        (1.0 + mix * flin + (1.0 - mix) * fth) / 2.0
    } else {
        let mix = 2.0 * (dist - 0.5);
        let a1 = (0.001 + (3.0 * amp).tanh()) * 0.99;
        let fath = (a1 * (2.0 * t - 1.0)).atanh() / a1.atanh();
        (1.0 + (1.0 - mix) * flin + mix * fath) / 2.0
    }
}

/// Full cosine spacing of `n` intervals on [0,1], denser at both ends.
pub fn cosine_spacing(n: usize) -> Vec<f64> {
    if n == 0 {
        return vec![0.0];
    }
    (0..=n)
        .map(|k| 0.5 * (1.0 - (k as f64 * PI / n as f64).cos()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_bunched_end_points_are_fixed() {
        for &(dist, amp) in &[(0.0, 0.0), (0.25, 0.5), (0.5, 0.0), (0.75, 1.0), (1.0, 0.3)] {
            assert_abs_diff_eq!(bunched_parameter(dist, amp, 0.0), 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(bunched_parameter(dist, amp, 1.0), 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(bunched_parameter(dist, amp, 0.5), 0.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_bunched_is_monotonic() {
        let mut prev = -1.0;
        for i in 0..=50 {
            let u = bunched_parameter(0.8, 0.7, i as f64 / 50.0);
            assert!(u > prev);
            prev = u;
        }
    }

    #[test]
    fn test_mid_distance_is_nearly_linear() {
        // dist = 0.5 with zero amplitude blends linear with a nearly flat atanh law
        let u = bunched_parameter(0.5, 0.0, 0.3);
        assert_abs_diff_eq!(u, 0.3, epsilon = 1e-3);
    }

    #[test]
    fn test_cosine_spacing() {
        let s = cosine_spacing(4);
        assert_eq!(s.len(), 5);
        assert_abs_diff_eq!(s[0], 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(s[2], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(s[4], 1.0, epsilon = 1e-12);
    }
}
