//! Flow field computation for mass-conservative updates.
//!
//! The flow field determines how mass moves through the grid.

use crate::schema::FlowParams;

use super::Vector;

/// Density saturation weight.
///
/// alpha(m) = clamp((m / (beta_a * distribution_size))^n, 0, 1)
///
/// Zero for empty cells, rising as a power law and reaching 1 once the local
/// mass hits the saturation density, where the mass gradient term takes over.
#[inline]
pub fn compute_alpha(mass: f64, params: &FlowParams) -> f64 {
    if mass <= 0.0 {
        return 0.0;
    }
    (mass / params.saturation_mass()).powf(params.n).clamp(0.0, 1.0)
}

/// Compute flow for the cells covered by `out`.
///
/// F(x) = grad_U(x) - alpha(A(x)) * grad_A(x)
///
/// All slices must cover the same cells.
pub fn compute_flow_into(
    grad_growth: &[Vector],
    grad_mass: &[Vector],
    mass: &[f64],
    params: &FlowParams,
    out: &mut [Vector],
) {
    for (((f, gu), ga), &m) in out.iter_mut().zip(grad_growth).zip(grad_mass).zip(mass) {
        let alpha = compute_alpha(m, params);
        *f = [
            gu[0] - alpha * ga[0],
            gu[1] - alpha * ga[1],
            gu[2] - alpha * ga[2],
        ];
    }
}

/// Compute flow field statistics for debugging/monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct FlowStats {
    pub mean_magnitude: f64,
    pub max_magnitude: f64,
    pub mean_alpha: f64,
}

impl FlowStats {
    pub fn compute(flow: &[Vector], mass: &[f64], params: &FlowParams) -> Self {
        Self::from_alphas(flow, mass.iter().map(|&m| compute_alpha(m, params)))
    }

    /// Stats for a field whose per-cell alpha is already known.
    pub fn from_alphas(flow: &[Vector], alphas: impl IntoIterator<Item = f64>) -> Self {
        let len = flow.len();
        if len == 0 {
            return Self::default();
        }

        let mut sum_mag = 0.0f64;
        let mut max_mag = 0.0f64;
        let mut sum_alpha = 0.0f64;

        for (f, alpha) in flow.iter().zip(alphas) {
            let mag = (f[0] * f[0] + f[1] * f[1] + f[2] * f[2]).sqrt();
            sum_mag += mag;
            max_mag = max_mag.max(mag);
            sum_alpha += alpha;
        }

        Self {
            mean_magnitude: sum_mag / len as f64,
            max_magnitude: max_mag,
            mean_alpha: sum_alpha / len as f64,
        }
    }

    /// Combine stats of several equally sized fields.
    pub fn merge(stats: &[FlowStats]) -> Self {
        if stats.is_empty() {
            return Self::default();
        }
        let n = stats.len() as f64;
        Self {
            mean_magnitude: stats.iter().map(|s| s.mean_magnitude).sum::<f64>() / n,
            max_magnitude: stats.iter().map(|s| s.max_magnitude).fold(0.0, f64::max),
            mean_alpha: stats.iter().map(|s| s.mean_alpha).sum::<f64>() / n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn params() -> FlowParams {
        FlowParams {
            beta_a: 1.0,
            n: 2.0,
            distribution_size: 1.0,
        }
    }

    #[test]
    fn test_alpha_bounds() {
        let p = FlowParams::default();

        assert_eq!(compute_alpha(0.0, &p), 0.0);
        assert_eq!(compute_alpha(-3.0, &p), 0.0);
        assert_eq!(compute_alpha(p.saturation_mass(), &p), 1.0);
        assert_eq!(compute_alpha(p.saturation_mass() * 2.0, &p), 1.0);
    }

    #[test]
    fn test_alpha_uses_distribution_size() {
        let narrow = FlowParams {
            distribution_size: 0.5,
            ..params()
        };
        // Saturation density halves, so the same mass gives a larger alpha
        assert!(compute_alpha(0.4, &narrow) > compute_alpha(0.4, &params()));
        assert!((compute_alpha(0.25, &narrow) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_alpha_different_n_values() {
        let mass = 0.5;
        let n1 = FlowParams { n: 1.0, ..params() };
        let n2 = params();
        let n4 = FlowParams { n: 4.0, ..params() };

        assert!((compute_alpha(mass, &n1) - 0.5).abs() < 1e-12);
        assert!((compute_alpha(mass, &n2) - 0.25).abs() < 1e-12);
        assert!(compute_alpha(mass, &n4) < compute_alpha(mass, &n2));
    }

    #[test]
    fn test_flow_zero_mass() {
        // With zero mass (alpha=0), flow follows the growth gradient
        let gu = vec![[1.0, 0.5, 0.0], [2.0, 1.0, 0.25]];
        let ga = vec![[-1.0, -0.5, 0.0], [-2.0, -1.0, 3.0]];
        let mass = vec![0.0, 0.0];
        let mut out = vec![[0.0; 3]; 2];

        compute_flow_into(&gu, &ga, &mass, &params(), &mut out);
        assert_eq!(out, gu);
    }

    #[test]
    fn test_flow_saturated_mass() {
        // With alpha=1, flow is grad_U - grad_A
        let gu = vec![[1.0, 0.5, 0.0]];
        let ga = vec![[-1.0, 2.0, 0.0]];
        let mass = vec![10.0];
        let mut out = vec![[0.0; 3]];

        compute_flow_into(&gu, &ga, &mass, &params(), &mut out);
        assert_eq!(out[0], [2.0, -1.5, 0.0]);
    }

    #[test]
    fn test_flow_stats_computation() {
        let flow = vec![[3.0, 4.0, 0.0], [0.0, 5.0, 0.0], [4.0, 3.0, 0.0]];
        let mass = vec![0.0, 0.5, 1.0];

        let stats = FlowStats::compute(&flow, &mass, &params());

        assert!((stats.mean_magnitude - 5.0).abs() < 1e-12);
        assert!((stats.max_magnitude - 5.0).abs() < 1e-12);
        let expected_mean_alpha = (0.0 + 0.25 + 1.0) / 3.0;
        assert!((stats.mean_alpha - expected_mean_alpha).abs() < 1e-12);

        let merged = FlowStats::merge(&[stats, FlowStats::default()]);
        assert!((merged.mean_magnitude - 2.5).abs() < 1e-12);
        assert_eq!(merged.max_magnitude, 5.0);
    }

    proptest! {
        #[test]
        fn alpha_is_monotone_and_bounded(
            a in 0.0f64..100.0,
            b in 0.0f64..100.0,
            beta_a in 0.01f64..10.0,
            n in 0.1f64..8.0,
            distribution_size in 0.1f64..4.0,
        ) {
            let p = FlowParams { beta_a, n, distribution_size };
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let alo = compute_alpha(lo, &p);
            let ahi = compute_alpha(hi, &p);
            prop_assert!((0.0..=1.0).contains(&alo));
            prop_assert!((0.0..=1.0).contains(&ahi));
            prop_assert!(alo <= ahi);
        }
    }
}
