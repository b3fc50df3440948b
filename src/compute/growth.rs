//! Growth function for Flow Lenia.
//!
//! The growth function determines how the automaton reacts to local neighborhood density.

use super::KernelBank;

/// Compute growth function: G(u; mu, sigma) = 2 * exp(-(u - mu)^2 / (2*sigma^2)) - 1
///
/// Output range: [-1, 1]
/// - Returns 1.0 when u == mu (optimal activation)
/// - Returns -1.0 when u is far from mu
#[inline]
pub fn growth(u: f64, mu: f64, sigma: f64) -> f64 {
    let diff = u - mu;
    2.0 * (-diff * diff / (2.0 * sigma * sigma)).exp() - 1.0
}

/// Apply growth function, accumulating into target buffer.
pub fn growth_accumulate(potential: &[f64], target: &mut [f64], mu: f64, sigma: f64) {
    let inv_sigma_sq_2 = 1.0 / (2.0 * sigma * sigma);

    for (t, &u) in target.iter_mut().zip(potential.iter()) {
        let diff = u - mu;
        *t += 2.0 * (-diff * diff * inv_sigma_sq_2).exp() - 1.0;
    }
}

/// Fill `target[..]` (cells starting at `offset`) with the summed growth of
/// every kernel feeding `channel`.
///
/// Contributions of several kernels are added without reclipping.
pub fn channel_growth_chunk(
    bank: &KernelBank,
    potentials: &[Vec<f64>],
    channel: usize,
    offset: usize,
    target: &mut [f64],
) {
    target.fill(0.0);
    for (kernel, potential) in bank.kernels().iter().zip(potentials) {
        if kernel.target_channel != channel {
            continue;
        }
        growth_accumulate(
            &potential[offset..offset + target.len()],
            target,
            kernel.mu,
            kernel.sigma,
        );
    }
}

/// Sequential growth stage over all channels.
pub fn growth_all(bank: &KernelBank, potentials: &[Vec<f64>], growth_fields: &mut [Vec<f64>]) {
    for (c, field) in growth_fields.iter_mut().enumerate() {
        channel_growth_chunk(bank, potentials, c, 0, field);
    }
}
