//! Per-cell parameter stages: embedded growth, embedded flow and
//! reintegration that carries parameters along with the mass.
//!
//! Mass moves exactly as in [`reintegrate_into`](super::reintegrate_into):
//! the same splat weights are applied in the same order, so the mass fields
//! agree bit for bit. Every non-zero splat weight is also a parameter
//! contribution `(source params, mass * weight)` to its destination, and the
//! contributions landing in one cell are blended by the configured
//! [`Mixing`] rule.

use crate::schema::{CellParams, Mixing};

use super::{GridShape, KernelBank, Vector, compute_alpha, destination, splat};

/// Growth with the target channel's per-cell parameters.
///
/// Each cell adds `weight * G(u; mu, sigma)` for every kernel feeding its
/// channel. With uniform parameters taken from a single kernel this matches
/// the global growth stage exactly.
pub fn embedded_growth_into(
    bank: &KernelBank,
    potentials: &[Vec<f64>],
    params: &[Vec<CellParams>],
    growth_fields: &mut [Vec<f64>],
) {
    for field in growth_fields.iter_mut() {
        field.fill(0.0);
    }
    for (kernel, potential) in bank.kernels().iter().zip(potentials) {
        let target = &mut growth_fields[kernel.target_channel];
        let cells = &params[kernel.target_channel];
        for ((t, &u), p) in target.iter_mut().zip(potential).zip(cells) {
            let inv_sigma_sq_2 = 1.0 / (2.0 * p.sigma * p.sigma);
            let diff = u - p.mu;
            *t += p.weight * (2.0 * (-diff * diff * inv_sigma_sq_2).exp() - 1.0);
        }
    }
}

/// Flow with per-cell saturation parameters.
pub fn compute_embedded_flow_into(
    grad_growth: &[Vector],
    grad_mass: &[Vector],
    mass: &[f64],
    params: &[CellParams],
    distribution_size: f64,
    out: &mut [Vector],
) {
    for ((((f, gu), ga), &m), p) in out
        .iter_mut()
        .zip(grad_growth)
        .zip(grad_mass)
        .zip(mass)
        .zip(params)
    {
        let alpha = compute_alpha(m, &p.flow_params(distribution_size));
        *f = [
            gu[0] - alpha * ga[0],
            gu[1] - alpha * ga[1],
            gu[2] - alpha * ga[2],
        ];
    }
}

/// Per-destination accumulators for parameter mixing.
#[derive(Debug, Clone)]
pub struct MixScratch {
    /// Largest incoming contribution (softmax shift, dominant winner).
    peak: Vec<f64>,
    /// Sum of mixing weights.
    weight: Vec<f64>,
    /// Weighted parameter sums.
    accum: Vec<CellParams>,
}

impl MixScratch {
    pub fn new(len: usize) -> Self {
        Self {
            peak: vec![f64::NEG_INFINITY; len],
            weight: vec![0.0; len],
            accum: vec![CellParams::ZERO; len],
        }
    }

    fn reset(&mut self, len: usize) {
        self.peak.clear();
        self.peak.resize(len, f64::NEG_INFINITY);
        self.weight.clear();
        self.weight.resize(len, 0.0);
        self.accum.clear();
        self.accum.resize(len, CellParams::ZERO);
    }
}

/// Occupied cells with their mass and continuous destination.
fn moving_cells<'a>(
    current: &'a [f64],
    flow: &'a [Vector],
    shape: GridShape,
    dt: f64,
) -> impl Iterator<Item = (usize, f64, [f64; 3])> + 'a {
    current
        .iter()
        .enumerate()
        .filter(|&(_, &mass)| mass != 0.0)
        .map(move |(idx, &mass)| (idx, mass, destination(shape, idx, flow[idx], dt)))
}

/// Move `current` and its parameters along `flow`.
///
/// `next` and `next_params` are overwritten. A destination that receives no
/// mass keeps the parameters it had in `params`.
#[allow(clippy::too_many_arguments)]
pub fn reintegrate_with_params(
    current: &[f64],
    params: &[CellParams],
    flow: &[Vector],
    shape: GridShape,
    dt: f64,
    mixing: Mixing,
    scratch: &mut MixScratch,
    next: &mut [f64],
    next_params: &mut [CellParams],
) {
    let len = shape.len();
    scratch.reset(len);
    next.fill(0.0);

    // Softmax shifts by the largest contribution for stability
    if let Mixing::Softmax { .. } = mixing {
        let peak = &mut scratch.peak;
        for (_, mass, dest) in moving_cells(current, flow, shape, dt) {
            splat(shape, dest, |i, w| {
                if w > 0.0 {
                    peak[i] = peak[i].max(mass * w);
                }
            });
        }
    }

    let MixScratch {
        peak,
        weight,
        accum,
    } = scratch;
    for (idx, mass, dest) in moving_cells(current, flow, shape, dt) {
        let p = &params[idx];
        splat(shape, dest, |i, w| {
            next[i] += mass * w;
            if w <= 0.0 {
                return;
            }
            let contribution = mass * w;
            match mixing {
                Mixing::Softmax { temperature } => {
                    let k = ((contribution - peak[i]) / temperature).exp();
                    accum[i].add_scaled(p, k);
                    weight[i] += k;
                }
                Mixing::Linear => {
                    accum[i].add_scaled(p, contribution);
                    weight[i] += contribution;
                }
                Mixing::Dominant => {
                    if contribution > peak[i] {
                        peak[i] = contribution;
                        accum[i] = *p;
                        weight[i] = 1.0;
                    }
                }
            }
        });
    }

    for (i, out) in next_params.iter_mut().enumerate() {
        let total = weight[i];
        *out = if total > 0.0 && total.is_finite() {
            accum[i].scaled(1.0 / total)
        } else {
            params[i]
        };
    }
}
