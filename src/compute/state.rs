//! Simulation state container and summary statistics.

use serde::{Deserialize, Serialize};

use super::{GridShape, total_mass, total_mass_all_channels};

/// Multi-channel density grid plus step bookkeeping.
///
/// Data is stored as one flat buffer per channel, indexed
/// `[channel][z * height * width + y * width + x]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationState {
    /// Per-channel density grids.
    pub channels: Vec<Vec<f64>>,
    /// Grid extents.
    pub shape: GridShape,
    /// Completed steps since the last seed.
    pub step: u64,
}

impl SimulationState {
    /// All-zero state.
    pub fn zeros(shape: GridShape, channels: usize) -> Self {
        Self {
            channels: vec![vec![0.0; shape.len()]; channels],
            shape,
            step: 0,
        }
    }

    /// Get total mass across all channels.
    pub fn total_mass(&self) -> f64 {
        total_mass_all_channels(&self.channels)
    }

    /// Mass of a single channel.
    pub fn channel_mass(&self, channel: usize) -> Option<f64> {
        self.channels.get(channel).map(|c| total_mass(c))
    }

    /// Write the per-cell sum over channels into `out`.
    pub fn channel_sum_into(&self, out: &mut [f64]) {
        out.fill(0.0);
        for channel in &self.channels {
            for (s, &v) in out.iter_mut().zip(channel) {
                *s += v;
            }
        }
    }

    /// True when no cell holds NaN or infinity.
    pub fn is_finite(&self) -> bool {
        self.channels.iter().flatten().all(|v| v.is_finite())
    }
}

/// Simulation statistics for monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationStats {
    pub total_mass: f64,
    pub max_value: f64,
    pub min_value: f64,
    pub mean_value: f64,
    pub active_cells: usize,
}

impl SimulationStats {
    /// Compute statistics from state.
    pub fn from_state(state: &SimulationState) -> Self {
        let mut total_mass = 0.0f64;
        let mut max_value = f64::NEG_INFINITY;
        let mut min_value = f64::INFINITY;
        let mut active_cells = 0usize;
        let mut count = 0usize;

        for channel in &state.channels {
            for &v in channel {
                total_mass += v;
                max_value = max_value.max(v);
                min_value = min_value.min(v);
                if v > 1e-6 {
                    active_cells += 1;
                }
                count += 1;
            }
        }

        Self {
            total_mass,
            max_value,
            min_value,
            mean_value: if count > 0 { total_mass / count as f64 } else { 0.0 },
            active_cells,
        }
    }
}
