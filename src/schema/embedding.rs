//! Parameter embedding types.
//!
//! With embedding, the growth and saturation parameters live in every cell
//! instead of in the global configuration. They travel with the mass during
//! reintegration and blend where mass from different sources lands in the
//! same cell, which lets several species with different rules share a grid.

use serde::{Deserialize, Serialize};

use crate::compute::GridShape;

use super::seed::{check_radius, for_each_displacement, min_extent, resolve_center};
use super::{ConfigError, FlowParams, SeedError, SimulationConfig};

/// Growth and saturation parameters carried by one cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellParams {
    /// Growth function optimal potential.
    pub mu: f64,
    /// Growth function tolerance around `mu`.
    pub sigma: f64,
    /// Multiplier on the cell's growth response.
    pub weight: f64,
    /// Critical mass for the saturation term.
    pub beta_a: f64,
    /// Exponent of the saturation curve.
    pub n: f64,
}

impl Default for CellParams {
    fn default() -> Self {
        Self {
            mu: 0.15,
            sigma: 0.015,
            weight: 1.0,
            beta_a: 1.0,
            n: 2.0,
        }
    }
}

impl CellParams {
    pub const ZERO: Self = Self {
        mu: 0.0,
        sigma: 0.0,
        weight: 0.0,
        beta_a: 0.0,
        n: 0.0,
    };

    /// Parameters that reproduce the global rules for `channel`.
    ///
    /// Growth comes from the first kernel targeting the channel (or the
    /// first kernel at all), saturation from the flow parameters. The weight
    /// is 1 because kernels are already normalized to their own weight.
    pub fn for_channel(config: &SimulationConfig, channel: usize) -> Self {
        let kernel = config
            .kernels
            .iter()
            .find(|k| k.target_channel == channel)
            .or_else(|| config.kernels.first());
        let defaults = Self::default();
        Self {
            mu: kernel.map_or(defaults.mu, |k| k.mu),
            sigma: kernel.map_or(defaults.sigma, |k| k.sigma),
            weight: 1.0,
            beta_a: config.flow.beta_a,
            n: config.flow.n,
        }
    }

    /// Saturation parameters of this cell.
    #[inline]
    pub fn flow_params(&self, distribution_size: f64) -> FlowParams {
        FlowParams {
            beta_a: self.beta_a,
            n: self.n,
            distribution_size,
        }
    }

    /// `self + other * scale`, field by field.
    #[inline]
    pub fn add_scaled(&mut self, other: &CellParams, scale: f64) {
        self.mu += other.mu * scale;
        self.sigma += other.sigma * scale;
        self.weight += other.weight * scale;
        self.beta_a += other.beta_a * scale;
        self.n += other.n * scale;
    }

    #[inline]
    pub fn scaled(&self, scale: f64) -> Self {
        let mut out = Self::ZERO;
        out.add_scaled(self, scale);
        out
    }

    pub fn validate(&self) -> Result<(), EmbeddingError> {
        if !self.mu.is_finite() {
            return Err(EmbeddingError::InvalidParams("mu must be finite"));
        }
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(EmbeddingError::InvalidParams("sigma must be positive"));
        }
        if !self.weight.is_finite() {
            return Err(EmbeddingError::InvalidParams("weight must be finite"));
        }
        if !(self.beta_a.is_finite() && self.beta_a > 0.0) {
            return Err(EmbeddingError::InvalidParams("beta_a must be positive"));
        }
        if !(self.n.is_finite() && self.n > 0.0) {
            return Err(EmbeddingError::InvalidParams("n must be positive"));
        }
        Ok(())
    }

    /// Softmax blend of `(params, mass)` contributions.
    ///
    /// Lower temperatures favor the heaviest contribution; higher ones tend
    /// towards a plain average.
    pub fn mix_softmax(sources: &[(CellParams, f64)], temperature: f64) -> Option<Self> {
        let peak = sources
            .iter()
            .map(|&(_, m)| m)
            .fold(f64::NEG_INFINITY, f64::max);
        let mut mixed = Self::ZERO;
        let mut total = 0.0;
        for (params, mass) in sources {
            let w = ((mass - peak) / temperature).exp();
            mixed.add_scaled(params, w);
            total += w;
        }
        (total > 0.0 && total.is_finite()).then(|| mixed.scaled(1.0 / total))
    }

    /// Mass-proportional blend of `(params, mass)` contributions.
    pub fn mix_linear(sources: &[(CellParams, f64)]) -> Option<Self> {
        let mut mixed = Self::ZERO;
        let mut total = 0.0;
        for (params, mass) in sources {
            mixed.add_scaled(params, *mass);
            total += mass;
        }
        (total > 0.0 && total.is_finite()).then(|| mixed.scaled(1.0 / total))
    }
}

/// How parameters blend when mass from several cells lands in one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Mixing {
    /// Softmax over the incoming mass contributions.
    Softmax { temperature: f64 },
    /// Weighted by incoming mass.
    Linear,
    /// The largest contribution wins; ties go to the earliest source cell.
    Dominant,
}

impl Default for Mixing {
    fn default() -> Self {
        Mixing::Softmax { temperature: 1.0 }
    }
}

/// Parameter embedding settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Carry parameters with the mass. When false they stay where they are.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub mixing: Mixing,
}

fn default_enabled() -> bool {
    true
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mixing: Mixing::default(),
        }
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), EmbeddingError> {
        if let Mixing::Softmax { temperature } = self.mixing {
            if !(temperature.is_finite() && temperature > 0.0) {
                return Err(EmbeddingError::InvalidMixing(
                    "softmax temperature must be positive",
                ));
            }
        }
        Ok(())
    }
}

/// A species: parameters painted over a spherical region of one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesSpec {
    pub name: String,
    pub params: CellParams,
    /// Region center, normalized to [0, 1] per axis.
    pub center: Vec<f64>,
    /// Region radius as a fraction of the smallest grid extent.
    pub radius: f64,
}

impl SpeciesSpec {
    /// Write `self.params` into every cell of `field` inside the region.
    pub(crate) fn paint(&self, field: &mut [CellParams], shape: GridShape) -> Result<(), EmbeddingError> {
        self.params.validate()?;
        let center = resolve_center(&self.center, shape)?;
        check_radius(self.radius)?;
        let radius = self.radius * min_extent(shape);

        for_each_displacement(field, shape, center, |cell, [dx, dy, dz]| {
            if (dx * dx + dy * dy + dz * dz).sqrt() <= radius {
                *cell = self.params;
            }
        });
        Ok(())
    }
}

/// Parameter embedding errors.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Invalid mixing: {0}")]
    InvalidMixing(&'static str),
    #[error("Invalid cell parameters: {0}")]
    InvalidParams(&'static str),
    #[error("Channel {channel} is out of range ({channels} channels)")]
    ChannelOutOfRange { channel: usize, channels: usize },
    #[error("Parameter field has {got} cells, expected {expected}")]
    LengthMismatch { got: usize, expected: usize },
    #[error("Invalid species region: {0}")]
    Region(#[from] SeedError),
}
