//! Configuration types for Flow Lenia simulation parameters.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::compute::{GridShape, profile_sums};

/// Default depth for 2D grids.
fn default_depth() -> usize {
    1
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Grid width in cells (X dimension).
    pub width: usize,
    /// Grid height in cells (Y dimension).
    pub height: usize,
    /// Grid depth in cells (Z dimension). Use 1 for 2D simulations.
    #[serde(default = "default_depth")]
    pub depth: usize,
    /// Number of channels (species).
    pub channels: usize,
    /// Time step size (typically 0.1-0.5).
    pub dt: f64,
    /// Kernel cutoff radius in cells.
    pub kernel_radius: f64,
    /// Kernel specifications, applied in order.
    pub kernels: Vec<KernelSpec>,
    /// Flow/mass conservation parameters.
    pub flow: FlowParams,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            depth: 1,
            channels: 1,
            dt: 0.2,
            kernel_radius: 13.0,
            kernels: vec![KernelSpec::default()],
            flow: FlowParams::default(),
        }
    }
}

/// A single kernel: radial ring profile plus growth parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelSpec {
    /// Relative radius (0.0-1.0) scaled by the global `kernel_radius`.
    pub radius: f64,
    /// Gaussian rings defining the radial profile.
    pub rings: Vec<RingSpec>,
    /// Value the sampled kernel sums to.
    pub weight: f64,
    /// Growth function: optimal potential.
    pub mu: f64,
    /// Growth function: tolerance around `mu`.
    pub sigma: f64,
    /// Channel the kernel reads from.
    pub source_channel: usize,
    /// Channel whose growth field receives the contribution.
    pub target_channel: usize,
}

impl Default for KernelSpec {
    fn default() -> Self {
        Self {
            radius: 1.0,
            rings: vec![RingSpec::default()],
            weight: 1.0,
            mu: 0.15,
            sigma: 0.015,
            source_channel: 0,
            target_channel: 0,
        }
    }
}

/// One Gaussian bump of a kernel's radial profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingSpec {
    /// Peak height of the bump.
    pub amplitude: f64,
    /// Bump center as a fraction of the kernel radius.
    pub distance: f64,
    /// Bump width as a fraction of the kernel radius.
    pub width: f64,
}

impl Default for RingSpec {
    fn default() -> Self {
        Self {
            amplitude: 1.0,
            distance: 0.5,
            width: 0.15,
        }
    }
}

/// Flow field and density saturation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowParams {
    /// Critical mass scale for the saturation term.
    pub beta_a: f64,
    /// Power of the saturation curve.
    pub n: f64,
    /// Footprint scale multiplying `beta_a`; together they give the density
    /// at which alpha reaches 1.
    pub distribution_size: f64,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self {
            beta_a: 2.0,
            n: 2.0,
            distribution_size: 0.5,
        }
    }
}

impl FlowParams {
    /// Density at which the saturation term reaches 1.
    #[inline]
    pub fn saturation_mass(&self) -> f64 {
        self.beta_a * self.distribution_size
    }
}

impl SimulationConfig {
    /// Parse and validate a configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Check if this is a 3D simulation (depth > 1).
    #[inline]
    pub fn is_3d(&self) -> bool {
        self.depth > 1
    }

    /// Grid shape described by this configuration.
    #[inline]
    pub fn grid_shape(&self) -> GridShape {
        GridShape::new(self.width, self.height, self.depth)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 || self.depth == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.channels == 0 {
            return Err(ConfigError::InvalidChannels);
        }
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(ConfigError::InvalidTimeStep);
        }
        if !(self.kernel_radius.is_finite() && self.kernel_radius > 0.0) {
            return Err(ConfigError::InvalidKernelRadius);
        }
        if self.kernels.is_empty() {
            return Err(ConfigError::NoKernels);
        }
        let shape = self.grid_shape();
        for (i, kernel) in self.kernels.iter().enumerate() {
            kernel
                .validate(self.kernel_radius)
                .map_err(|reason| ConfigError::InvalidKernelSpec { kernel: i, reason })?;
            for channel in [kernel.source_channel, kernel.target_channel] {
                if channel >= self.channels {
                    return Err(ConfigError::InvalidChannelIndex { kernel: i, channel });
                }
            }
            if !profile_sums(kernel, self.kernel_radius, shape).is_normalizable() {
                return Err(ConfigError::InvalidKernelSpec {
                    kernel: i,
                    reason: "sampled ring profile sums to zero on this grid",
                });
            }
        }
        self.flow.validate().map_err(ConfigError::InvalidFlowParams)?;
        Ok(())
    }
}

impl KernelSpec {
    /// Radius of the kernel support in cells.
    #[inline]
    pub fn cell_radius(&self, kernel_radius: f64) -> f64 {
        self.radius * kernel_radius
    }

    fn validate(&self, kernel_radius: f64) -> Result<(), &'static str> {
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err("radius must be positive");
        }
        if self.cell_radius(kernel_radius) < 1.0 {
            return Err("radius must cover at least one cell");
        }
        if self.rings.is_empty() {
            return Err("at least one ring is required");
        }
        if !self.weight.is_finite() {
            return Err("weight must be finite");
        }
        if !self.mu.is_finite() {
            return Err("mu must be finite");
        }
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err("sigma must be positive");
        }
        for ring in &self.rings {
            if !ring.amplitude.is_finite() {
                return Err("ring amplitude must be finite");
            }
            if !(ring.distance.is_finite() && ring.distance > 0.0) {
                return Err("ring distance must be positive");
            }
            if !(ring.width.is_finite() && ring.width > 0.0) {
                return Err("ring width must be positive");
            }
        }
        Ok(())
    }
}

impl FlowParams {
    fn validate(&self) -> Result<(), &'static str> {
        if !(self.beta_a.is_finite() && self.beta_a > 0.0) {
            return Err("beta_a must be positive");
        }
        if !(self.n.is_finite() && self.n > 0.0) {
            return Err("n must be positive");
        }
        if !(self.distribution_size.is_finite() && self.distribution_size > 0.0) {
            return Err("distribution_size must be positive");
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Grid dimensions (width, height, depth) must be non-zero")]
    InvalidDimensions,
    #[error("Channel count must be non-zero")]
    InvalidChannels,
    #[error("Time step must be positive and finite")]
    InvalidTimeStep,
    #[error("Kernel radius must be positive and finite")]
    InvalidKernelRadius,
    #[error("At least one kernel is required")]
    NoKernels,
    #[error("Kernel {kernel} is invalid: {reason}")]
    InvalidKernelSpec { kernel: usize, reason: &'static str },
    #[error("Kernel {kernel} references invalid channel {channel}")]
    InvalidChannelIndex { kernel: usize, channel: usize },
    #[error("Invalid flow parameters: {0}")]
    InvalidFlowParams(&'static str),
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}
