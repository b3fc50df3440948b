//! Seed types for initializing Flow Lenia simulations.
//!
//! Shapes are measured on the torus: a pattern near an edge continues on the
//! opposite side, so moving a center by whole cells moves the generated
//! pattern by exactly the same number of cells.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::compute::GridShape;

/// Complete seed specification for simulation initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seed {
    /// Pattern to use for seeding.
    pub pattern: Pattern,
}

impl Default for Seed {
    fn default() -> Self {
        Self {
            pattern: Pattern::GaussianBlob {
                center: vec![0.5, 0.5],
                radius: 0.1,
                amplitude: 1.0,
                channel: 0,
            },
        }
    }
}

/// Predefined patterns for initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Pattern {
    /// Single Gaussian blob.
    GaussianBlob {
        /// Center position as fraction of grid size (0.0-1.0) per axis.
        center: Vec<f64>,
        /// Radius as fraction of the smallest grid extent.
        radius: f64,
        /// Peak amplitude.
        amplitude: f64,
        /// Target channel.
        channel: usize,
    },
    /// Multiple Gaussian blobs.
    MultiBlob {
        /// List of blob specifications.
        blobs: Vec<BlobSpec>,
    },
    /// Solid disc (2D) or ball (3D) with a soft rim.
    Sphere {
        center: Vec<f64>,
        radius: f64,
        amplitude: f64,
        channel: usize,
    },
    /// Torus around the Z axis; an annulus on 2D grids.
    Torus {
        center: Vec<f64>,
        /// Distance from the center to the tube center, as a fraction.
        major_radius: f64,
        /// Tube radius, as a fraction.
        minor_radius: f64,
        amplitude: f64,
        channel: usize,
    },
    /// Uniform random noise.
    Noise {
        /// Noise amplitude range [0, amplitude].
        amplitude: f64,
        /// Optional channel (None = all channels).
        channel: Option<usize>,
        /// Random seed.
        seed: u64,
    },
    /// Explicit cell values.
    Custom { values: Vec<CustomValue> },
}

/// Specification for a single blob in MultiBlob pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobSpec {
    pub center: Vec<f64>,
    pub radius: f64,
    pub amplitude: f64,
    pub channel: usize,
}

/// One explicitly set cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomValue {
    /// Integer cell coordinates, one per grid axis.
    pub position: Vec<usize>,
    pub channel: usize,
    pub value: f64,
}

/// Seed validation errors. A failing seed never touches simulation state.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("Pattern targets channel {channel} but the grid has {channels} channels")]
    ChannelOutOfRange { channel: usize, channels: usize },
    #[error("Center has {got} coordinates, expected {expected}")]
    CenterDimension { got: usize, expected: usize },
    #[error("Invalid pattern parameter: {0}")]
    InvalidParameter(&'static str),
    #[error("Custom position {position:?} is outside the grid")]
    PositionOutOfRange { position: Vec<usize> },
    #[error("Failed to parse seed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Failed to read seed: {0}")]
    Io(#[from] std::io::Error),
}

impl Seed {
    /// Parse a seed from JSON.
    pub fn from_json(json: &str) -> Result<Self, SeedError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a seed file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Check every parameter of the pattern against the grid.
    pub fn validate(&self, shape: GridShape, channels: usize) -> Result<(), SeedError> {
        let check_channel = |channel: usize| {
            if channel < channels {
                Ok(())
            } else {
                Err(SeedError::ChannelOutOfRange { channel, channels })
            }
        };

        match &self.pattern {
            Pattern::GaussianBlob {
                center,
                radius,
                amplitude,
                channel,
            }
            | Pattern::Sphere {
                center,
                radius,
                amplitude,
                channel,
            } => {
                check_channel(*channel)?;
                resolve_center(center, shape)?;
                check_radius(*radius)?;
                check_amplitude(*amplitude)?;
            }
            Pattern::MultiBlob { blobs } => {
                for blob in blobs {
                    check_channel(blob.channel)?;
                    resolve_center(&blob.center, shape)?;
                    check_radius(blob.radius)?;
                    check_amplitude(blob.amplitude)?;
                }
            }
            Pattern::Torus {
                center,
                major_radius,
                minor_radius,
                amplitude,
                channel,
            } => {
                check_channel(*channel)?;
                resolve_center(center, shape)?;
                check_radius(*major_radius)?;
                check_radius(*minor_radius)?;
                check_amplitude(*amplitude)?;
            }
            Pattern::Noise {
                amplitude, channel, ..
            } => {
                if let Some(c) = channel {
                    check_channel(*c)?;
                }
                check_amplitude(*amplitude)?;
            }
            Pattern::Custom { values } => {
                for v in values {
                    check_channel(v.channel)?;
                    if !v.value.is_finite() {
                        return Err(SeedError::InvalidParameter("custom value must be finite"));
                    }
                    let extents = shape.extents();
                    let in_range = v.position.len() == shape.ndim()
                        && v.position.iter().zip(extents).all(|(&p, e)| p < e);
                    if !in_range {
                        return Err(SeedError::PositionOutOfRange {
                            position: v.position.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Generate initial channel grids from seed.
    ///
    /// Validates first; on error nothing is generated.
    pub fn generate(&self, shape: GridShape, channels: usize) -> Result<Vec<Vec<f64>>, SeedError> {
        self.validate(shape, channels)?;
        let mut grid = vec![vec![0.0f64; shape.len()]; channels];

        match &self.pattern {
            Pattern::GaussianBlob {
                center,
                radius,
                amplitude,
                channel,
            } => {
                let c = resolve_center(center, shape)?;
                let r = radius * min_extent(shape);
                apply_gaussian(&mut grid[*channel], shape, c, r, *amplitude);
            }
            Pattern::MultiBlob { blobs } => {
                for blob in blobs {
                    let c = resolve_center(&blob.center, shape)?;
                    let r = blob.radius * min_extent(shape);
                    apply_gaussian(&mut grid[blob.channel], shape, c, r, blob.amplitude);
                }
            }
            Pattern::Sphere {
                center,
                radius,
                amplitude,
                channel,
            } => {
                let c = resolve_center(center, shape)?;
                let r = radius * min_extent(shape);
                apply_sphere(&mut grid[*channel], shape, c, r, *amplitude);
            }
            Pattern::Torus {
                center,
                major_radius,
                minor_radius,
                amplitude,
                channel,
            } => {
                let c = resolve_center(center, shape)?;
                let min_dim = min_extent(shape);
                apply_torus(
                    &mut grid[*channel],
                    shape,
                    c,
                    major_radius * min_dim,
                    minor_radius * min_dim,
                    *amplitude,
                );
            }
            Pattern::Noise {
                amplitude,
                channel,
                seed,
            } => {
                apply_noise(&mut grid, *channel, *amplitude, *seed);
            }
            Pattern::Custom { values } => {
                for v in values {
                    let z = v.position.get(2).copied().unwrap_or(0);
                    grid[v.channel][shape.index(v.position[0], v.position[1], z)] = v.value;
                }
            }
        }

        Ok(grid)
    }
}

pub(crate) fn check_radius(radius: f64) -> Result<(), SeedError> {
    if radius.is_finite() && radius > 0.0 {
        Ok(())
    } else {
        Err(SeedError::InvalidParameter("radius must be positive"))
    }
}

fn check_amplitude(amplitude: f64) -> Result<(), SeedError> {
    if amplitude.is_finite() {
        Ok(())
    } else {
        Err(SeedError::InvalidParameter("amplitude must be finite"))
    }
}

/// Center in cell units. A 2-element center on a 3D grid sits at mid-depth.
pub(crate) fn resolve_center(center: &[f64], shape: GridShape) -> Result<[f64; 3], SeedError> {
    let ndim = shape.ndim();
    let valid_len = center.len() == ndim || (ndim == 3 && center.len() == 2);
    if !valid_len {
        return Err(SeedError::CenterDimension {
            got: center.len(),
            expected: ndim,
        });
    }
    if center.iter().any(|c| !c.is_finite()) {
        return Err(SeedError::InvalidParameter("center must be finite"));
    }

    let cz = if ndim == 3 {
        center.get(2).copied().unwrap_or(0.5) * shape.depth as f64
    } else {
        0.0
    };
    Ok([
        center[0] * shape.width as f64,
        center[1] * shape.height as f64,
        cz,
    ])
}

pub(crate) fn min_extent(shape: GridShape) -> f64 {
    let planar = shape.width.min(shape.height);
    let min = if shape.ndim() == 3 {
        planar.min(shape.depth)
    } else {
        planar
    };
    min as f64
}

/// Minimum-image displacement from `c` to `p` on an axis of length `size`.
#[inline]
fn periodic_delta(p: f64, c: f64, size: usize) -> f64 {
    let size = size as f64;
    let d = p - c;
    d - size * (d / size).round()
}

/// Periodic displacement of every cell from `center`, fed to `f` with the
/// cell's value.
pub(crate) fn for_each_displacement<T>(
    data: &mut [T],
    shape: GridShape,
    center: [f64; 3],
    mut f: impl FnMut(&mut T, [f64; 3]),
) {
    let is_3d = shape.ndim() == 3;
    for (idx, cell) in data.iter_mut().enumerate() {
        let [x, y, z] = shape.coords(idx);
        let dx = periodic_delta(x as f64, center[0], shape.width);
        let dy = periodic_delta(y as f64, center[1], shape.height);
        let dz = if is_3d {
            periodic_delta(z as f64, center[2], shape.depth)
        } else {
            0.0
        };
        f(cell, [dx, dy, dz]);
    }
}

fn apply_gaussian(data: &mut [f64], shape: GridShape, center: [f64; 3], radius: f64, amplitude: f64) {
    let sigma_sq = (radius / 2.0).powi(2);
    for_each_displacement(data, shape, center, |cell, [dx, dy, dz]| {
        let dist_sq = dx * dx + dy * dy + dz * dz;
        *cell += amplitude * (-dist_sq / (2.0 * sigma_sq)).exp();
    });
}

fn apply_sphere(data: &mut [f64], shape: GridShape, center: [f64; 3], radius: f64, amplitude: f64) {
    // Linear falloff over the outer fifth of the radius
    let edge_width = radius * 0.2;
    for_each_displacement(data, shape, center, |cell, [dx, dy, dz]| {
        let dist = (dx * dx + dy * dy + dz * dz).sqrt();
        if dist <= radius {
            let falloff = ((radius - dist) / edge_width).min(1.0);
            *cell += amplitude * falloff;
        }
    });
}

fn apply_torus(
    data: &mut [f64],
    shape: GridShape,
    center: [f64; 3],
    major_radius: f64,
    minor_radius: f64,
    amplitude: f64,
) {
    let edge_width = minor_radius * 0.2;
    for_each_displacement(data, shape, center, |cell, [dx, dy, dz]| {
        let radial = (dx * dx + dy * dy).sqrt() - major_radius;
        let tube_dist = (radial * radial + dz * dz).sqrt();
        if tube_dist <= minor_radius {
            let falloff = ((minor_radius - tube_dist) / edge_width).min(1.0);
            *cell += amplitude * falloff;
        }
    });
}

fn apply_noise(grid: &mut [Vec<f64>], channel: Option<usize>, amplitude: f64, seed: u64) {
    // Simple LCG PRNG for deterministic noise
    let mut state = seed;
    let mut lcg_next = || -> f64 {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 11) as f64 / (1u64 << 53) as f64
    };

    let channel_range = match channel {
        Some(c) => c..c + 1,
        None => 0..grid.len(),
    };

    for c in channel_range {
        for cell in grid[c].iter_mut() {
            *cell += amplitude * lcg_next();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(center: Vec<f64>, channel: usize) -> Seed {
        Seed {
            pattern: Pattern::GaussianBlob {
                center,
                radius: 0.15,
                amplitude: 1.0,
                channel,
            },
        }
    }

    #[test]
    fn test_blob_peak_at_center() {
        let shape = GridShape::new_2d(64, 64);
        let grid = blob(vec![0.5, 0.5], 0).generate(shape, 1).unwrap();
        let peak = grid[0][shape.index(32, 32, 0)];
        assert!((peak - 1.0).abs() < 1e-12);
        assert!(grid[0].iter().all(|&v| v <= peak));
    }

    #[test]
    fn test_blob_translation_is_exact() {
        // Moving the center by whole cells moves the pattern, wrapping at edges
        let shape = GridShape::new_2d(32, 24);
        let centered = blob(vec![16.0 / 32.0, 12.0 / 24.0], 0)
            .generate(shape, 1)
            .unwrap();
        let edge = blob(vec![1.0 / 32.0, 22.0 / 24.0], 0)
            .generate(shape, 1)
            .unwrap();

        for y in 0..24i64 {
            for x in 0..32i64 {
                let a = centered[0][shape.wrapped_index(x, y, 0)];
                let b = edge[0][shape.wrapped_index(x - 15, y + 10, 0)];
                assert!((a - b).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_channel_out_of_range() {
        let err = blob(vec![0.5, 0.5], 2)
            .generate(GridShape::new_2d(8, 8), 2)
            .unwrap_err();
        assert!(matches!(
            err,
            SeedError::ChannelOutOfRange {
                channel: 2,
                channels: 2
            }
        ));
    }

    #[test]
    fn test_multiblob_validates_every_blob() {
        let seed = Seed {
            pattern: Pattern::MultiBlob {
                blobs: vec![
                    BlobSpec {
                        center: vec![0.3, 0.5],
                        radius: 0.1,
                        amplitude: 1.0,
                        channel: 0,
                    },
                    BlobSpec {
                        center: vec![0.7, 0.5],
                        radius: 0.1,
                        amplitude: 2.0,
                        channel: 5,
                    },
                ],
            },
        };
        assert!(seed.validate(GridShape::new_2d(16, 16), 2).is_err());
    }

    #[test]
    fn test_center_dimension() {
        let shape_2d = GridShape::new_2d(8, 8);
        let shape_3d = GridShape::new(8, 8, 8);
        assert!(matches!(
            blob(vec![0.5], 0).validate(shape_2d, 1),
            Err(SeedError::CenterDimension {
                got: 1,
                expected: 2
            })
        ));
        assert!(blob(vec![0.5, 0.5, 0.5], 0).validate(shape_2d, 1).is_err());
        assert!(blob(vec![0.5, 0.5], 0).validate(shape_3d, 1).is_ok());
        assert!(blob(vec![0.5, 0.5, 0.25], 0).validate(shape_3d, 1).is_ok());
    }

    #[test]
    fn test_sphere_and_torus_3d() {
        let shape = GridShape::new(24, 24, 24);
        let sphere = Seed {
            pattern: Pattern::Sphere {
                center: vec![0.5, 0.5, 0.5],
                radius: 0.25,
                amplitude: 1.0,
                channel: 0,
            },
        }
        .generate(shape, 1)
        .unwrap();
        assert_eq!(sphere[0][shape.index(12, 12, 12)], 1.0);
        assert_eq!(sphere[0][shape.index(0, 0, 0)], 0.0);

        let torus = Seed {
            pattern: Pattern::Torus {
                center: vec![0.5, 0.5, 0.5],
                major_radius: 0.25,
                minor_radius: 0.1,
                amplitude: 1.0,
                channel: 0,
            },
        }
        .generate(shape, 1)
        .unwrap();
        // Hole in the middle, mass on the tube
        assert_eq!(torus[0][shape.index(12, 12, 12)], 0.0);
        assert!(torus[0][shape.index(18, 12, 12)] > 0.0);
        assert_eq!(torus[0][shape.index(18, 12, 18)], 0.0);
    }

    #[test]
    fn test_torus_2d_is_annulus() {
        let shape = GridShape::new_2d(32, 32);
        let grid = Seed {
            pattern: Pattern::Torus {
                center: vec![0.5, 0.5],
                major_radius: 0.25,
                minor_radius: 0.1,
                amplitude: 2.0,
                channel: 0,
            },
        }
        .generate(shape, 1)
        .unwrap();
        assert_eq!(grid[0][shape.index(16, 16, 0)], 0.0);
        assert_eq!(grid[0][shape.index(24, 16, 0)], 2.0);
    }

    #[test]
    fn test_noise_deterministic() {
        let seed = Seed {
            pattern: Pattern::Noise {
                amplitude: 0.5,
                channel: None,
                seed: 42,
            },
        };
        let shape = GridShape::new_2d(8, 8);
        let a = seed.generate(shape, 2).unwrap();
        let b = seed.generate(shape, 2).unwrap();
        assert_eq!(a, b);
        assert!(a.iter().flatten().all(|&v| (0.0..0.5).contains(&v)));
    }

    #[test]
    fn test_custom_values() {
        let shape = GridShape::new(4, 4, 2);
        let seed = Seed {
            pattern: Pattern::Custom {
                values: vec![CustomValue {
                    position: vec![1, 2, 1],
                    channel: 0,
                    value: 3.0,
                }],
            },
        };
        let grid = seed.generate(shape, 1).unwrap();
        assert_eq!(grid[0][shape.index(1, 2, 1)], 3.0);
        assert_eq!(grid[0].iter().sum::<f64>(), 3.0);

        let outside = Seed {
            pattern: Pattern::Custom {
                values: vec![CustomValue {
                    position: vec![4, 0, 0],
                    channel: 0,
                    value: 1.0,
                }],
            },
        };
        assert!(matches!(
            outside.validate(shape, 1),
            Err(SeedError::PositionOutOfRange { .. })
        ));
    }

    #[test]
    fn test_seed_json() {
        let json = r#"{"pattern": {"type": "GaussianBlob", "center": [0.5, 0.5],
                        "radius": 0.15, "amplitude": 1.0, "channel": 0}}"#;
        let seed = Seed::from_json(json).unwrap();
        assert_eq!(seed, blob(vec![0.5, 0.5], 0));

        let bad = r#"{"pattern": {"type": "Pyramid", "center": [0.5, 0.5]}}"#;
        assert!(matches!(Seed::from_json(bad), Err(SeedError::Parse(_))));
    }
}
