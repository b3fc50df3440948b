//! Kernel generation and the frequency-domain kernel bank.
//!
//! Kernels are sums of concentric Gaussian rings (shells in 3D), sampled
//! directly on the periodic grid so their transform can be reused every step.

use log::debug;
use num_complex::Complex;

use crate::schema::{KernelSpec, SimulationConfig};

use super::{FftPlan, GridShape, periodic_offset};

/// Radial profile of a kernel at normalized distance `r` (1.0 = kernel edge).
#[inline]
pub fn ring_profile(spec: &KernelSpec, r: f64) -> f64 {
    spec.rings
        .iter()
        .map(|ring| {
            let z = (r - ring.distance) / ring.width;
            ring.amplitude * (-0.5 * z * z).exp()
        })
        .sum()
}

/// A kernel sampled on the full grid, origin at cell 0 with periodic wrap.
#[derive(Debug, Clone)]
pub struct SpatialKernel {
    /// Kernel values, row-major over the grid.
    pub data: Vec<f64>,
    /// Support radius in cells.
    pub cell_radius: f64,
}

/// Signed and absolute sums of a kernel's raw profile over a grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileSums {
    pub signed: f64,
    pub magnitude: f64,
}

impl ProfileSums {
    /// Whether the profile can be rescaled to a target weight. Profiles whose
    /// rings cancel to within rounding of their magnitude cannot.
    pub fn is_normalizable(&self) -> bool {
        self.signed.is_finite()
            && self.magnitude.is_finite()
            && self.magnitude > 0.0
            && self.signed.abs() > 1e-9 * self.magnitude
    }
}

/// Visit every cell inside the kernel support with its raw profile value.
fn for_each_sample(
    spec: &KernelSpec,
    kernel_radius: f64,
    shape: GridShape,
    mut visit: impl FnMut(usize, f64),
) {
    let cell_radius = spec.cell_radius(kernel_radius);
    for idx in 0..shape.len() {
        let [x, y, z] = shape.coords(idx);
        let dx = periodic_offset(x, shape.width) as f64;
        let dy = periodic_offset(y, shape.height) as f64;
        let dz = periodic_offset(z, shape.depth) as f64;
        let dist = (dx * dx + dy * dy + dz * dz).sqrt();

        let r = dist / cell_radius;
        if r > 1.0 {
            continue;
        }
        visit(idx, ring_profile(spec, r));
    }
}

/// Sum the unnormalized profile of `spec` as it would be sampled on `shape`.
pub fn profile_sums(spec: &KernelSpec, kernel_radius: f64, shape: GridShape) -> ProfileSums {
    let mut sums = ProfileSums {
        signed: 0.0,
        magnitude: 0.0,
    };
    for_each_sample(spec, kernel_radius, shape, |_, value| {
        sums.signed += value;
        sums.magnitude += value.abs();
    });
    sums
}

impl SpatialKernel {
    /// Sample `spec` on `shape`, scaled so the values sum to `spec.weight`.
    ///
    /// Configurations are validated against [`profile_sums`], so the raw sum
    /// is non-zero for any kernel that reaches here through a propagator.
    pub fn sample(spec: &KernelSpec, kernel_radius: f64, shape: GridShape) -> Self {
        let mut data = vec![0.0f64; shape.len()];
        let mut sum = 0.0f64;

        for_each_sample(spec, kernel_radius, shape, |idx, value| {
            data[idx] = value;
            sum += value;
        });

        if sum != 0.0 {
            let scale = spec.weight / sum;
            for v in &mut data {
                *v *= scale;
            }
        }

        Self {
            data,
            cell_radius: spec.cell_radius(kernel_radius),
        }
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }
}

/// Precomputed kernel in frequency domain plus the parameters the pipeline
/// needs alongside it.
#[derive(Clone)]
pub struct PrecomputedKernel {
    pub spectrum: Vec<Complex<f64>>,
    pub source_channel: usize,
    pub target_channel: usize,
    pub weight: f64,
    pub mu: f64,
    pub sigma: f64,
}

/// Cache key: everything a precomputed kernel depends on.
#[derive(Debug, Clone, PartialEq)]
struct BankKey {
    shape: GridShape,
    kernel_radius: f64,
    specs: Vec<KernelSpec>,
}

/// Frequency-domain kernels for one grid shape, with the FFT plans used to
/// build and apply them.
pub struct KernelBank {
    key: BankKey,
    plan: FftPlan,
    kernels: Vec<PrecomputedKernel>,
    generation: u64,
}

impl KernelBank {
    /// Build all kernels described by `config`.
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.grid_shape(), &config.kernels, config.kernel_radius)
    }

    pub fn new(shape: GridShape, specs: &[KernelSpec], kernel_radius: f64) -> Self {
        let key = BankKey {
            shape,
            kernel_radius,
            specs: specs.to_vec(),
        };
        let plan = FftPlan::new(shape);
        let kernels = build_kernels(&plan, &key);
        Self {
            key,
            plan,
            kernels,
            generation: 0,
        }
    }

    /// Make the bank match `shape`/`specs`, rebuilding only if either changed.
    ///
    /// Returns true when a rebuild happened.
    pub fn ensure(&mut self, shape: GridShape, specs: &[KernelSpec], kernel_radius: f64) -> bool {
        if self.key.shape == shape
            && self.key.kernel_radius == kernel_radius
            && self.key.specs == specs
        {
            debug!("kernel bank cache hit for {:?}", shape);
            return false;
        }

        if self.key.shape != shape {
            self.plan = FftPlan::new(shape);
        }
        self.key = BankKey {
            shape,
            kernel_radius,
            specs: specs.to_vec(),
        };
        self.kernels = build_kernels(&self.plan, &self.key);
        self.generation += 1;
        true
    }

    pub fn shape(&self) -> GridShape {
        self.key.shape
    }

    pub fn plan(&self) -> &FftPlan {
        &self.plan
    }

    pub fn kernels(&self) -> &[PrecomputedKernel] {
        &self.kernels
    }

    /// Number of rebuilds since construction.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Spatial samples of kernel `idx`, rebuilt from its spec.
    pub fn spatial(&self, idx: usize) -> Option<SpatialKernel> {
        self.key
            .specs
            .get(idx)
            .map(|spec| SpatialKernel::sample(spec, self.key.kernel_radius, self.key.shape))
    }
}

fn build_kernels(plan: &FftPlan, key: &BankKey) -> Vec<PrecomputedKernel> {
    debug!(
        "building {} kernels for {}x{}x{} grid",
        key.specs.len(),
        key.shape.width,
        key.shape.height,
        key.shape.depth
    );

    let mut scratch = plan.scratch();
    key.specs
        .iter()
        .map(|spec| {
            let spatial = SpatialKernel::sample(spec, key.kernel_radius, key.shape);
            let mut spectrum = vec![Complex::new(0.0, 0.0); key.shape.len()];
            plan.forward_real(&spatial.data, &mut spectrum, &mut scratch);

            PrecomputedKernel {
                spectrum,
                source_channel: spec.source_channel,
                target_channel: spec.target_channel,
                weight: spec.weight,
                mu: spec.mu,
                sigma: spec.sigma,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RingSpec;

    fn spec(weight: f64) -> KernelSpec {
        KernelSpec {
            radius: 1.0,
            rings: vec![RingSpec {
                amplitude: 1.0,
                distance: 0.5,
                width: 0.15,
            }],
            weight,
            ..Default::default()
        }
    }

    #[test]
    fn test_kernel_normalization() {
        for weight in [1.0, 0.5, 2.5] {
            let kernel = SpatialKernel::sample(&spec(weight), 10.0, GridShape::new_2d(64, 64));
            assert!(
                (kernel.sum() - weight).abs() < 1e-9,
                "Kernel sum: {} (weight {})",
                kernel.sum(),
                weight
            );
        }
    }

    #[test]
    fn test_profile_sums() {
        let shape = GridShape::new_2d(64, 64);
        let sums = profile_sums(&spec(1.0), 10.0, shape);
        assert!(sums.is_normalizable());
        assert!((sums.signed - sums.magnitude).abs() < 1e-12);

        let silent = KernelSpec {
            rings: vec![RingSpec {
                amplitude: 0.0,
                distance: 0.5,
                width: 0.15,
            }],
            ..spec(1.0)
        };
        assert!(!profile_sums(&silent, 10.0, shape).is_normalizable());

        let ring = spec(1.0).rings[0].clone();
        let cancelling = KernelSpec {
            rings: vec![
                ring.clone(),
                RingSpec {
                    amplitude: -1.0,
                    ..ring
                },
            ],
            ..spec(1.0)
        };
        assert!(!profile_sums(&cancelling, 10.0, shape).is_normalizable());
    }

    #[test]
    fn test_kernel_normalization_3d() {
        let kernel = SpatialKernel::sample(&spec(1.0), 5.0, GridShape::new(24, 24, 24));
        assert!((kernel.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_kernel_symmetry() {
        let shape = GridShape::new_2d(32, 32);
        let kernel = SpatialKernel::sample(&spec(1.0), 10.0, shape);

        for d in 1..10i64 {
            let v1 = kernel.data[shape.wrapped_index(d, 0, 0)];
            let v2 = kernel.data[shape.wrapped_index(-d, 0, 0)];
            let v3 = kernel.data[shape.wrapped_index(0, d, 0)];
            let v4 = kernel.data[shape.wrapped_index(0, -d, 0)];

            assert!((v1 - v2).abs() < 1e-12);
            assert!((v1 - v3).abs() < 1e-12);
            assert!((v1 - v4).abs() < 1e-12);
        }
    }

    #[test]
    fn test_kernel_support_is_bounded() {
        let shape = GridShape::new_2d(64, 64);
        let kernel = SpatialKernel::sample(&spec(1.0), 10.0, shape);
        assert_eq!(kernel.data[shape.wrapped_index(11, 0, 0)], 0.0);
        assert_eq!(kernel.data[shape.wrapped_index(8, 8, 0)], 0.0);
        assert!(kernel.data[shape.wrapped_index(5, 0, 0)] > 0.0);
    }

    #[test]
    fn test_ring_peak_location() {
        let s = spec(1.0);
        assert!(ring_profile(&s, 0.5) > ring_profile(&s, 0.3));
        assert!(ring_profile(&s, 0.5) > ring_profile(&s, 0.7));
        assert!((ring_profile(&s, 0.5) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_spectrum_dc_matches_weight() {
        let bank = KernelBank::new(GridShape::new_2d(32, 32), &[spec(0.75)], 6.0);
        let dc = bank.kernels()[0].spectrum[0];
        assert!((dc.re - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_bank_rebuilds_on_shape_change() {
        let specs = vec![spec(1.0)];
        let mut bank = KernelBank::new(GridShape::new_2d(32, 32), &specs, 6.0);
        assert_eq!(bank.generation(), 0);

        assert!(!bank.ensure(GridShape::new_2d(32, 32), &specs, 6.0));
        assert_eq!(bank.generation(), 0);

        assert!(bank.ensure(GridShape::new_2d(48, 32), &specs, 6.0));
        assert_eq!(bank.generation(), 1);
        assert_eq!(bank.shape(), GridShape::new_2d(48, 32));
        assert_eq!(bank.kernels()[0].spectrum.len(), 48 * 32);
        assert_eq!(bank.plan().shape(), GridShape::new_2d(48, 32));

        let mut changed = specs.clone();
        changed[0].mu = 0.2;
        assert!(bank.ensure(GridShape::new_2d(48, 32), &changed, 6.0));
        assert_eq!(bank.generation(), 2);
        assert_eq!(bank.kernels()[0].mu, 0.2);
    }
}
