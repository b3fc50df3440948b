//! Separable multi-axis FFT for 2D and 3D periodic grids.
//!
//! Uses rustfft for O(N log N) convolution instead of O(N * K^D) direct
//! convolution. Plans are created once per grid shape and shared; all
//! per-call buffers live in an [`FftScratch`] so repeated transforms do not
//! allocate.

use std::sync::Arc;

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::GridShape;

/// Pre-allocated scratch buffers for one concurrent transform.
pub struct FftScratch {
    /// Working buffer handed to rustfft.
    fft: Vec<Complex<f64>>,
    /// Line buffer for strided axis extraction.
    line: Vec<Complex<f64>>,
    /// Frequency-domain buffer for the value being transformed.
    pub spectrum: Vec<Complex<f64>>,
}

/// Cached forward and inverse plans for every axis of a grid.
pub struct FftPlan {
    shape: GridShape,
    forward: [Arc<dyn Fft<f64>>; 3],
    inverse: [Arc<dyn Fft<f64>>; 3],
}

impl FftPlan {
    /// Plan transforms for the given grid shape.
    pub fn new(shape: GridShape) -> Self {
        let mut planner = FftPlanner::new();
        let [w, h, d] = shape.extents();
        let forward = [
            planner.plan_fft_forward(w),
            planner.plan_fft_forward(h),
            planner.plan_fft_forward(d),
        ];
        let inverse = [
            planner.plan_fft_inverse(w),
            planner.plan_fft_inverse(h),
            planner.plan_fft_inverse(d),
        ];

        Self {
            shape,
            forward,
            inverse,
        }
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    /// Allocate scratch buffers sized for this plan.
    pub fn scratch(&self) -> FftScratch {
        let fft_len = self
            .forward
            .iter()
            .chain(self.inverse.iter())
            .map(|p| p.get_inplace_scratch_len())
            .max()
            .unwrap_or(0);
        let max_dim = self.shape.extents().into_iter().max().unwrap_or(0);

        FftScratch {
            fft: vec![Complex::new(0.0, 0.0); fft_len],
            line: vec![Complex::new(0.0, 0.0); max_dim],
            spectrum: vec![Complex::new(0.0, 0.0); self.shape.len()],
        }
    }

    /// Forward transform of a real field.
    pub fn forward_real(
        &self,
        input: &[f64],
        output: &mut [Complex<f64>],
        scratch: &mut FftScratch,
    ) {
        assert_eq!(input.len(), self.shape.len());
        assert_eq!(output.len(), self.shape.len());

        for (o, &x) in output.iter_mut().zip(input) {
            *o = Complex::new(x, 0.0);
        }
        for axis in 0..3 {
            self.process_axis(output, axis, &self.forward[axis], scratch);
        }
    }

    /// Inverse transform, writing the normalized real part to `output`.
    ///
    /// `spectrum` is used as working storage and is left transformed.
    pub fn inverse_real(
        &self,
        spectrum: &mut [Complex<f64>],
        output: &mut [f64],
        scratch: &mut FftScratch,
    ) {
        assert_eq!(spectrum.len(), self.shape.len());
        assert_eq!(output.len(), self.shape.len());

        for axis in (0..3).rev() {
            self.process_axis(spectrum, axis, &self.inverse[axis], scratch);
        }

        let scale = 1.0 / self.shape.len() as f64;
        for (o, c) in output.iter_mut().zip(spectrum.iter()) {
            *o = c.re * scale;
        }
    }

    /// Multiply `source` by `kernel` element-wise and inverse transform the
    /// product into `output`. Uses `scratch.spectrum` as working storage.
    pub fn convolve_spectrum(
        &self,
        source: &[Complex<f64>],
        kernel: &[Complex<f64>],
        output: &mut [f64],
        scratch: &mut FftScratch,
    ) {
        let mut product = std::mem::take(&mut scratch.spectrum);
        for ((p, a), b) in product.iter_mut().zip(source).zip(kernel) {
            *p = a * b;
        }
        self.inverse_real(&mut product, output, scratch);
        scratch.spectrum = product;
    }

    fn process_axis(
        &self,
        data: &mut [Complex<f64>],
        axis: usize,
        plan: &Arc<dyn Fft<f64>>,
        scratch: &mut FftScratch,
    ) {
        let [w, h, d] = self.shape.extents();
        let len = [w, h, d][axis];
        // Length-one transforms are the identity.
        if len == 1 {
            return;
        }

        if axis == 0 {
            // Rows are contiguous; rustfft processes every chunk in one call.
            plan.process_with_scratch(data, &mut scratch.fft);
            return;
        }

        let stride = if axis == 1 { w } else { w * h };
        let line = &mut scratch.line[..len];
        let starts: Box<dyn Iterator<Item = usize>> = if axis == 1 {
            Box::new((0..d).flat_map(move |z| (0..w).map(move |x| z * w * h + x)))
        } else {
            Box::new(0..w * h)
        };

        for start in starts {
            for (i, v) in line.iter_mut().enumerate() {
                *v = data[start + i * stride];
            }
            plan.process_with_scratch(line, &mut scratch.fft);
            for (i, v) in line.iter().enumerate() {
                data[start + i * stride] = *v;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(shape: GridShape) {
        let plan = FftPlan::new(shape);
        let mut scratch = plan.scratch();
        let input: Vec<f64> = (0..shape.len()).map(|i| (i % 10) as f64).collect();

        let mut freq = vec![Complex::new(0.0, 0.0); shape.len()];
        plan.forward_real(&input, &mut freq, &mut scratch);
        let mut recovered = vec![0.0; shape.len()];
        plan.inverse_real(&mut freq, &mut recovered, &mut scratch);

        for (orig, rec) in input.iter().zip(recovered.iter()) {
            assert!(
                (orig - rec).abs() < 1e-9,
                "FFT roundtrip failed for {:?}: {} vs {}",
                shape,
                orig,
                rec
            );
        }
    }

    #[test]
    fn test_fft_identity_2d_sizes() {
        for &(w, h) in &[(8, 8), (16, 16), (16, 32), (32, 16), (12, 7)] {
            roundtrip(GridShape::new_2d(w, h));
        }
    }

    #[test]
    fn test_fft_identity_3d() {
        roundtrip(GridShape::new(8, 6, 4));
        roundtrip(GridShape::new(5, 5, 5));
    }

    #[test]
    fn test_dc_component_is_sum() {
        let shape = GridShape::new(6, 4, 3);
        let plan = FftPlan::new(shape);
        let mut scratch = plan.scratch();
        let input: Vec<f64> = (0..shape.len()).map(|i| (i as f64 * 0.37).sin()).collect();
        let mut freq = vec![Complex::new(0.0, 0.0); shape.len()];
        plan.forward_real(&input, &mut freq, &mut scratch);

        let sum: f64 = input.iter().sum();
        assert!((freq[0].re - sum).abs() < 1e-9);
        assert!(freq[0].im.abs() < 1e-9);
    }

    #[test]
    fn test_convolution_shift() {
        // A delta kernel at offset (3, 2) shifts the input by (3, 2) with wrapping
        let shape = GridShape::new_2d(16, 16);
        let plan = FftPlan::new(shape);
        let mut scratch = plan.scratch();

        let mut input = vec![0.0; shape.len()];
        input[shape.index(14, 5, 0)] = 1.0;
        let mut kernel = vec![0.0; shape.len()];
        kernel[shape.index(3, 2, 0)] = 1.0;

        let mut input_freq = vec![Complex::new(0.0, 0.0); shape.len()];
        let mut kernel_freq = vec![Complex::new(0.0, 0.0); shape.len()];
        plan.forward_real(&input, &mut input_freq, &mut scratch);
        plan.forward_real(&kernel, &mut kernel_freq, &mut scratch);

        let mut result = vec![0.0; shape.len()];
        plan.convolve_spectrum(&input_freq, &kernel_freq, &mut result, &mut scratch);

        let expected = shape.index(1, 7, 0);
        assert!((result[expected] - 1.0).abs() < 1e-9);
        let total: f64 = result.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}
