//! Convolution engine: applies every kernel to its source channel.
//!
//! Each source channel is transformed once per step; each kernel then costs
//! one element-wise product and one inverse transform.

use num_complex::Complex;

use super::{FftScratch, GridShape, KernelBank};

/// Per-step buffers for the convolution stage.
pub struct ConvolutionWorkspace {
    /// Forward transform of each channel (only source channels are filled).
    pub spectra: Vec<Vec<Complex<f64>>>,
    /// Which channels are read by at least one kernel.
    pub is_source: Vec<bool>,
    /// Convolution output of each kernel, in kernel order.
    pub potentials: Vec<Vec<f64>>,
}

impl ConvolutionWorkspace {
    pub fn new(bank: &KernelBank, channels: usize) -> Self {
        let len = bank.shape().len();
        let mut is_source = vec![false; channels];
        for kernel in bank.kernels() {
            is_source[kernel.source_channel] = true;
        }
        let spectra = is_source
            .iter()
            .map(|&used| {
                if used {
                    vec![Complex::new(0.0, 0.0); len]
                } else {
                    Vec::new()
                }
            })
            .collect();

        Self {
            spectra,
            is_source,
            potentials: vec![vec![0.0; len]; bank.kernels().len()],
        }
    }
}

/// Forward-transform one channel into its spectrum slot.
#[inline]
pub fn transform_source(
    bank: &KernelBank,
    channel: &[f64],
    spectrum: &mut [Complex<f64>],
    scratch: &mut FftScratch,
) {
    bank.plan().forward_real(channel, spectrum, scratch);
}

/// Convolve kernel `kernel_idx` against its already-transformed source.
#[inline]
pub fn convolve_kernel(
    bank: &KernelBank,
    kernel_idx: usize,
    source_spectrum: &[Complex<f64>],
    output: &mut [f64],
    scratch: &mut FftScratch,
) {
    let kernel = &bank.kernels()[kernel_idx];
    bank.plan()
        .convolve_spectrum(source_spectrum, &kernel.spectrum, output, scratch);
}

/// Run the whole convolution stage sequentially with one scratch buffer.
pub fn convolve_all(
    bank: &KernelBank,
    channels: &[Vec<f64>],
    workspace: &mut ConvolutionWorkspace,
    scratch: &mut FftScratch,
) {
    for (c, channel) in channels.iter().enumerate() {
        if workspace.is_source[c] {
            transform_source(bank, channel, &mut workspace.spectra[c], scratch);
        }
    }

    for (k, output) in workspace.potentials.iter_mut().enumerate() {
        let source = bank.kernels()[k].source_channel;
        convolve_kernel(bank, k, &workspace.spectra[source], output, scratch);
    }
}

/// Perform direct periodic convolution: `output[p] = sum_o kernel[o] * input[p - o]`.
///
/// O(N * support) reference used to check the transform-domain path. Kernel
/// cells equal to zero are skipped.
pub fn convolve_direct_into(input: &[f64], kernel: &[f64], shape: GridShape, output: &mut [f64]) {
    let support: Vec<(i64, i64, i64, f64)> = kernel
        .iter()
        .enumerate()
        .filter(|&(_, &k)| k != 0.0)
        .map(|(idx, &k)| {
            let [x, y, z] = shape.coords(idx);
            (x as i64, y as i64, z as i64, k)
        })
        .collect();

    for (idx, out) in output.iter_mut().enumerate() {
        let [x, y, z] = shape.coords(idx);
        let (x, y, z) = (x as i64, y as i64, z as i64);
        *out = support
            .iter()
            .map(|&(ox, oy, oz, k)| k * input[shape.wrapped_index(x - ox, y - oy, z - oz)])
            .sum();
    }
}
