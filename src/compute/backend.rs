//! Execution strategies for the per-step pipeline.
//!
//! A [`ComputeBackend`] runs the data-parallel stages of a step. Backends are
//! chosen once when the propagator is built and must agree numerically up to
//! floating-point summation order.

use serde::{Deserialize, Serialize};

use crate::schema::FlowParams;

use super::{
    ConvolutionWorkspace, FftScratch, GridShape, KernelBank, Vector, compute_flow_into,
    convolve_all, growth_all, reintegrate_into, sobel_gradient_into,
};

/// Which backend to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BackendKind {
    /// Single-threaded reference implementation.
    #[default]
    Sequential,
    /// Rayon worker pool; `None` uses one thread per core.
    Parallel { threads: Option<usize> },
}

/// Backend construction failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("Thread count must be non-zero")]
    InvalidThreadCount,
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),
    #[error("Parallel execution is not available on this target")]
    Unsupported,
}

/// The stages of a step that a backend may run concurrently.
///
/// Every method fully overwrites its output before returning; nothing from a
/// previous call is observable.
pub trait ComputeBackend: Send {
    /// Short name for logs and introspection.
    fn name(&self) -> &'static str;

    /// Fill `workspace.potentials` with each kernel's convolution of its
    /// source channel.
    fn convolve(
        &mut self,
        bank: &KernelBank,
        channels: &[Vec<f64>],
        workspace: &mut ConvolutionWorkspace,
    );

    /// Sum per-kernel growth into one growth field per channel.
    fn growth(&mut self, bank: &KernelBank, potentials: &[Vec<f64>], growth_fields: &mut [Vec<f64>]);

    /// Periodic gradient of `field`.
    fn gradient(&mut self, field: &[f64], shape: GridShape, out: &mut [Vector]);

    /// Velocity from the growth and mass gradients.
    fn flow(
        &mut self,
        grad_growth: &[Vector],
        grad_mass: &[Vector],
        mass: &[f64],
        params: &FlowParams,
        out: &mut [Vector],
    );

    /// Move `current` along `flow` into `next`, which is overwritten.
    fn reintegrate(
        &mut self,
        current: &[f64],
        flow: &[Vector],
        shape: GridShape,
        dt: f64,
        next: &mut [f64],
    );
}

/// Build the backend for `kind`.
pub fn create_backend(
    kind: BackendKind,
    bank: &KernelBank,
) -> Result<Box<dyn ComputeBackend>, BackendError> {
    match kind {
        BackendKind::Sequential => Ok(Box::new(SequentialBackend::new(bank))),
        BackendKind::Parallel { threads } => {
            #[cfg(not(target_arch = "wasm32"))]
            {
                Ok(Box::new(ParallelBackend::new(bank, threads)?))
            }
            #[cfg(target_arch = "wasm32")]
            {
                let _ = threads;
                Err(BackendError::Unsupported)
            }
        }
    }
}

/// Resize `scratch` if the grid shape changed since it was allocated.
fn fit_scratch(scratch: &mut FftScratch, bank: &KernelBank) {
    if scratch.spectrum.len() != bank.shape().len() {
        *scratch = bank.plan().scratch();
    }
}

/// Single-threaded reference backend.
pub struct SequentialBackend {
    scratch: FftScratch,
}

impl SequentialBackend {
    pub fn new(bank: &KernelBank) -> Self {
        Self {
            scratch: bank.plan().scratch(),
        }
    }
}

impl ComputeBackend for SequentialBackend {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn convolve(
        &mut self,
        bank: &KernelBank,
        channels: &[Vec<f64>],
        workspace: &mut ConvolutionWorkspace,
    ) {
        fit_scratch(&mut self.scratch, bank);
        convolve_all(bank, channels, workspace, &mut self.scratch);
    }

    fn growth(&mut self, bank: &KernelBank, potentials: &[Vec<f64>], growth_fields: &mut [Vec<f64>]) {
        growth_all(bank, potentials, growth_fields);
    }

    fn gradient(&mut self, field: &[f64], shape: GridShape, out: &mut [Vector]) {
        sobel_gradient_into(field, shape, out);
    }

    fn flow(
        &mut self,
        grad_growth: &[Vector],
        grad_mass: &[Vector],
        mass: &[f64],
        params: &FlowParams,
        out: &mut [Vector],
    ) {
        compute_flow_into(grad_growth, grad_mass, mass, params, out);
    }

    fn reintegrate(
        &mut self,
        current: &[f64],
        flow: &[Vector],
        shape: GridShape,
        dt: f64,
        next: &mut [f64],
    ) {
        reintegrate_into(current, flow, shape, dt, next);
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use parallel::ParallelBackend;

#[cfg(not(target_arch = "wasm32"))]
mod parallel {
    use std::ops::Range;

    use rayon::prelude::*;

    use super::*;
    use crate::compute::{
        channel_growth_chunk, convolve_kernel, reintegrate_range, sobel_gradient_chunk,
        transform_source,
    };

    /// Cells per work item for per-cell stages.
    const CHUNK: usize = 4096;

    /// Rayon backend with its own worker pool.
    ///
    /// Reintegration gives each worker a private full-size arena; the arenas
    /// are summed in worker order once every worker has finished, so the
    /// result does not depend on scheduling.
    pub struct ParallelBackend {
        pool: rayon::ThreadPool,
        scratches: Vec<FftScratch>,
        arenas: Vec<Vec<f64>>,
    }

    impl ParallelBackend {
        pub fn new(bank: &KernelBank, threads: Option<usize>) -> Result<Self, BackendError> {
            if threads == Some(0) {
                return Err(BackendError::InvalidThreadCount);
            }
            let mut builder =
                rayon::ThreadPoolBuilder::new().thread_name(|i| format!("flow-lenia-{i}"));
            if let Some(n) = threads {
                builder = builder.num_threads(n);
            }
            let pool = builder
                .build()
                .map_err(|e| BackendError::ThreadPool(e.to_string()))?;

            let workers = pool.current_num_threads();
            let len = bank.shape().len();

            Ok(Self {
                pool,
                scratches: Vec::new(),
                arenas: vec![vec![0.0; len]; workers],
            })
        }

        /// Number of worker threads.
        pub fn threads(&self) -> usize {
            self.pool.current_num_threads()
        }

        fn fit_scratches(&mut self, bank: &KernelBank, count: usize) {
            for scratch in &mut self.scratches {
                fit_scratch(scratch, bank);
            }
            while self.scratches.len() < count {
                self.scratches.push(bank.plan().scratch());
            }
        }
    }

    /// Split the slabs of `shape` into at most `parts` contiguous cell ranges.
    pub(crate) fn slab_ranges(shape: GridShape, parts: usize) -> Vec<Range<usize>> {
        let slabs = shape.slab_count();
        let slab_len = shape.slab_len();
        let parts = parts.clamp(1, slabs);
        (0..parts)
            .map(|p| {
                let start = p * slabs / parts;
                let end = (p + 1) * slabs / parts;
                start * slab_len..end * slab_len
            })
            .collect()
    }

    impl ComputeBackend for ParallelBackend {
        fn name(&self) -> &'static str {
            "parallel"
        }

        fn convolve(
            &mut self,
            bank: &KernelBank,
            channels: &[Vec<f64>],
            workspace: &mut ConvolutionWorkspace,
        ) {
            self.fit_scratches(bank, channels.len().max(bank.kernels().len()));
            let ConvolutionWorkspace {
                spectra,
                is_source,
                potentials,
            } = workspace;
            let scratches = &mut self.scratches;

            self.pool.install(|| {
                spectra
                    .par_iter_mut()
                    .zip(channels.par_iter())
                    .zip(is_source.par_iter())
                    .zip(scratches.par_iter_mut())
                    .for_each(|(((spectrum, channel), &used), scratch)| {
                        if used {
                            transform_source(bank, channel, spectrum, scratch);
                        }
                    });

                let spectra = &*spectra;
                potentials
                    .par_iter_mut()
                    .zip(scratches.par_iter_mut())
                    .enumerate()
                    .for_each(|(k, (output, scratch))| {
                        let source = bank.kernels()[k].source_channel;
                        convolve_kernel(bank, k, &spectra[source], output, scratch);
                    });
            });
        }

        fn growth(
            &mut self,
            bank: &KernelBank,
            potentials: &[Vec<f64>],
            growth_fields: &mut [Vec<f64>],
        ) {
            self.pool.install(|| {
                growth_fields
                    .par_iter_mut()
                    .enumerate()
                    .for_each(|(c, field)| {
                        field
                            .par_chunks_mut(CHUNK)
                            .enumerate()
                            .for_each(|(i, chunk)| {
                                channel_growth_chunk(bank, potentials, c, i * CHUNK, chunk);
                            });
                    });
            });
        }

        fn gradient(&mut self, field: &[f64], shape: GridShape, out: &mut [Vector]) {
            self.pool.install(|| {
                out.par_chunks_mut(CHUNK)
                    .enumerate()
                    .for_each(|(i, chunk)| sobel_gradient_chunk(field, shape, i * CHUNK, chunk));
            });
        }

        fn flow(
            &mut self,
            grad_growth: &[Vector],
            grad_mass: &[Vector],
            mass: &[f64],
            params: &FlowParams,
            out: &mut [Vector],
        ) {
            self.pool.install(|| {
                out.par_chunks_mut(CHUNK)
                    .zip(grad_growth.par_chunks(CHUNK))
                    .zip(grad_mass.par_chunks(CHUNK))
                    .zip(mass.par_chunks(CHUNK))
                    .for_each(|(((out, gu), ga), m)| compute_flow_into(gu, ga, m, params, out));
            });
        }

        fn reintegrate(
            &mut self,
            current: &[f64],
            flow: &[Vector],
            shape: GridShape,
            dt: f64,
            next: &mut [f64],
        ) {
            let len = shape.len();
            for arena in &mut self.arenas {
                arena.resize(len, 0.0);
            }
            let ranges = slab_ranges(shape, self.arenas.len());
            let arenas = &mut self.arenas[..ranges.len()];

            self.pool.install(|| {
                arenas
                    .par_iter_mut()
                    .zip(ranges.par_iter())
                    .for_each(|(arena, range)| {
                        arena.fill(0.0);
                        reintegrate_range(current, flow, shape, dt, range.clone(), arena);
                    });

                // Barrier passed: every arena is complete. Reduce in fixed order.
                let arenas = &*arenas;
                next.par_chunks_mut(CHUNK)
                    .enumerate()
                    .for_each(|(i, chunk)| {
                        let start = i * CHUNK;
                        for (j, v) in chunk.iter_mut().enumerate() {
                            *v = arenas.iter().map(|a| a[start + j]).sum();
                        }
                    });
            });
        }
    }

}
