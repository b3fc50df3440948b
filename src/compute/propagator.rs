//! Propagator - Main simulation driver for Flow Lenia.
//!
//! Orchestrates all computation stages for each time step:
//! convolution, growth, gradients, flow and reintegration. The stages run on
//! a [`ComputeBackend`] chosen once at construction.

use log::{info, trace, warn};
use serde::{Deserialize, Serialize};

use crate::schema::{ConfigError, KernelSpec, Seed, SeedError, SimulationConfig};

use super::{
    BackendError, BackendKind, ComputeBackend, ConvolutionWorkspace, FlowStats, GridShape,
    KernelBank, SequentialBackend, SimulationState, SimulationStats, Vector, create_backend,
};

/// Recorded when the requested backend could not be built and the
/// propagator fell back to the sequential one.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendWarning {
    pub requested: BackendKind,
    pub error: BackendError,
}

/// Build the backend for `kind`, falling back to the sequential one when it
/// cannot be built.
pub(crate) fn backend_or_fallback(
    kind: BackendKind,
    bank: &KernelBank,
    warnings: &mut Vec<BackendWarning>,
) -> Box<dyn ComputeBackend> {
    match create_backend(kind, bank) {
        Ok(backend) => backend,
        Err(error) => {
            warn!("{kind:?} backend unavailable ({error}), falling back to sequential");
            warnings.push(BackendWarning {
                requested: kind,
                error,
            });
            Box::new(SequentialBackend::new(bank))
        }
    }
}

/// Summary handed to `run_while` predicates after each tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// Completed steps since the last seed.
    pub step: u64,
    /// Simulated time (`step * dt`).
    pub time: f64,
    /// Mass summed over all channels after the tick.
    pub total_mass: f64,
    /// Flow statistics of the tick, merged over channels.
    pub flow: FlowStats,
}

/// Flow Lenia propagator.
///
/// Owns the simulation state together with every buffer a step needs, so
/// stepping never allocates.
pub struct Propagator {
    config: SimulationConfig,
    shape: GridShape,
    bank: KernelBank,
    backend: Box<dyn ComputeBackend>,
    state: SimulationState,
    /// Destination buffers for reintegration, swapped with the state.
    next: Vec<Vec<f64>>,
    workspace: ConvolutionWorkspace,
    growth_fields: Vec<Vec<f64>>,
    /// Per-cell mass summed over channels.
    mass: Vec<f64>,
    grad_mass: Vec<Vector>,
    grad_growth: Vec<Vector>,
    flow: Vec<Vector>,
    flow_stats: Vec<FlowStats>,
    last_flow_stats: FlowStats,
    warnings: Vec<BackendWarning>,
}

impl Propagator {
    /// Create a sequential propagator with an all-zero state.
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        Self::with_backend(config, BackendKind::Sequential)
    }

    /// Create a propagator running on `kind`.
    ///
    /// A backend that fails to build is replaced by the sequential one; the
    /// failure is logged and kept in [`Propagator::warnings`].
    pub fn with_backend(config: SimulationConfig, kind: BackendKind) -> Result<Self, ConfigError> {
        config.validate()?;

        let shape = config.grid_shape();
        let channels = config.channels;
        let len = shape.len();
        let bank = KernelBank::from_config(&config);

        let mut warnings = Vec::new();
        let backend = backend_or_fallback(kind, &bank, &mut warnings);

        info!(
            "propagator ready: {}x{}x{} grid, {} channels, {} kernels, {} backend",
            shape.width,
            shape.height,
            shape.depth,
            channels,
            config.kernels.len(),
            backend.name()
        );

        let workspace = ConvolutionWorkspace::new(&bank, channels);

        Ok(Self {
            shape,
            bank,
            backend,
            state: SimulationState::zeros(shape, channels),
            next: vec![vec![0.0; len]; channels],
            workspace,
            growth_fields: vec![vec![0.0; len]; channels],
            mass: vec![0.0; len],
            grad_mass: vec![[0.0; 3]; len],
            grad_growth: vec![[0.0; 3]; len],
            flow: vec![[0.0; 3]; len],
            flow_stats: Vec::with_capacity(channels),
            last_flow_stats: FlowStats::default(),
            warnings,
            config,
        })
    }

    /// Replace the state with the pattern generated by `seed`.
    ///
    /// The seed is validated in full before anything is written; on error
    /// the current state and step count are untouched.
    pub fn seed(&mut self, seed: &Seed) -> Result<(), SeedError> {
        let channels = seed.generate(self.shape, self.config.channels)?;

        self.state.channels = channels;
        self.state.step = 0;
        self.last_flow_stats = FlowStats::default();

        info!(
            "seeded {:?}: total mass {:.6}",
            self.shape,
            self.state.total_mass()
        );
        Ok(())
    }

    /// Swap in a new kernel set, keeping the current state.
    ///
    /// Kernels are only rebuilt when the specs actually differ.
    pub fn set_kernels(&mut self, kernels: Vec<KernelSpec>) -> Result<(), ConfigError> {
        let candidate = SimulationConfig {
            kernels,
            ..self.config.clone()
        };
        candidate.validate()?;

        if self
            .bank
            .ensure(self.shape, &candidate.kernels, candidate.kernel_radius)
        {
            self.workspace = ConvolutionWorkspace::new(&self.bank, candidate.channels);
        }
        self.config = candidate;
        Ok(())
    }

    /// Advance the simulation by one tick.
    pub fn step(&mut self) -> StepReport {
        let shape = self.shape;
        let dt = self.config.dt;
        let params = &self.config.flow;
        let backend = self.backend.as_mut();

        // 1. Potentials and per-channel growth
        backend.convolve(&self.bank, &self.state.channels, &mut self.workspace);
        backend.growth(&self.bank, &self.workspace.potentials, &mut self.growth_fields);

        // 2. Total mass and its gradient, shared by every channel
        self.state.channel_sum_into(&mut self.mass);
        backend.gradient(&self.mass, shape, &mut self.grad_mass);

        // 3. Flow and reintegration per channel
        self.flow_stats.clear();
        for (c, next) in self.next.iter_mut().enumerate() {
            backend.gradient(&self.growth_fields[c], shape, &mut self.grad_growth);
            backend.flow(
                &self.grad_growth,
                &self.grad_mass,
                &self.mass,
                params,
                &mut self.flow,
            );
            self.flow_stats
                .push(FlowStats::compute(&self.flow, &self.mass, params));
            backend.reintegrate(&self.state.channels[c], &self.flow, shape, dt, next);
        }

        std::mem::swap(&mut self.state.channels, &mut self.next);
        self.state.step += 1;
        self.last_flow_stats = FlowStats::merge(&self.flow_stats);

        let report = StepReport {
            step: self.state.step,
            time: self.elapsed_time(),
            total_mass: self.state.total_mass(),
            flow: self.last_flow_stats,
        };
        trace!(
            "step {}: mass {:.9}, max flow {:.4}",
            report.step, report.total_mass, report.flow.max_magnitude
        );
        report
    }

    /// Run simulation for specified number of steps.
    pub fn run(&mut self, steps: u64) {
        for _ in 0..steps {
            self.step();
        }
    }

    /// Run up to `steps` ticks, stopping after any tick whose report fails
    /// `keep_going`. Returns the number of ticks executed.
    pub fn run_while(&mut self, steps: u64, mut keep_going: impl FnMut(&StepReport) -> bool) -> u64 {
        for executed in 1..=steps {
            let report = self.step();
            if !keep_going(&report) {
                return executed;
            }
        }
        steps
    }

    /// Mass summed over every channel and cell. Non-finite once the state
    /// has degenerated.
    pub fn total_mass(&self) -> f64 {
        self.state.total_mass()
    }

    pub fn channel_mass(&self, channel: usize) -> Option<f64> {
        self.state.channel_mass(channel)
    }

    pub fn step_count(&self) -> u64 {
        self.state.step
    }

    /// Simulated time since the last seed.
    pub fn elapsed_time(&self) -> f64 {
        self.state.step as f64 * self.config.dt
    }

    /// Flat density buffer of one channel, indexed `z * h * w + y * w + x`.
    pub fn channel_data(&self, channel: usize) -> Option<&[f64]> {
        self.state.channels.get(channel).map(Vec::as_slice)
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn stats(&self) -> SimulationStats {
        SimulationStats::from_state(&self.state)
    }

    /// Flow statistics of the most recent tick.
    pub fn last_flow_stats(&self) -> FlowStats {
        self.last_flow_stats
    }

    pub fn grid_shape(&self) -> GridShape {
        self.shape
    }

    /// Get configuration reference.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn kernel_bank(&self) -> &KernelBank {
        &self.bank
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Backend fallbacks that happened at construction.
    pub fn warnings(&self) -> &[BackendWarning] {
        &self.warnings
    }
}
