//! Propagator with per-cell parameter embedding.
//!
//! Runs the same pipeline as [`Propagator`](super::Propagator), but growth and
//! saturation read their parameters from per-channel parameter fields, and
//! reintegration moves those fields along with the mass.

use log::{info, trace};

use crate::schema::{
    CellParams, EmbeddingConfig, EmbeddingError, Seed, SeedError, SimulationConfig, SpeciesSpec,
};

use super::{
    BackendKind, BackendWarning, ComputeBackend, ConvolutionWorkspace, FlowStats, GridShape,
    KernelBank, MixScratch, SimulationState, SimulationStats, StepReport, Vector,
    backend_or_fallback, compute_alpha, compute_embedded_flow_into, embedded_growth_into,
    reintegrate_with_params,
};

/// Flow Lenia propagator whose rules vary from cell to cell.
pub struct EmbeddedPropagator {
    config: SimulationConfig,
    embedding: EmbeddingConfig,
    shape: GridShape,
    bank: KernelBank,
    backend: Box<dyn ComputeBackend>,
    state: SimulationState,
    /// One parameter field per channel.
    params: Vec<Vec<CellParams>>,
    next: Vec<Vec<f64>>,
    next_params: Vec<Vec<CellParams>>,
    workspace: ConvolutionWorkspace,
    growth_fields: Vec<Vec<f64>>,
    mass: Vec<f64>,
    grad_mass: Vec<Vector>,
    grad_growth: Vec<Vector>,
    flow: Vec<Vector>,
    mix_scratch: MixScratch,
    flow_stats: Vec<FlowStats>,
    last_flow_stats: FlowStats,
    warnings: Vec<BackendWarning>,
}

impl EmbeddedPropagator {
    /// Create a sequential embedded propagator. Every channel starts with
    /// the parameters of [`CellParams::for_channel`].
    pub fn new(config: SimulationConfig, embedding: EmbeddingConfig) -> Result<Self, EmbeddingError> {
        Self::with_backend(config, embedding, BackendKind::Sequential)
    }

    /// Create an embedded propagator whose convolution, gradients and
    /// static-parameter reintegration run on `kind`.
    pub fn with_backend(
        config: SimulationConfig,
        embedding: EmbeddingConfig,
        kind: BackendKind,
    ) -> Result<Self, EmbeddingError> {
        config.validate()?;
        embedding.validate()?;

        let shape = config.grid_shape();
        let channels = config.channels;
        let len = shape.len();
        let bank = KernelBank::from_config(&config);

        let mut warnings = Vec::new();
        let backend = backend_or_fallback(kind, &bank, &mut warnings);

        let params: Vec<Vec<CellParams>> = (0..channels)
            .map(|c| vec![CellParams::for_channel(&config, c); len])
            .collect();

        info!(
            "embedded propagator ready: {}x{}x{} grid, {} channels, {:?} mixing, advection {}",
            shape.width,
            shape.height,
            shape.depth,
            channels,
            embedding.mixing,
            if embedding.enabled { "on" } else { "off" }
        );

        let workspace = ConvolutionWorkspace::new(&bank, channels);

        Ok(Self {
            embedding,
            shape,
            bank,
            backend,
            state: SimulationState::zeros(shape, channels),
            next_params: params.clone(),
            params,
            next: vec![vec![0.0; len]; channels],
            workspace,
            growth_fields: vec![vec![0.0; len]; channels],
            mass: vec![0.0; len],
            grad_mass: vec![[0.0; 3]; len],
            grad_growth: vec![[0.0; 3]; len],
            flow: vec![[0.0; 3]; len],
            mix_scratch: MixScratch::new(len),
            flow_stats: Vec::with_capacity(channels),
            last_flow_stats: FlowStats::default(),
            warnings,
            config,
        })
    }

    /// Replace the mass with the pattern generated by `seed`. Parameter
    /// fields are left as they are.
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

    fn check_channel(&self, channel: usize) -> Result<(), EmbeddingError> {
        if channel < self.config.channels {
            Ok(())
        } else {
            Err(EmbeddingError::ChannelOutOfRange {
                channel,
                channels: self.config.channels,
            })
        }
    }

    /// Replace the parameter field of `channel`.
    pub fn set_params(&mut self, channel: usize, params: Vec<CellParams>) -> Result<(), EmbeddingError> {
        self.check_channel(channel)?;
        if params.len() != self.shape.len() {
            return Err(EmbeddingError::LengthMismatch {
                got: params.len(),
                expected: self.shape.len(),
            });
        }
        for p in &params {
            p.validate()?;
        }
        self.params[channel] = params;
        Ok(())
    }

    /// Set every cell of `channel` to `params`.
    pub fn fill_params(&mut self, channel: usize, params: CellParams) -> Result<(), EmbeddingError> {
        self.check_channel(channel)?;
        params.validate()?;
        self.params[channel].fill(params);
        Ok(())
    }

    /// Paint species regions onto the parameter field of `channel`.
    ///
    /// Where regions overlap the species listed first wins. Nothing is
    /// written unless every species is valid.
    pub fn paint_species(&mut self, channel: usize, species: &[SpeciesSpec]) -> Result<(), EmbeddingError> {
        self.check_channel(channel)?;
        let mut field = self.params[channel].clone();
        for spec in species.iter().rev() {
            spec.paint(&mut field, self.shape)?;
        }
        self.params[channel] = field;

        info!(
            "painted {} species onto channel {channel}: {}",
            species.len(),
            species
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(())
    }

    /// Advance the simulation by one tick.
    pub fn step(&mut self) -> StepReport {
        let shape = self.shape;
        let dt = self.config.dt;
        let distribution_size = self.config.flow.distribution_size;
        let backend = self.backend.as_mut();

        // 1. Potentials, then growth with each cell's own parameters
        backend.convolve(&self.bank, &self.state.channels, &mut self.workspace);
        embedded_growth_into(
            &self.bank,
            &self.workspace.potentials,
            &self.params,
            &mut self.growth_fields,
        );

        // 2. Total mass and its gradient
        self.state.channel_sum_into(&mut self.mass);
        backend.gradient(&self.mass, shape, &mut self.grad_mass);

        // 3. Flow and reintegration per channel
        self.flow_stats.clear();
        for c in 0..self.config.channels {
            let params = &self.params[c];
            backend.gradient(&self.growth_fields[c], shape, &mut self.grad_growth);
            compute_embedded_flow_into(
                &self.grad_growth,
                &self.grad_mass,
                &self.mass,
                params,
                distribution_size,
                &mut self.flow,
            );
            self.flow_stats.push(FlowStats::from_alphas(
                &self.flow,
                self.mass
                    .iter()
                    .zip(params)
                    .map(|(&m, p)| compute_alpha(m, &p.flow_params(distribution_size))),
            ));

            if self.embedding.enabled {
                reintegrate_with_params(
                    &self.state.channels[c],
                    params,
                    &self.flow,
                    shape,
                    dt,
                    self.embedding.mixing,
                    &mut self.mix_scratch,
                    &mut self.next[c],
                    &mut self.next_params[c],
                );
            } else {
                backend.reintegrate(&self.state.channels[c], &self.flow, shape, dt, &mut self.next[c]);
            }
        }

        std::mem::swap(&mut self.state.channels, &mut self.next);
        if self.embedding.enabled {
            std::mem::swap(&mut self.params, &mut self.next_params);
        }
        self.state.step += 1;
        self.last_flow_stats = FlowStats::merge(&self.flow_stats);

        let report = StepReport {
            step: self.state.step,
            time: self.elapsed_time(),
            total_mass: self.state.total_mass(),
            flow: self.last_flow_stats,
        };
        trace!(
            "embedded step {}: mass {:.9}, max flow {:.4}",
            report.step, report.total_mass, report.flow.max_magnitude
        );
        report
    }

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

    /// Parameter field of one channel, indexed like [`Self::channel_data`].
    pub fn params(&self, channel: usize) -> Option<&[CellParams]> {
        self.params.get(channel).map(Vec::as_slice)
    }

    pub fn total_mass(&self) -> f64 {
        self.state.total_mass()
    }

    pub fn channel_mass(&self, channel: usize) -> Option<f64> {
        self.state.channel_mass(channel)
    }

    pub fn step_count(&self) -> u64 {
        self.state.step
    }

    pub fn elapsed_time(&self) -> f64 {
        self.state.step as f64 * self.config.dt
    }

    pub fn channel_data(&self, channel: usize) -> Option<&[f64]> {
        self.state.channels.get(channel).map(Vec::as_slice)
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn stats(&self) -> SimulationStats {
        SimulationStats::from_state(&self.state)
    }

    pub fn last_flow_stats(&self) -> FlowStats {
        self.last_flow_stats
    }

    pub fn grid_shape(&self) -> GridShape {
        self.shape
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn embedding(&self) -> &EmbeddingConfig {
        &self.embedding
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn warnings(&self) -> &[BackendWarning] {
        &self.warnings
    }
}
