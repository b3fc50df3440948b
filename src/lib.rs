//! Flow Lenia - Mass conservative continuous cellular automata.
//!
//! This crate provides a CPU implementation of Flow Lenia, a variant of
//! Lenia where growth drives a velocity field and mass is moved along it by
//! reintegration tracking, so the total mass never changes. Grids are 2D or
//! 3D and wrap on every axis.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Configuration types and seeding for simulations
//! - `compute`: Numerical computation (kernels, FFT, flow, backends, propagator)
//!
//! [`EmbeddedPropagator`] is a variant whose growth and saturation
//! parameters are stored per cell and carried along with the mass.
//!
//! # Example
//!
//! ```rust,no_run
//! use flow_lenia_engine::{
//!     compute::{BackendKind, Propagator},
//!     schema::{Pattern, Seed, SimulationConfig},
//! };
//!
//! let config = SimulationConfig::default();
//! let mut propagator =
//!     Propagator::with_backend(config, BackendKind::Parallel { threads: None })?;
//!
//! propagator.seed(&Seed {
//!     pattern: Pattern::GaussianBlob {
//!         center: vec![0.5, 0.5],
//!         radius: 0.1,
//!         amplitude: 1.0,
//!         channel: 0,
//!     },
//! })?;
//! propagator.run(100);
//!
//! println!("Total mass after 100 steps: {}", propagator.total_mass());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::{
    BackendKind, EmbeddedPropagator, Propagator, SimulationState, SimulationStats, StepReport,
};
pub use schema::{CellParams, EmbeddingConfig, Mixing, Pattern, Seed, SimulationConfig};
