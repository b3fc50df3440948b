//! Compute module - Numerical computation for Flow Lenia.

mod backend;
mod convolution;
mod embedded_propagator;
mod fft;
mod flow;
mod gradient;
mod grid;
mod growth;
mod kernel;
mod param_advection;
mod propagator;
mod reintegration;
mod state;

pub use backend::*;
pub use convolution::*;
pub use embedded_propagator::*;
pub use fft::*;
pub use flow::*;
pub use gradient::*;
pub use grid::*;
pub use growth::*;
pub use kernel::*;
pub use param_advection::*;
pub use propagator::*;
pub use reintegration::*;
pub use state::*;
