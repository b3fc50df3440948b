//! Schema module - Configuration and seeding types for Flow Lenia simulations.

mod config;
mod embedding;
mod seed;

pub use config::*;
pub use embedding::*;
pub use seed::*;
