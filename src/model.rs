//! Noise predictor networks.
//!
//! - [`eps_mlp`] — MLP ε-predictor for flattened samples
//! - [`timestep`] — sinusoidal timestep embedding

pub mod eps_mlp;
pub mod timestep;

pub use eps_mlp::{EpsMlp, EpsMlpConfig};
pub use timestep::TimestepEmbedding;
