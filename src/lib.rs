//! Training objective for denoising diffusion probabilistic models.
//!
//! A candle-based implementation of the DDPM ε-prediction loss with
//! classifier-free-guidance dropout, plus a trajectory variant for
//! decision-making models that keeps an observed prefix noise-free.
//!
//! ## Training step
//!
//! ```text
//! x0 ──┬─ t ~ U{0..T}, ε ~ N(0, I) ─→ xt = sqrt(ᾱ_t)·x0 + sqrt(1-ᾱ_t)·ε
//!      │                                   │ (trajectory: xt[:, :h] = x0[:, :h])
//! cond ─┴─ (trajectory: ++ [1]) ─→ cond ⊙ keep
//!                                          ↓
//!                              ε̂ = predictor(xt, t, cond)
//!                                          ↓
//!                              loss = mean |ε̂-ε|  or  mean (ε̂-ε)²
//! ```
//!
//! ## Modules
//!
//! - [`diffusion`] — the process object, forward corruption and loss
//! - [`schedule`] — beta schedules and the derived ᾱ constants
//! - [`predictor`] — the noise predictor trait and its conditioning capability
//! - [`model`] — a small MLP predictor for vectors and short trajectories
//! - [`config`] — serde configuration
//!
//! ## Example
//!
//! ```no_run
//! use candle_core::{DType, Device, Tensor};
//! use denoise_diffusion::{
//!     model::{EpsMlp, EpsMlpConfig},
//!     Conditioning, DenoiseDiffusion, DiffusionConfig,
//! };
//!
//! # fn main() -> denoise_diffusion::Result<()> {
//! let device = Device::Cpu;
//! let model = EpsMlp::new(EpsMlpConfig::new(16 * 4, Some(3 + 1)), DType::F32, &device)?;
//! let cfg = DiffusionConfig::default();
//! let mut process =
//!     DenoiseDiffusion::trajectory(model, Conditioning::Conditional, &cfg, &device)?;
//!
//! let x0 = Tensor::randn(0f32, 1.0, (32, 16, 4), &device)?;
//! let cond = Tensor::randn(0f32, 1.0, (32, 3), &device)?;
//! let loss = process.compute_loss(&x0, Some(&cond), Some(2))?;
//! let _grads = loss.backward()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod diffusion;
pub mod model;
pub mod predictor;
pub mod schedule;

mod error;

pub use config::{DiffusionConfig, LossKind, ScheduleParams};
pub use diffusion::{DenoiseDiffusion, Descriptor, Variant};
pub use error::{Error, Result};
pub use predictor::{Conditioning, NoisePredictor};
pub use schedule::{BetaSchedule, NoiseSchedule};
