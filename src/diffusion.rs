//! The diffusion training process.
//!
//! [`DenoiseDiffusion`] pairs a [`NoisePredictor`] with the schedule
//! constants and computes the ε-prediction loss for a batch of clean data:
//!
//! ```text
//! t  ~ U{0, …, T-1}                    per sample
//! ε  ~ N(0, I)
//! xt = sqrt(ᾱ_t) · x0 + sqrt(1 - ᾱ_t) · ε
//! c  = cond ⊙ keep,  keep ~ Bernoulli(1 - uncond_prob)   (conditional predictors)
//! L  = mean |ε̂ - ε|  or  mean (ε̂ - ε)²,   ε̂ = predictor(xt, t, c)
//! ```
//!
//! The [`Variant::Trajectory`] variant additionally keeps the first
//! `preserved_horizon` steps of each trajectory noise-free and appends a
//! constant flag to the conditioning vector.

mod common;
mod trajectory;

use std::fmt;
use std::path::PathBuf;

use candle_core::{Device, Tensor};
use serde::Serialize;

use crate::config::{DiffusionConfig, LossKind};
use crate::predictor::{Conditioning, NoisePredictor};
use crate::schedule::NoiseSchedule;
use crate::{Error, Result};

use common::DiffusionCore;
pub use common::{noise_loss, sample_keep_mask};

/// Preserved prefix length used when the caller does not pass one.
pub const DEFAULT_PRESERVED_HORIZON: usize = 1;

/// Which loss policy the process applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Plain DDPM objective.
    Standard,
    /// Decision-making objective over trajectories `[B, horizon, …]`.
    Trajectory,
}

impl Variant {
    pub fn name(&self) -> &'static str {
        match self {
            Variant::Standard => "Denoise Diffusion",
            Variant::Trajectory => "Trajectory Denoise Diffusion",
        }
    }
}

/// Summary of a process for logging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Descriptor {
    pub name: &'static str,
    #[serde(rename = "T")]
    pub num_steps: usize,
    pub loss_type: String,
    pub beta_schedule: &'static str,
    pub use_cond: bool,
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// Training-time diffusion process around a noise predictor.
pub struct DenoiseDiffusion<P> {
    core: DiffusionCore,
    predictor: P,
    conditioning: Conditioning,
    variant: Variant,
    results_dir: PathBuf,
}

impl<P: NoisePredictor> DenoiseDiffusion<P> {
    /// Standard DDPM process.
    ///
    /// Fails with [`Error::ConditioningConfig`] unless `cfg.uncond_prob` is set
    /// exactly when `conditioning` is [`Conditioning::Conditional`].
    pub fn new(
        predictor: P,
        conditioning: Conditioning,
        cfg: &DiffusionConfig,
        device: &Device,
    ) -> Result<Self> {
        Self::with_variant(predictor, conditioning, cfg, device, Variant::Standard)
    }

    /// Trajectory process with prefix preservation and a conditioning flag.
    pub fn trajectory(
        predictor: P,
        conditioning: Conditioning,
        cfg: &DiffusionConfig,
        device: &Device,
    ) -> Result<Self> {
        Self::with_variant(predictor, conditioning, cfg, device, Variant::Trajectory)
    }

    pub fn with_variant(
        predictor: P,
        conditioning: Conditioning,
        cfg: &DiffusionConfig,
        device: &Device,
        variant: Variant,
    ) -> Result<Self> {
        let core = DiffusionCore::new(conditioning, cfg, device)?;
        let process = Self {
            core,
            predictor,
            conditioning,
            variant,
            results_dir: cfg.results_dir.clone(),
        };
        tracing::info!(
            descriptor = %process.descriptor(),
            uncond_prob = ?cfg.uncond_prob,
            "diffusion process ready"
        );
        Ok(process)
    }

    /// Forward process q(x_t | x_0) at per-sample timesteps `t` (`[B]`).
    ///
    /// Returns `(mean, std)`; `std` has shape `[B, 1, …, 1]`.
    pub fn forward_corrupt(&self, x0: &Tensor, t: &Tensor) -> Result<(Tensor, Tensor)> {
        self.core.forward_corrupt(x0, t)
    }

    /// Loss for one batch of clean samples `x0` (`[B, …]`).
    ///
    /// - `cond`: `[B, cond_dim]`, required by conditional predictors in the
    ///   standard variant and never read for unconditional ones. Modified
    ///   copies are passed on; the caller's tensor is not touched.
    /// - `preserved_horizon`: trajectory variant only, defaults to
    ///   [`DEFAULT_PRESERVED_HORIZON`].
    ///
    /// The returned scalar stays on the autodiff graph of the predictor.
    pub fn compute_loss(
        &mut self,
        x0: &Tensor,
        cond: Option<&Tensor>,
        preserved_horizon: Option<usize>,
    ) -> Result<Tensor> {
        let horizon = match (self.variant, preserved_horizon) {
            (Variant::Standard, None) => None,
            (Variant::Standard, Some(h)) => {
                return Err(Error::Config(format!(
                    "preserved_horizon = {h} only applies to the trajectory variant"
                )))
            }
            (Variant::Trajectory, h) => {
                let h = h.unwrap_or(DEFAULT_PRESERVED_HORIZON);
                trajectory::check_horizon(x0, h)?;
                Some(h)
            }
        };

        self.core.observe_shape(x0)?;
        let batch = x0.dim(0)?;

        let t = self.core.sample_timesteps(batch, x0.device())?;
        let (mean, std) = self.core.forward_corrupt(x0, &t)?;
        let eps = self.core.sample_noise(x0)?;
        let mut xt = (mean + eps.broadcast_mul(&std)?)?;
        if let Some(h) = horizon {
            xt = trajectory::preserve_prefix(&xt, x0, h)?;
        }

        let cond = if self.conditioning.use_cond() {
            let cond = match self.variant {
                Variant::Standard => cond.ok_or(Error::MissingCondition)?.clone(),
                Variant::Trajectory => trajectory::append_flag(cond, x0)?,
            };
            Some(self.core.drop_conditioning(&cond)?)
        } else {
            None
        };

        let pred_eps = self.predictor.predict(&xt, &t, cond.as_ref())?;
        let kind: LossKind = self.core.loss_type().parse()?;
        let loss = noise_loss(kind, &pred_eps, &eps)?;
        tracing::debug!(batch, horizon = ?horizon, loss = ?loss, "computed diffusion loss");
        Ok(loss)
    }

    /// Write the predictor's parameters to `<results_dir>/<identifier>.safetensors`.
    pub fn save(&self, identifier: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.results_dir)?;
        let path = self.parameters_path(identifier);
        self.predictor.parameters().save(&path)?;
        tracing::info!(path = %path.display(), "saved predictor parameters");
        Ok(path)
    }

    /// Restore parameters written by [`save`](Self::save).
    pub fn load(&mut self, identifier: &str) -> Result<()> {
        let path = self.parameters_path(identifier);
        if !path.is_file() {
            return Err(Error::NotFound(path));
        }
        self.predictor.parameters_mut().load(&path)?;
        tracing::info!(path = %path.display(), "loaded predictor parameters");
        Ok(())
    }

    pub fn parameters_path(&self, identifier: &str) -> PathBuf {
        self.results_dir.join(format!("{identifier}.safetensors"))
    }
}

impl<P> DenoiseDiffusion<P> {
    pub fn descriptor(&self) -> Descriptor {
        Descriptor {
            name: self.variant.name(),
            num_steps: self.core.schedule().num_steps(),
            loss_type: self.core.loss_type().to_string(),
            beta_schedule: self.core.beta_schedule().name(),
            use_cond: self.conditioning.use_cond(),
        }
    }

    pub fn schedule(&self) -> &NoiseSchedule {
        self.core.schedule()
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn conditioning(&self) -> Conditioning {
        self.conditioning
    }

    pub fn uncond_prob(&self) -> Option<f64> {
        self.core.uncond_prob()
    }

    /// Per-sample shape of the first batch seen by [`compute_loss`](Self::compute_loss).
    pub fn data_shape(&self) -> Option<&[usize]> {
        self.core.data_shape()
    }

    pub fn predictor(&self) -> &P {
        &self.predictor
    }

    pub fn predictor_mut(&mut self) -> &mut P {
        &mut self.predictor
    }

    pub fn into_predictor(self) -> P {
        self.predictor
    }
}

impl<P> fmt::Display for DenoiseDiffusion<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.descriptor(), f)
    }
}
