//! Beta schedules and the constants derived from them.
//!
//! A schedule is a sequence of per-step noise variances `β_t ∈ (0, 1)`.
//! Everything the forward process needs follows from it:
//!
//! ```text
//! α_t      = 1 - β_t
//! ᾱ_t      = α_0 · α_1 · … · α_t
//! ᾱ_prev_t = ᾱ_{t-1},   ᾱ_prev_0 = 1
//! ```

use candle_core::{DType, Device, Tensor};

use crate::config::ScheduleParams;
use crate::{Error, Result};

/// A named beta schedule family with its parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BetaSchedule {
    /// Linearly spaced betas from `beta_start` to `beta_end`.
    Linear { beta_start: f64, beta_end: f64 },
    /// Improved-DDPM cosine schedule: `ᾱ(t) ∝ cos²((t + s) / (1 + s) · π/2)`.
    Cosine { s: f64, max_beta: f64 },
}

impl BetaSchedule {
    /// Resolve a schedule family by name.
    pub fn from_name(name: &str, params: &ScheduleParams) -> Result<Self> {
        match name {
            "linear" => Ok(BetaSchedule::Linear {
                beta_start: params.beta_start,
                beta_end: params.beta_end,
            }),
            "cosine" => Ok(BetaSchedule::Cosine {
                s: params.cosine_s,
                max_beta: params.max_beta,
            }),
            other => Err(Error::UnsupportedSchedule(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BetaSchedule::Linear { .. } => "linear",
            BetaSchedule::Cosine { .. } => "cosine",
        }
    }

    /// Generate `num_steps` betas, each in `(0, 1)`.
    pub fn betas(&self, num_steps: usize) -> Result<Vec<f64>> {
        let betas: Vec<f64> = match *self {
            BetaSchedule::Linear {
                beta_start,
                beta_end,
            } => {
                let denom = num_steps.saturating_sub(1).max(1) as f64;
                (0..num_steps)
                    .map(|i| beta_start + (beta_end - beta_start) * i as f64 / denom)
                    .collect()
            }
            BetaSchedule::Cosine { s, max_beta } => {
                let alpha_bar =
                    |t: f64| ((t + s) / (1.0 + s) * std::f64::consts::FRAC_PI_2).cos().powi(2);
                (0..num_steps)
                    .map(|i| {
                        let t1 = i as f64 / num_steps as f64;
                        let t2 = (i + 1) as f64 / num_steps as f64;
                        (1.0 - alpha_bar(t2) / alpha_bar(t1)).min(max_beta)
                    })
                    .collect()
            }
        };

        if let Some(bad) = betas.iter().find(|b| !(**b > 0.0 && **b < 1.0)) {
            return Err(Error::Config(format!(
                "{} schedule produced beta {bad} outside (0, 1)",
                self.name()
            )));
        }
        Ok(betas)
    }
}

/// Immutable constants derived from a beta schedule.
#[derive(Debug, Clone)]
pub struct NoiseSchedule {
    betas: Vec<f64>,
    alphas: Vec<f64>,
    alphas_bar: Vec<f64>,
    alphas_bar_prev: Vec<f64>,
    /// `ᾱ` as an F32 tensor `[T]` on the process device, for per-sample gathers.
    alphas_bar_t: Tensor,
}

impl NoiseSchedule {
    pub fn new(schedule: &BetaSchedule, num_steps: usize, device: &Device) -> Result<Self> {
        Self::from_betas(schedule.betas(num_steps)?, device)
    }

    pub fn from_betas(betas: Vec<f64>, device: &Device) -> Result<Self> {
        if betas.is_empty() {
            return Err(Error::Config("beta schedule is empty".into()));
        }
        let alphas: Vec<f64> = betas.iter().map(|b| 1.0 - b).collect();

        let mut alphas_bar = Vec::with_capacity(alphas.len());
        let mut cumprod = 1.0f64;
        for alpha in &alphas {
            cumprod *= alpha;
            alphas_bar.push(cumprod);
        }

        let mut alphas_bar_prev = Vec::with_capacity(alphas_bar.len());
        alphas_bar_prev.push(1.0);
        alphas_bar_prev.extend_from_slice(&alphas_bar[..alphas_bar.len() - 1]);

        let alphas_bar_t = Tensor::new(alphas_bar.as_slice(), device)?.to_dtype(DType::F32)?;

        Ok(Self {
            betas,
            alphas,
            alphas_bar,
            alphas_bar_prev,
            alphas_bar_t,
        })
    }

    pub fn num_steps(&self) -> usize {
        self.betas.len()
    }

    pub fn betas(&self) -> &[f64] {
        &self.betas
    }

    pub fn alphas(&self) -> &[f64] {
        &self.alphas
    }

    pub fn alphas_bar(&self) -> &[f64] {
        &self.alphas_bar
    }

    pub fn alphas_bar_prev(&self) -> &[f64] {
        &self.alphas_bar_prev
    }

    /// `ᾱ` on the process device.
    pub fn alphas_bar_tensor(&self) -> &Tensor {
        &self.alphas_bar_t
    }
}
