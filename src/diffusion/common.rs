//! Shared machinery of every diffusion variant: schedule constants, the
//! forward process, random draws and the loss reduction.

use candle_core::{DType, Device, Tensor};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::config::{DiffusionConfig, LossKind};
use crate::predictor::Conditioning;
use crate::schedule::{BetaSchedule, NoiseSchedule};
use crate::{Error, Result};

/// Schedule constants plus the process-wide random source.
pub(crate) struct DiffusionCore {
    schedule: NoiseSchedule,
    beta_schedule: BetaSchedule,
    loss_type: String,
    uncond_prob: Option<f64>,
    rng: ChaCha8Rng,
    data_shape: Option<Vec<usize>>,
}

impl DiffusionCore {
    pub(crate) fn new(
        conditioning: Conditioning,
        cfg: &DiffusionConfig,
        device: &Device,
    ) -> Result<Self> {
        cfg.validate()?;
        if cfg.uncond_prob.is_some() != conditioning.use_cond() {
            return Err(Error::ConditioningConfig {
                uncond_prob: cfg.uncond_prob,
                use_cond: conditioning.use_cond(),
            });
        }

        let beta_schedule = BetaSchedule::from_name(&cfg.beta_schedule, &cfg.schedule_params)?;
        let schedule = NoiseSchedule::new(&beta_schedule, cfg.num_steps, device)?;

        let rng = match cfg.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        };

        Ok(Self {
            schedule,
            beta_schedule,
            loss_type: cfg.loss_type.clone(),
            uncond_prob: cfg.uncond_prob,
            rng,
            data_shape: None,
        })
    }

    pub(crate) fn schedule(&self) -> &NoiseSchedule {
        &self.schedule
    }

    pub(crate) fn beta_schedule(&self) -> &BetaSchedule {
        &self.beta_schedule
    }

    /// Loss name as configured. Parsed on each loss computation.
    pub(crate) fn loss_type(&self) -> &str {
        &self.loss_type
    }

    pub(crate) fn uncond_prob(&self) -> Option<f64> {
        self.uncond_prob
    }

    pub(crate) fn data_shape(&self) -> Option<&[usize]> {
        self.data_shape.as_deref()
    }

    /// Record the per-sample shape of the first batch. Later batches are only
    /// compared against it.
    pub(crate) fn observe_shape(&mut self, x0: &Tensor) -> Result<()> {
        let dims = x0.dims();
        if dims.is_empty() {
            return Err(Error::Config("x0 must have a batch dimension".into()));
        }
        let sample_shape = &dims[1..];
        if let Some(shape) = &self.data_shape {
            if shape.as_slice() != sample_shape {
                tracing::warn!(
                    expected = ?shape,
                    got = ?sample_shape,
                    "data shape differs from the first batch"
                );
            }
        } else {
            self.data_shape = Some(sample_shape.to_vec());
        }
        Ok(())
    }

    /// q(x_t | x_0): returns `(sqrt(ᾱ_t) · x0, sqrt(1 - ᾱ_t))`.
    ///
    /// `t` is `[B]` (`U32`/`I64`). The std has shape `[B, 1, …, 1]` with the
    /// rank of `x0`, so it broadcasts over any trailing data dimensions.
    pub(crate) fn forward_corrupt(&self, x0: &Tensor, t: &Tensor) -> Result<(Tensor, Tensor)> {
        let mut shape = vec![1usize; x0.rank()];
        shape[0] = x0.dim(0)?;

        let alpha_bar = self
            .schedule
            .alphas_bar_tensor()
            .index_select(t, 0)?
            .to_dtype(x0.dtype())?
            .reshape(shape)?;

        let mean = x0.broadcast_mul(&alpha_bar.sqrt()?)?;
        let std = alpha_bar.affine(-1.0, 1.0)?.sqrt()?;
        Ok((mean, std))
    }

    /// Uniform timesteps in `[0, T)`, one per batch element.
    pub(crate) fn sample_timesteps(&mut self, batch: usize, device: &Device) -> Result<Tensor> {
        let num_steps = self.schedule.num_steps() as u32;
        let t: Vec<u32> = (0..batch)
            .map(|_| self.rng.random_range(0..num_steps))
            .collect();
        Ok(Tensor::from_vec(t, batch, device)?)
    }

    /// Standard normal noise shaped like `x0`.
    pub(crate) fn sample_noise(&mut self, x0: &Tensor) -> Result<Tensor> {
        let eps: Vec<f32> = (0..x0.elem_count())
            .map(|_| StandardNormal.sample(&mut self.rng))
            .collect();
        Ok(Tensor::from_vec(eps, x0.shape(), x0.device())?.to_dtype(x0.dtype())?)
    }

    /// Zero the whole conditioning vector of a random subset of the batch.
    pub(crate) fn drop_conditioning(&mut self, cond: &Tensor) -> Result<Tensor> {
        let uncond_prob = self
            .uncond_prob
            .ok_or_else(|| Error::Config("conditioning dropout without uncond_prob".into()))?;
        let batch = cond.dim(0)?;

        let keep: Vec<f32> = sample_keep_mask(batch, uncond_prob, &mut self.rng)
            .into_iter()
            .map(|k| if k { 1.0 } else { 0.0 })
            .collect();
        let mask = Tensor::from_vec(keep, (batch, 1), cond.device())?.to_dtype(cond.dtype())?;
        Ok(cond.broadcast_mul(&mask)?)
    }
}

/// One Bernoulli keep bit per batch element, `P(keep) = 1 - uncond_prob`.
pub fn sample_keep_mask<R: Rng + ?Sized>(batch: usize, uncond_prob: f64, rng: &mut R) -> Vec<bool> {
    let keep_prob = (1.0 - uncond_prob).clamp(0.0, 1.0);
    (0..batch).map(|_| rng.random_bool(keep_prob)).collect()
}

/// Reduce `|pred - target|` (l1) or `(pred - target)²` (l2) to a scalar mean.
pub fn noise_loss(kind: LossKind, pred: &Tensor, target: &Tensor) -> Result<Tensor> {
    let loss = match kind {
        LossKind::L1 => (pred - target)?.abs()?.mean_all()?,
        LossKind::L2 => candle_nn::loss::mse(pred, target)?,
    };
    Ok(loss)
}

/// Column of ones `[B, 1]`, used as the trajectory flag.
pub(crate) fn ones_column(batch: usize, dtype: DType, device: &Device) -> Result<Tensor> {
    Ok(Tensor::ones((batch, 1), dtype, device)?)
}
