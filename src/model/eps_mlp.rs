//! Small MLP noise predictor.
//!
//! Flattens each sample, adds a timestep embedding and (optionally) a
//! projected conditioning vector, and regresses the noise through a stack
//! of SiLU layers:
//!
//! ```text
//! h = W_in · flatten(xt) + temb(t) [+ W_c · cond]
//! h = SiLU(W_k · SiLU(h))   for each hidden layer
//! ε̂ = reshape(W_out · SiLU(h), xt.shape)
//! ```

use candle_core::{DType, Device, Module, Result, Tensor};
use candle_nn::{self as nn, VarBuilder, VarMap};

use super::timestep::TimestepEmbedding;
use crate::predictor::{Conditioning, NoisePredictor};

/// Shape of an [`EpsMlp`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpsMlpConfig {
    /// Number of elements in one sample (`product(data_shape)`).
    pub data_dim: usize,
    /// Width of the conditioning vector, `None` for an unconditional model.
    pub cond_dim: Option<usize>,
    pub hidden_dim: usize,
    /// Width of the sinusoidal timestep features.
    pub time_channels: usize,
    pub num_hidden_layers: usize,
}

impl EpsMlpConfig {
    pub fn new(data_dim: usize, cond_dim: Option<usize>) -> Self {
        Self {
            data_dim,
            cond_dim,
            hidden_dim: 128,
            time_channels: 64,
            num_hidden_layers: 2,
        }
    }

    pub fn conditioning(&self) -> Conditioning {
        Conditioning::from(self.cond_dim.is_some())
    }
}

/// MLP ε-predictor owning its parameters in a [`VarMap`].
pub struct EpsMlp {
    varmap: VarMap,
    time_embed: TimestepEmbedding,
    input: nn::Linear,
    cond_proj: Option<nn::Linear>,
    hidden: Vec<nn::Linear>,
    output: nn::Linear,
    cfg: EpsMlpConfig,
}

impl EpsMlp {
    /// Build a freshly initialised model.
    pub fn new(cfg: EpsMlpConfig, dtype: DType, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, dtype, device);

        let time_embed =
            TimestepEmbedding::new(cfg.time_channels, cfg.hidden_dim, vb.pp("time_embed"))?;
        let input = nn::linear(cfg.data_dim, cfg.hidden_dim, vb.pp("input"))?;
        let cond_proj = cfg
            .cond_dim
            .map(|dim| nn::linear(dim, cfg.hidden_dim, vb.pp("cond_proj")))
            .transpose()?;
        let hidden = (0..cfg.num_hidden_layers)
            .map(|i| nn::linear(cfg.hidden_dim, cfg.hidden_dim, vb.pp(format!("hidden.{i}"))))
            .collect::<Result<Vec<_>>>()?;
        let output = nn::linear(cfg.hidden_dim, cfg.data_dim, vb.pp("output"))?;

        Ok(Self {
            varmap,
            time_embed,
            input,
            cond_proj,
            hidden,
            output,
            cfg,
        })
    }

    pub fn config(&self) -> &EpsMlpConfig {
        &self.cfg
    }
}

impl NoisePredictor for EpsMlp {
    fn predict(&self, xt: &Tensor, t: &Tensor, cond: Option<&Tensor>) -> Result<Tensor> {
        let x = xt.flatten_from(1)?;

        let mut h = (self.input.forward(&x)? + self.time_embed.forward(t, xt.dtype())?)?;
        match (&self.cond_proj, cond) {
            (Some(proj), Some(cond)) => h = (h + proj.forward(cond)?)?,
            (Some(_), None) => candle_core::bail!("EpsMlp: conditional model called without cond"),
            (None, _) => {}
        }

        for layer in &self.hidden {
            h = layer.forward(&h.silu()?)?;
        }
        self.output.forward(&h.silu()?)?.reshape(xt.shape())
    }

    fn parameters(&self) -> &VarMap {
        &self.varmap
    }

    fn parameters_mut(&mut self) -> &mut VarMap {
        &mut self.varmap
    }
}
