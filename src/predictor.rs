//! The noise predictor seam.
//!
//! The diffusion process never builds the network itself. It is handed a
//! [`NoisePredictor`] together with an explicit [`Conditioning`] descriptor
//! saying whether the predictor consumes a conditioning vector.

use candle_core::Tensor;
use candle_nn::VarMap;

/// Whether a predictor consumes a conditioning vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conditioning {
    Unconditional,
    Conditional,
}

impl Conditioning {
    pub fn use_cond(&self) -> bool {
        matches!(self, Conditioning::Conditional)
    }
}

impl From<bool> for Conditioning {
    fn from(use_cond: bool) -> Self {
        if use_cond {
            Conditioning::Conditional
        } else {
            Conditioning::Unconditional
        }
    }
}

/// A network predicting the noise `ε` that produced `xt`.
pub trait NoisePredictor {
    /// Predict noise for `xt` at per-sample timesteps `t` (`U32`, shape `[B]`).
    ///
    /// `cond` is `[B, cond_dim]` for conditional predictors and always `None`
    /// for unconditional ones. The output must have the shape of `xt`.
    fn predict(
        &self,
        xt: &Tensor,
        t: &Tensor,
        cond: Option<&Tensor>,
    ) -> candle_core::Result<Tensor>;

    /// Learned parameters, as persisted by `save`.
    fn parameters(&self) -> &VarMap;

    /// Learned parameters, as restored by `load`.
    fn parameters_mut(&mut self) -> &mut VarMap;
}

impl<P: NoisePredictor + ?Sized> NoisePredictor for Box<P> {
    fn predict(
        &self,
        xt: &Tensor,
        t: &Tensor,
        cond: Option<&Tensor>,
    ) -> candle_core::Result<Tensor> {
        (**self).predict(xt, t, cond)
    }

    fn parameters(&self) -> &VarMap {
        (**self).parameters()
    }

    fn parameters_mut(&mut self) -> &mut VarMap {
        (**self).parameters_mut()
    }
}
