//! Trajectory-specific steps of the loss: prefix preservation and the
//! conditioning flag.

use candle_core::{Tensor, D};

use super::common::ones_column;
use crate::{Error, Result};

/// Sequence axis of trajectory batches `[B, horizon, …]`.
const SEQ_AXIS: usize = 1;

/// Check `0 < horizon < x0.dim(1)`.
pub(crate) fn check_horizon(x0: &Tensor, horizon: usize) -> Result<()> {
    let sequence_len = x0.dim(SEQ_AXIS)?;
    if horizon == 0 || horizon >= sequence_len {
        return Err(Error::InvalidHorizon {
            horizon,
            sequence_len,
        });
    }
    Ok(())
}

/// Replace the first `horizon` steps of `xt` with the clean steps of `x0`.
pub(crate) fn preserve_prefix(xt: &Tensor, x0: &Tensor, horizon: usize) -> Result<Tensor> {
    let sequence_len = xt.dim(SEQ_AXIS)?;
    let prefix = x0.narrow(SEQ_AXIS, 0, horizon)?;
    let rest = xt.narrow(SEQ_AXIS, horizon, sequence_len - horizon)?;
    Ok(Tensor::cat(&[&prefix, &rest], SEQ_AXIS)?)
}

/// Append a trailing flag of 1 to `cond`. Without `cond` the flag alone is
/// returned, shaped `[batch, 1]` like `x0`'s dtype and device.
pub(crate) fn append_flag(cond: Option<&Tensor>, x0: &Tensor) -> Result<Tensor> {
    match cond {
        Some(cond) => {
            let flag = ones_column(cond.dim(0)?, cond.dtype(), cond.device())?;
            Ok(Tensor::cat(&[cond, &flag], D::Minus1)?)
        }
        None => ones_column(x0.dim(0)?, x0.dtype(), x0.device()),
    }
}
