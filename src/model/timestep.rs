//! Sinusoidal timestep embedding.
//!
//! Integer diffusion steps are mapped to `[cos(t·f_i), sin(t·f_i)]` with
//! geometrically spaced frequencies, then passed through
//! `Linear → SiLU → Linear`.

use candle_core::{DType, Device, Result, Tensor};
use candle_nn::{self as nn, VarBuilder};

const MAX_PERIOD: f64 = 10000.0;

/// Learned projection of the sinusoidal timestep features.
#[derive(Debug, Clone)]
pub struct TimestepEmbedding {
    linear_1: nn::Linear,
    linear_2: nn::Linear,
    in_channels: usize,
}

impl TimestepEmbedding {
    /// - `in_channels`: width of the sinusoidal features (even)
    /// - `embed_dim`: output width
    pub fn new(in_channels: usize, embed_dim: usize, vb: VarBuilder) -> Result<Self> {
        if in_channels % 2 != 0 {
            candle_core::bail!("timestep channels must be even, got {in_channels}");
        }
        let linear_1 = nn::linear(in_channels, embed_dim, vb.pp("linear_1"))?;
        let linear_2 = nn::linear(embed_dim, embed_dim, vb.pp("linear_2"))?;
        Ok(Self {
            linear_1,
            linear_2,
            in_channels,
        })
    }

    /// `t`: `[B]` timesteps of any numeric dtype → `[B, in_channels]` F32 features.
    fn sinusoidal(&self, t: &Tensor, dev: &Device) -> Result<Tensor> {
        let half = self.in_channels / 2;
        let freqs: Vec<f32> = (0..half)
            .map(|i| (-(MAX_PERIOD.ln()) * i as f64 / half as f64).exp() as f32)
            .collect();
        let freqs = Tensor::new(freqs.as_slice(), dev)?;

        let args = t
            .to_dtype(DType::F32)?
            .unsqueeze(1)?
            .broadcast_mul(&freqs.unsqueeze(0)?)?;
        Tensor::cat(&[&args.cos()?, &args.sin()?], 1)
    }

    /// `t` `[B]` → embedding `[B, embed_dim]` in `dtype`.
    pub fn forward(&self, t: &Tensor, dtype: DType) -> Result<Tensor> {
        self.sinusoidal(t, t.device())?
            .to_dtype(dtype)?
            .apply(&self.linear_1)?
            .silu()?
            .apply(&self.linear_2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_nn::VarMap;

    #[test]
    fn test_embedding_shape() {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let te = TimestepEmbedding::new(32, 16, vb.pp("te")).unwrap();
        let t = Tensor::new(&[0u32, 10, 999], &dev).unwrap();
        let emb = te.forward(&t, DType::F32).unwrap();
        assert_eq!(emb.dims(), &[3, 16]);
    }

    #[test]
    fn test_sinusoidal_at_zero() {
        let dev = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &dev);
        let te = TimestepEmbedding::new(8, 4, vb).unwrap();
        let t = Tensor::new(&[0u32], &dev).unwrap();
        let feats: Vec<Vec<f32>> = te.sinusoidal(&t, &dev).unwrap().to_vec2().unwrap();
        // cos(0) = 1 for the first half, sin(0) = 0 for the second.
        assert_eq!(feats[0], vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_neighbouring_steps_distinct() {
        let dev = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &dev);
        let te = TimestepEmbedding::new(16, 4, vb).unwrap();

        let steps: Vec<u32> = (0..1000).collect();
        let t = Tensor::new(steps.as_slice(), &dev).unwrap();
        let feats: Vec<Vec<f32>> = te.sinusoidal(&t, &dev).unwrap().to_vec2().unwrap();
        assert_eq!(feats.len(), 1000);

        // The unit-frequency pair alone moves by a chord of 2·sin(0.5) per step.
        for (step, pair) in feats.windows(2).enumerate() {
            let l1: f32 = pair[0].iter().zip(&pair[1]).map(|(a, b)| (a - b).abs()).sum();
            assert!(l1 > 0.9, "steps {step} and {} too close: {l1}", step + 1);
        }
        assert!(feats.iter().flatten().all(|v| v.abs() <= 1.0 + 1e-6));
    }

    #[test]
    fn test_odd_channels_rejected() {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        assert!(TimestepEmbedding::new(7, 4, vb).is_err());
    }
}
