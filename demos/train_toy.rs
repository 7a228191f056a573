//! Train the MLP noise predictor on synthetic trajectories.
//!
//! Each trajectory is a 2-D circle segment `[16, 2]` whose starting angle is
//! also given as conditioning. The trajectory variant keeps the first step
//! clean, so the model learns to continue an observed prefix.
//!
//! ```text
//! RUST_LOG=debug cargo run --release --example train_toy
//! ```

use candle_core::{DType, Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use denoise_diffusion::{
    model::{EpsMlp, EpsMlpConfig},
    Conditioning, DenoiseDiffusion, DiffusionConfig, NoisePredictor,
};

const HORIZON: usize = 16;
const BATCH: usize = 64;
const STEPS: usize = 500;

fn toy_batch(device: &Device) -> anyhow::Result<(Tensor, Tensor)> {
    let phase = Tensor::rand(0f32, std::f32::consts::TAU, (BATCH, 1), device)?;
    let offsets: Vec<f32> = (0..HORIZON).map(|i| i as f32 * 0.1).collect();
    let offsets = Tensor::new(offsets.as_slice(), device)?.unsqueeze(0)?;
    let angle = phase.broadcast_add(&offsets)?;
    let x0 = Tensor::stack(&[angle.cos()?, angle.sin()?], 2)?;
    let cond = Tensor::cat(&[phase.cos()?, phase.sin()?], 1)?;
    Ok((x0, cond))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let device = Device::Cpu;
    let cfg = DiffusionConfig {
        num_steps: 200,
        seed: Some(0),
        ..Default::default()
    };

    // +1 for the trajectory flag appended to the conditioning.
    let model = EpsMlp::new(EpsMlpConfig::new(HORIZON * 2, Some(2 + 1)), DType::F32, &device)?;
    let mut optimizer = AdamW::new(
        model.parameters().all_vars(),
        ParamsAdamW {
            lr: 1e-3,
            ..Default::default()
        },
    )?;
    let mut process =
        DenoiseDiffusion::trajectory(model, Conditioning::Conditional, &cfg, &device)?;
    tracing::info!("{process}");

    for step in 0..STEPS {
        let (x0, cond) = toy_batch(&device)?;
        let loss = process.compute_loss(&x0, Some(&cond), Some(1))?;
        optimizer.backward_step(&loss)?;
        if step % 50 == 0 || step + 1 == STEPS {
            tracing::info!(step, loss = loss.to_scalar::<f32>()?, "train");
        }
    }

    let path = process.save("train_toy")?;
    process.load("train_toy")?;
    tracing::info!(path = %path.display(), "round-tripped weights");
    Ok(())
}
