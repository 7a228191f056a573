//! Configuration for a diffusion training process.
//!
//! Field defaults follow the usual DDPM setup: 1000 steps, cosine schedule,
//! ε-prediction with an L2 objective and 25% conditioning dropout.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Elementwise loss between predicted and sampled noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LossKind {
    /// Mean absolute error.
    L1,
    /// Mean squared error.
    L2,
}

impl LossKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LossKind::L1 => "l1",
            LossKind::L2 => "l2",
        }
    }
}

impl FromStr for LossKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "l1" => Ok(LossKind::L1),
            "l2" => Ok(LossKind::L2),
            other => Err(Error::UnsupportedLoss(other.to_string())),
        }
    }
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Family-specific beta schedule parameters.
///
/// Only the fields of the selected family are read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleParams {
    /// First beta of the `linear` family.
    #[serde(default = "default_beta_start")]
    pub beta_start: f64,
    /// Last beta of the `linear` family.
    #[serde(default = "default_beta_end")]
    pub beta_end: f64,
    /// Offset `s` of the `cosine` family.
    #[serde(default = "default_cosine_s")]
    pub cosine_s: f64,
    /// Upper clip applied to `cosine` betas.
    #[serde(default = "default_max_beta")]
    pub max_beta: f64,
}

impl Default for ScheduleParams {
    fn default() -> Self {
        Self {
            beta_start: default_beta_start(),
            beta_end: default_beta_end(),
            cosine_s: default_cosine_s(),
            max_beta: default_max_beta(),
        }
    }
}

/// Top-level configuration for [`DenoiseDiffusion`](crate::DenoiseDiffusion).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffusionConfig {
    /// Probability of zeroing a batch element's conditioning. Must be set
    /// exactly when the predictor is conditional.
    #[serde(default = "default_uncond_prob")]
    pub uncond_prob: Option<f64>,

    /// Number of diffusion steps `T`.
    #[serde(default = "default_num_steps")]
    pub num_steps: usize,

    /// `"l1"` or `"l2"`.
    #[serde(default = "default_loss_type")]
    pub loss_type: String,

    /// `"linear"` or `"cosine"`.
    #[serde(default = "default_beta_schedule")]
    pub beta_schedule: String,

    #[serde(default)]
    pub schedule_params: ScheduleParams,

    /// Seed for timestep, noise and dropout sampling. `None` draws a fresh seed.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Directory holding saved predictor parameters.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

impl Default for DiffusionConfig {
    fn default() -> Self {
        Self {
            uncond_prob: default_uncond_prob(),
            num_steps: default_num_steps(),
            loss_type: default_loss_type(),
            beta_schedule: default_beta_schedule(),
            schedule_params: ScheduleParams::default(),
            seed: None,
            results_dir: default_results_dir(),
        }
    }
}

impl DiffusionConfig {
    /// Configuration for an unconditional predictor (no dropout probability).
    pub fn unconditional() -> Self {
        Self {
            uncond_prob: None,
            ..Default::default()
        }
    }

    /// Read a JSON config; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Parsed loss kind.
    pub fn loss_kind(&self) -> Result<LossKind> {
        self.loss_type.parse()
    }

    /// Check the numeric fields that do not depend on the predictor.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.num_steps == 0 {
            return Err(Error::Config("num_steps must be positive".into()));
        }
        if let Some(p) = self.uncond_prob {
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::Config(format!(
                    "uncond_prob must lie in [0, 1], got {p}"
                )));
            }
        }
        Ok(())
    }
}

fn default_uncond_prob() -> Option<f64> {
    Some(0.25)
}

fn default_num_steps() -> usize {
    1000
}

fn default_loss_type() -> String {
    "l2".to_string()
}

fn default_beta_schedule() -> String {
    "cosine".to_string()
}

fn default_beta_start() -> f64 {
    1e-4
}

fn default_beta_end() -> f64 {
    0.02
}

fn default_cosine_s() -> f64 {
    0.008
}

fn default_max_beta() -> f64 {
    0.999
}

fn default_results_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("results")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = DiffusionConfig::default();
        assert_eq!(cfg.num_steps, 1000);
        assert_eq!(cfg.uncond_prob, Some(0.25));
        assert_eq!(cfg.loss_kind().unwrap(), LossKind::L2);
        assert_eq!(cfg.beta_schedule, "cosine");
        assert!(cfg.results_dir.ends_with("results"));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let cfg: DiffusionConfig =
            serde_json::from_str(r#"{"num_steps": 50, "loss_type": "l1", "uncond_prob": null}"#)
                .unwrap();
        assert_eq!(cfg.num_steps, 50);
        assert_eq!(cfg.loss_kind().unwrap(), LossKind::L1);
        assert_eq!(cfg.uncond_prob, None);
        assert_eq!(cfg.schedule_params, ScheduleParams::default());
    }

    #[test]
    fn test_json_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diffusion.json");
        let cfg = DiffusionConfig {
            num_steps: 20,
            beta_schedule: "linear".into(),
            seed: Some(7),
            ..Default::default()
        };
        std::fs::write(&path, serde_json::to_string_pretty(&cfg).unwrap()).unwrap();
        let loaded = DiffusionConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn test_unknown_loss_rejected() {
        let err = "huber".parse::<LossKind>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedLoss(ref name) if name == "huber"));
    }

    #[test]
    fn test_validate() {
        let mut cfg = DiffusionConfig::default();
        assert!(cfg.validate().is_ok());
        cfg.uncond_prob = Some(1.5);
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
        cfg.uncond_prob = None;
        cfg.num_steps = 0;
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }
}
