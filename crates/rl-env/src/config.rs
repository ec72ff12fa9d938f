//! YAML-backed game and environment configuration.
//!
//! Every key must be present in the source document; there are no silent
//! defaults. The one exception is `value_threshold`, which may be omitted
//! to disable the divergence check.

use std::fs;
use std::path::Path;

use hironaka_engine::PointsOptions;
use serde::Deserialize;
use thiserror::Error;

use crate::types::StepOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Shared configuration for games, the fused step engine and the
/// single-game environments.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GameConfig {
    /// Coordinate dimension (>= 2; in dimension 1 every game is trivial).
    pub dimension: usize,

    /// Point-slot capacity per batch element.
    pub max_num_points: usize,

    /// Sentinel for absent points (<= 0).
    pub padding_value: f32,

    /// Divergence ceiling; omit to disable the check.
    #[serde(default)]
    pub value_threshold: Option<f32>,

    /// Restrict greedy agent choices to the host's subset.
    pub masked: bool,

    /// Rescale after every move so the maximum coordinate is 1.
    pub scale_observation: bool,

    /// Probability of a uniformly random decision for the sampling side.
    pub exploration_rate: f32,
}

impl GameConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dimension < 2 {
            return Err(ConfigError::Invalid(format!(
                "dimension must be at least 2, got {}",
                self.dimension
            )));
        }
        if self.max_num_points == 0 {
            return Err(ConfigError::Invalid(
                "max_num_points must be positive".into(),
            ));
        }
        if self.padding_value > 0.0 {
            return Err(ConfigError::Invalid(format!(
                "padding_value must be non-positive, got {}",
                self.padding_value
            )));
        }
        if let Some(t) = self.value_threshold {
            if t <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "value_threshold must be positive, got {t}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.exploration_rate) {
            return Err(ConfigError::Invalid(format!(
                "exploration_rate must be in [0, 1], got {}",
                self.exploration_rate
            )));
        }
        Ok(())
    }

    pub fn points_options(&self) -> PointsOptions {
        PointsOptions {
            padding_value: self.padding_value,
            value_threshold: self.value_threshold,
        }
    }

    pub fn step_options(&self) -> StepOptions {
        StepOptions {
            masked: self.masked,
            scale_observation: self.scale_observation,
            exploration_rate: self.exploration_rate,
        }
    }
}
