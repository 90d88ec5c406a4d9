//! Pipeline configuration.
//!
//! Every constant the rule, synthesizer, trainer and quantizer depend on is
//! a named field here so tests can vary them independently. Defaults match
//! the firmware that consumes the exported model.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Dead-band rule constants.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RuleConstants {
    /// Differential magnitude an axis must strictly exceed to move.
    pub threshold: f32,
    /// Movement magnitude emitted when an axis moves.
    pub velocity: f32,
}

impl Default for RuleConstants {
    fn default() -> Self {
        Self {
            threshold: 50.0,
            velocity: 2.0,
        }
    }
}

/// Feature and label normalization constants.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SynthConstants {
    /// Largest light-sensor reading (12-bit ADC).
    pub sensor_max: u16,
    /// Largest servo angle in degrees.
    pub servo_max: u8,
    /// Divisor for the two differentials.
    pub sensor_scale: f32,
    /// Servo angle mapped to 0.0.
    pub servo_center: f32,
    /// Servo half-span mapped to 1.0.
    pub servo_span: f32,
    /// Divisor applied to rule outputs. Larger than the rule velocity on
    /// purpose: labels only reach 2/3 of the tanh output span.
    pub label_divisor: f32,
    pub rule: RuleConstants,
}

impl Default for SynthConstants {
    fn default() -> Self {
        Self {
            sensor_max: 4095,
            servo_max: 180,
            sensor_scale: 4095.0,
            servo_center: 90.0,
            servo_span: 90.0,
            label_divisor: 3.0,
            rule: RuleConstants::default(),
        }
    }
}

impl SynthConstants {
    /// Divisor for total luminance (four sensors at full scale).
    pub fn soma_scale(&self) -> f32 {
        4.0 * self.sensor_scale
    }
}

/// Trainer hyperparameters.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Seed for weight init and per-epoch shuffling.
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 6,
            batch_size: 256,
            learning_rate: 1e-3,
            seed: 42,
        }
    }
}

/// Representative-dataset protocol for the quantizer.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub rounds: usize,
    pub batch_size: usize,
    pub seed: u64,
    /// Expected production domain of every input feature.
    pub input_min: f32,
    pub input_max: f32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            rounds: 100,
            batch_size: 256,
            seed: 42,
            input_min: -1.0,
            input_max: 1.0,
        }
    }
}

/// Where the artifacts land.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub binary_name: String,
    pub header_name: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            binary_name: "model.bin".to_string(),
            header_name: "model.h".to_string(),
        }
    }
}

impl OutputConfig {
    pub fn binary_path(&self) -> PathBuf {
        self.dir.join(&self.binary_name)
    }

    pub fn header_path(&self) -> PathBuf {
        self.dir.join(&self.header_name)
    }
}

/// Full pipeline configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of synthesized rows.
    pub samples: usize,
    /// Seed for the raw sample draws.
    pub seed: u64,
    /// Rows in the held-out set the exported policy is scored on.
    pub holdout: usize,
    pub synth: SynthConstants,
    pub train: TrainConfig,
    pub calibration: CalibrationConfig,
    pub output: OutputConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            samples: 50_000,
            seed: 42,
            holdout: 5_000,
            synth: SynthConstants::default(),
            train: TrainConfig::default(),
            calibration: CalibrationConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a TOML config file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_toml_str(&content).map_err(|source| Error::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Reject configurations the pipeline cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.samples == 0 {
            return Err(Error::config("sample count must be positive"));
        }
        if self.holdout == 0 {
            return Err(Error::config("holdout must be positive"));
        }
        let s = &self.synth;
        if s.sensor_max == 0 || s.servo_max == 0 {
            return Err(Error::config("sensor and servo ranges must be non-empty"));
        }
        for (name, v) in [
            ("sensor_scale", s.sensor_scale),
            ("servo_span", s.servo_span),
            ("label_divisor", s.label_divisor),
            ("rule.velocity", s.rule.velocity),
        ] {
            if !(v.is_finite() && v > 0.0) {
                return Err(Error::config(format!("{name} must be positive, got {v}")));
            }
        }
        if !(s.rule.threshold.is_finite() && s.rule.threshold >= 0.0) {
            return Err(Error::config(format!(
                "rule.threshold must be non-negative, got {}",
                s.rule.threshold
            )));
        }
        if !s.servo_center.is_finite() {
            return Err(Error::config("servo_center must be finite"));
        }

        let t = &self.train;
        if t.epochs == 0 {
            return Err(Error::config("train.epochs must be positive"));
        }
        if t.batch_size == 0 {
            return Err(Error::config("train.batch_size must be positive"));
        }
        if !(t.learning_rate.is_finite() && t.learning_rate > 0.0) {
            return Err(Error::config(format!(
                "train.learning_rate must be positive, got {}",
                t.learning_rate
            )));
        }

        let c = &self.calibration;
        if c.rounds == 0 || c.batch_size == 0 {
            return Err(Error::config(
                "calibration.rounds and calibration.batch_size must be positive",
            ));
        }
        if !(c.input_min.is_finite() && c.input_max.is_finite() && c.input_min < c.input_max) {
            return Err(Error::config(format!(
                "calibration input domain [{}, {}] is empty",
                c.input_min, c.input_max
            )));
        }

        if self.output.binary_name.is_empty() || self.output.header_name.is_empty() {
            return Err(Error::config("output file names must be non-empty"));
        }
        if self.output.binary_name == self.output.header_name {
            return Err(Error::config("binary and header outputs must differ"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.samples, 50_000);
        assert_eq!(config.seed, 42);
        assert_eq!(config.holdout, 5_000);
        assert_eq!(config.train.epochs, 6);
        assert_eq!(config.train.batch_size, 256);
        assert_eq!(config.calibration.rounds, 100);
        assert_eq!(config.calibration.batch_size, 256);
        assert_eq!(config.synth.rule.threshold, 50.0);
        assert_eq!(config.synth.rule.velocity, 2.0);
        assert_eq!(config.synth.label_divisor, 3.0);
    }

    #[test]
    fn zero_samples_rejected() {
        let config = PipelineConfig {
            samples: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)), "got {err:?}");

        let config = PipelineConfig {
            holdout: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn bad_hyperparameters_rejected() {
        let mut config = PipelineConfig::default();
        config.train.epochs = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.train.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.train.learning_rate = -1.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.calibration.rounds = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.synth.label_divisor = 0.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.calibration.input_min = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
samples = 1000
seed = 7

[train]
epochs = 2

[synth.rule]
threshold = 25.0
"#,
        )
        .unwrap();
        assert_eq!(config.samples, 1000);
        assert_eq!(config.seed, 7);
        assert_eq!(config.train.epochs, 2);
        assert_eq!(config.train.batch_size, 256);
        assert_eq!(config.synth.rule.threshold, 25.0);
        assert_eq!(config.synth.rule.velocity, 2.0);
        assert_eq!(config.synth.label_divisor, 3.0);
        config.validate().unwrap();
    }

    #[test]
    fn load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, "samples = \"many\"\n").unwrap();
        let err = PipelineConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("pipeline.toml"), "{err}");

        let missing = PipelineConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(missing, Error::Io { .. }));
    }
}
