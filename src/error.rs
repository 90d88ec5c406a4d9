//! Error types for the export pipeline.
//!
//! Every error is fatal to a run: there is no partial-success mode and
//! nothing retries. Quantization and model-format failures carry their own
//! enums so callers can match on the exact hazard.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level pipeline error.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration, detected before any synthesis starts.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The dataset synthesizer was handed inputs it cannot honor.
    #[error("synthesis failed: {0}")]
    Synthesis(String),

    /// The trainer could not build or read back the model tensors.
    #[error("training failed: {0}")]
    Training(String),

    #[error(transparent)]
    Quant(#[from] QuantError),

    #[error(transparent)]
    Format(#[from] FormatError),

    /// Emitted header text could not be parsed back into bytes.
    #[error("malformed model header: {0}")]
    Header(String),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Calibration and conversion failures.
///
/// None of these may be papered over with a zero or NaN scale.
#[derive(Debug, Error, PartialEq)]
pub enum QuantError {
    #[error("calibration set is empty")]
    EmptyCalibration,

    #[error("calibration value {value} at row {row}, feature {feature} is outside [{min}, {max}]")]
    CalibrationOutOfDomain {
        row: usize,
        feature: usize,
        value: f32,
        min: f32,
        max: f32,
    },

    #[error("calibration row {row} has {actual} features, model expects {expected}")]
    CalibrationShape {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("tensor '{tensor}' observed a non-finite range [{min}, {max}]")]
    NonFiniteRange { tensor: String, min: f32, max: f32 },

    #[error("tensor '{tensor}' observed a zero-width range")]
    DegenerateRange { tensor: String },

    #[error("layer {layer} has non-finite weights or biases")]
    NonFiniteWeights { layer: usize },

    #[error("requantization multiplier {0} is not representable")]
    Multiplier(f64),
}

/// Decoding failures for the quantized model byte layout.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("bad magic: expected HQ8\\0")]
    BadMagic,

    #[error("unexpected end of model data at offset {offset} (needed {needed} more bytes)")]
    Truncated { offset: usize, needed: usize },

    #[error("{0} trailing bytes after last layer")]
    TrailingBytes(usize),

    #[error("unknown activation code {0}")]
    UnknownActivation(u8),

    #[error("layer {layer}: {reason}")]
    InvalidLayer { layer: usize, reason: String },

    #[error("model has no layers")]
    NoLayers,

    #[error("model has {0} layers, the layer count field holds at most 255")]
    TooManyLayers(usize),

    #[error("input has {actual} values, model expects {expected}")]
    InputLength { expected: usize, actual: usize },
}
