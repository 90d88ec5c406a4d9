//! Calibration: the representative dataset and per-tensor range tracking.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::data::{TrainingCorpus, FEATURES};
use crate::error::QuantError;
use crate::neural::{Activation, FloatModel};

use super::params::QuantParams;

/// Slack allowed past the declared input domain for float rounding.
const DOMAIN_TOLERANCE: f32 = 1e-6;

/// Expected production range of every model input feature.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InputDomain {
    pub min: f32,
    pub max: f32,
}

impl Default for InputDomain {
    fn default() -> Self {
        Self { min: -1.0, max: 1.0 }
    }
}

impl From<&crate::config::CalibrationConfig> for InputDomain {
    fn from(c: &crate::config::CalibrationConfig) -> Self {
        Self {
            min: c.input_min,
            max: c.input_max,
        }
    }
}

/// Rows fed through the float model to observe tensor ranges.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationSet {
    width: usize,
    values: Vec<f32>,
}

impl CalibrationSet {
    /// Build from row-major values. A trailing partial row is dropped.
    pub fn from_flat(width: usize, mut values: Vec<f32>) -> Self {
        if width == 0 {
            values.clear();
        } else {
            values.truncate(values.len() / width * width);
        }
        Self { width, values }
    }

    pub fn from_rows<const N: usize>(rows: impl IntoIterator<Item = [f32; N]>) -> Self {
        Self::from_flat(N, rows.into_iter().flatten().collect())
    }

    /// `rounds` batches of `batch` corpus rows drawn uniformly with
    /// replacement from a seeded stream.
    pub fn draw(corpus: &TrainingCorpus, rounds: usize, batch: usize, seed: u64) -> Self {
        if corpus.is_empty() {
            return Self::from_flat(FEATURES, Vec::new());
        }
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(2);
        let rows = corpus.rows();
        let mut values = Vec::with_capacity(rounds * batch * FEATURES);
        for _ in 0..rounds * batch {
            let row = &rows[rng.gen_range(0..rows.len())];
            values.extend_from_slice(&row.features.to_array());
        }
        Self::from_flat(FEATURES, values)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn len(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.values.len() / self.width
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.values.chunks_exact(self.width.max(1))
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Every value must be finite and inside `domain`; quantizing against a
    /// set that strays outside production inputs yields wrong parameters.
    pub fn check_domain(&self, domain: InputDomain) -> Result<(), QuantError> {
        for (row, values) in self.rows().enumerate() {
            for (feature, &value) in values.iter().enumerate() {
                if !value.is_finite()
                    || value < domain.min - DOMAIN_TOLERANCE
                    || value > domain.max + DOMAIN_TOLERANCE
                {
                    return Err(QuantError::CalibrationOutOfDomain {
                        row,
                        feature,
                        value,
                        min: domain.min,
                        max: domain.max,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Running min/max of one tensor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RangeTracker {
    pub min: f32,
    pub max: f32,
    non_finite: bool,
}

impl Default for RangeTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RangeTracker {
    pub fn new() -> Self {
        Self {
            min: f32::INFINITY,
            max: f32::NEG_INFINITY,
            non_finite: false,
        }
    }

    #[inline]
    pub fn observe(&mut self, v: f32) {
        if !v.is_finite() {
            self.non_finite = true;
            return;
        }
        self.min = self.min.min(v);
        self.max = self.max.max(v);
    }

    pub fn observe_all(&mut self, values: &[f32]) {
        for &v in values {
            self.observe(v);
        }
    }

    /// Affine int8 parameters for the observed range.
    pub fn params(&self, tensor: &str) -> Result<QuantParams, QuantError> {
        if self.non_finite {
            return Err(QuantError::NonFiniteRange {
                tensor: tensor.to_string(),
                min: f32::NAN,
                max: f32::NAN,
            });
        }
        QuantParams::from_range(tensor, self.min, self.max)
    }
}

/// Observed ranges for the model input and each layer's integer output.
#[derive(Clone, Debug)]
pub struct Calibration {
    pub input: RangeTracker,
    /// Per layer: the tensor the dense accumulator is requantized into.
    /// Post-ReLU for ReLU layers, pre-activation for tanh and linear layers.
    pub layers: Vec<RangeTracker>,
}

/// Run every calibration row through the float model.
pub fn calibrate(model: &FloatModel, set: &CalibrationSet) -> Result<Calibration, QuantError> {
    if set.is_empty() {
        return Err(QuantError::EmptyCalibration);
    }
    if set.width() != model.input_dim() {
        return Err(QuantError::CalibrationShape {
            row: 0,
            expected: model.input_dim(),
            actual: set.width(),
        });
    }

    let mut input = RangeTracker::new();
    let mut layers = vec![RangeTracker::new(); model.layers.len()];
    for row in set.rows() {
        input.observe_all(row);
        for ((layer, trace), tracker) in model
            .layers
            .iter()
            .zip(model.forward_trace(row))
            .zip(layers.iter_mut())
        {
            match layer.activation {
                Activation::Relu => tracker.observe_all(&trace.post),
                Activation::Tanh | Activation::None => tracker.observe_all(&trace.pre),
            }
        }
    }
    Ok(Calibration { input, layers })
}
