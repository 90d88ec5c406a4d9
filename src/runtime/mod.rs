//! Host-side stand-in for the firmware that consumes the exported model.
//!
//! It honors the same contract the device does: normalize the reading,
//! quantize with the embedded input parameters, run the integer model,
//! dequantize with the embedded output parameters and scale the result back
//! to degrees per step.

use std::path::Path;

use crate::config::SynthConstants;
use crate::data::{DerivedSample, FEATURES, OUTPUTS};
use crate::error::{Error, FormatError, Result};
use crate::quant::QuantizedModel;
use crate::rule::Movement;

/// One sensor and servo snapshot, as the firmware reads it.
pub use crate::data::RawSample as Reading;

/// A decoded policy ready to answer readings.
#[derive(Clone, Debug)]
pub struct PolicyRuntime {
    model: QuantizedModel,
    constants: SynthConstants,
}

impl PolicyRuntime {
    /// Wrap a model, checking its structure and the policy's input and
    /// output shape.
    pub fn new(model: QuantizedModel, constants: SynthConstants) -> Result<Self> {
        model.validate()?;
        if model.input_dim() != FEATURES {
            return Err(FormatError::InputLength {
                expected: FEATURES,
                actual: model.input_dim(),
            }
            .into());
        }
        if model.output_dim() != OUTPUTS {
            return Err(FormatError::InvalidLayer {
                layer: model.layers.len().saturating_sub(1),
                reason: format!("policy needs {OUTPUTS} outputs, got {}", model.output_dim()),
            }
            .into());
        }
        Ok(Self { model, constants })
    }

    pub fn from_bytes(bytes: &[u8], constants: SynthConstants) -> Result<Self> {
        Self::new(QuantizedModel::from_bytes(bytes)?, constants)
    }

    /// Load an emitted model binary.
    pub fn load(path: &Path, constants: SynthConstants) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        Self::from_bytes(&bytes, constants)
    }

    pub fn model(&self) -> &QuantizedModel {
        &self.model
    }

    /// Movement in degrees per step for a raw reading.
    pub fn infer(&self, reading: &Reading) -> Result<Movement> {
        self.infer_features(&reading.derive(&self.constants))
    }

    /// Movement for already-normalized features.
    pub fn infer_features(&self, features: &DerivedSample) -> Result<Movement> {
        let y = self.model.predict(&features.to_array())?;
        let k = self.constants.label_divisor;
        Ok((y[0] * k, y[1] * k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleConstants;
    use crate::data::synthesize;
    use crate::quant::test_support::glorot_policy;
    use crate::quant::{quantize, CalibrationSet, InputDomain};

    fn runtime() -> (PolicyRuntime, crate::neural::FloatModel) {
        let c = SynthConstants::default();
        let corpus = synthesize(2_000, 7, &c).unwrap();
        let float = glorot_policy(11);
        let set = CalibrationSet::draw(&corpus, 8, 256, 7);
        let q = quantize(&float, &set, InputDomain::default()).unwrap();
        (PolicyRuntime::from_bytes(&q.to_bytes(), c).unwrap(), float)
    }

    #[test]
    fn infer_scales_dequantized_outputs_by_label_divisor() {
        let (rt, float) = runtime();
        let reading = Reading {
            top: 3_000,
            bottom: 1_000,
            left: 200,
            right: 2_500,
            pos1: 45,
            pos2: 170,
        };
        let (d1, d2) = rt.infer(&reading).unwrap();
        let x = reading.derive(&SynthConstants::default()).to_array();
        let want = float.forward(&x);
        assert!((d1 - want[0] * 3.0).abs() < 0.3, "{d1} vs {}", want[0] * 3.0);
        assert!((d2 - want[1] * 3.0).abs() < 0.3, "{d2} vs {}", want[1] * 3.0);
        // Outputs never exceed the tanh range times the divisor.
        assert!(d1.abs() <= 3.0 && d2.abs() <= 3.0);
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let c = SynthConstants::default();
        assert!(matches!(
            PolicyRuntime::from_bytes(b"not a model", c),
            Err(Error::Format(FormatError::BadMagic))
        ));
    }

    #[test]
    fn wrong_shape_is_rejected() {
        let (rt, _) = runtime();
        let mut model = rt.model().clone();
        model.layers.truncate(2);
        model.output = model.layers[1].output;
        assert!(matches!(
            PolicyRuntime::new(model, SynthConstants::default()),
            Err(Error::Format(FormatError::InvalidLayer { .. }))
        ));
    }

    #[test]
    fn short_bias_is_rejected_before_inference() {
        let (rt, _) = runtime();
        let mut model = rt.model().clone();
        model.layers[1].bias.truncate(3);
        assert!(matches!(
            PolicyRuntime::new(model, SynthConstants::default()),
            Err(Error::Format(FormatError::InvalidLayer { layer: 1, .. }))
        ));
    }

    #[test]
    fn divisor_comes_from_constants() {
        let (rt, _) = runtime();
        let halved = SynthConstants {
            label_divisor: 1.5,
            rule: RuleConstants::default(),
            ..SynthConstants::default()
        };
        let rt2 = PolicyRuntime::new(rt.model().clone(), halved).unwrap();
        let reading = Reading {
            top: 4_000,
            bottom: 0,
            left: 0,
            right: 4_000,
            pos1: 90,
            pos2: 90,
        };
        let (a, b) = rt.infer(&reading).unwrap();
        let (c, d) = rt2.infer(&reading).unwrap();
        assert!((a - 2.0 * c).abs() < 1e-5 && (b - 2.0 * d).abs() < 1e-5);
    }
}
