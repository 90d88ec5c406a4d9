//! Float → full-integer conversion.
//!
//! Activations: asymmetric per-tensor int8 from calibrated ranges.
//! Weights: symmetric per-output-channel int8, zero-point 0.
//! Biases: i32 at `input_scale * weight_scale`.
//! Requantization: Q31 multiplier per channel. tanh: 256-entry table.

use tracing::debug;

use crate::error::QuantError;
use crate::neural::{Activation, DenseLayer, FloatModel};

use super::calibrate::{calibrate, CalibrationSet, InputDomain, RangeTracker};
use super::fixed::QuantizedMultiplier;
use super::format::{QuantizedLayer, QuantizedModel};
use super::params::{QuantParams, QMAX, QMIN};

/// Largest symmetric weight magnitude; -128 is never used.
const WEIGHT_QMAX: f32 = 127.0;

/// Quantize `model` using ranges observed on `set`.
///
/// The set must be non-empty and lie inside `domain`, the range production
/// inputs are known to occupy.
pub fn quantize(
    model: &FloatModel,
    set: &CalibrationSet,
    domain: InputDomain,
) -> Result<QuantizedModel, QuantError> {
    if set.is_empty() {
        return Err(QuantError::EmptyCalibration);
    }
    set.check_domain(domain)?;
    if let Some(layer) = model.layers.iter().position(|l| !l.is_finite()) {
        return Err(QuantError::NonFiniteWeights { layer });
    }

    let calibration = calibrate(model, set)?;
    let input = calibration.input.params("input")?;
    debug!(
        rows = set.len(),
        min = calibration.input.min,
        max = calibration.input.max,
        %input,
        "calibrated model input"
    );

    let mut layers = Vec::with_capacity(model.layers.len());
    let mut layer_input = input;
    for (index, (layer, range)) in model.layers.iter().zip(&calibration.layers).enumerate() {
        let quantized = quantize_layer(index, layer, layer_input, range)?;
        debug!(
            layer = index,
            activation = %layer.activation,
            min = range.min,
            max = range.max,
            accum = %quantized.accum,
            "calibrated layer"
        );
        layer_input = quantized.output;
        layers.push(quantized);
    }

    Ok(QuantizedModel {
        input,
        output: layer_input,
        layers,
    })
}

fn quantize_layer(
    index: usize,
    layer: &DenseLayer,
    input: QuantParams,
    range: &RangeTracker,
) -> Result<QuantizedLayer, QuantError> {
    let accum = range.params(&format!("layer{index}"))?;
    let output = match layer.activation {
        Activation::Tanh => QuantParams::TANH_OUTPUT,
        Activation::Relu | Activation::None => accum,
    };

    let mut weights = Vec::with_capacity(layer.weights.len());
    let mut weight_scales = Vec::with_capacity(layer.out_dim);
    let mut bias = Vec::with_capacity(layer.out_dim);
    let mut multipliers = Vec::with_capacity(layer.out_dim);

    for c in 0..layer.out_dim {
        let row = layer.row(c);
        let max_abs = row.iter().fold(0.0f32, |m, w| m.max(w.abs()));
        // An all-zero row quantizes to zeros under any scale.
        let w_scale = if max_abs > 0.0 {
            max_abs / WEIGHT_QMAX
        } else {
            1.0
        };
        weights.extend(
            row.iter()
                .map(|w| (w / w_scale).round().clamp(-WEIGHT_QMAX, WEIGHT_QMAX) as i8),
        );

        let bias_scale = input.scale as f64 * w_scale as f64;
        let q_bias = (layer.bias[c] as f64 / bias_scale)
            .round()
            .clamp(i32::MIN as f64, i32::MAX as f64) as i32;
        bias.push(q_bias);
        multipliers.push(QuantizedMultiplier::from_real(
            bias_scale / accum.scale as f64,
        )?);
        weight_scales.push(w_scale);
    }

    let lut = (layer.activation == Activation::Tanh).then(|| tanh_lut(accum, output));

    Ok(QuantizedLayer {
        in_dim: layer.in_dim,
        out_dim: layer.out_dim,
        activation: layer.activation,
        input,
        accum,
        output,
        weights,
        weight_scales,
        bias,
        multipliers,
        lut,
    })
}

/// Table from every int8 pre-activation to the int8 tanh output.
pub fn tanh_lut(accum: QuantParams, output: QuantParams) -> Vec<i8> {
    (QMIN..=QMAX)
        .map(|q| output.quantize(accum.dequantize(q as i8).tanh()))
        .collect()
}
