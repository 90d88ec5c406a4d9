//! Integer-only reference interpreter.
//!
//! Mirrors what the firmware does with the emitted bytes: i8 in, i32
//! accumulate, Q31 requantize, clamp, table lookup for tanh, i8 out.

use crate::error::FormatError;
use crate::neural::Activation;

use super::fixed::dot_i8;
use super::format::{QuantizedLayer, QuantizedModel};
use super::params::{QMAX, QMIN};

impl QuantizedLayer {
    /// One dense layer over int8 inputs in `self.input` params.
    pub fn invoke(&self, x: &[i8]) -> Vec<i8> {
        let accum_zp = self.accum.zero_point as i32;
        (0..self.out_dim)
            .map(|c| {
                let acc = dot_i8(self.row(c), x, self.input.zero_point, self.bias[c]);
                let mut v = self.multipliers[c]
                    .apply(acc)
                    .saturating_add(accum_zp)
                    .clamp(QMIN, QMAX);
                if self.activation == Activation::Relu {
                    v = v.max(accum_zp);
                }
                match &self.lut {
                    Some(lut) => lut[(v - QMIN) as usize],
                    None => v as i8,
                }
            })
            .collect()
    }
}

impl QuantizedModel {
    /// Run the integer pipeline on already-quantized inputs.
    ///
    /// Per-channel tables are indexed without checks; models built by hand
    /// must pass [`QuantizedModel::validate`] first.
    pub fn invoke(&self, input: &[i8]) -> Result<Vec<i8>, FormatError> {
        if input.len() != self.input_dim() {
            return Err(FormatError::InputLength {
                expected: self.input_dim(),
                actual: input.len(),
            });
        }
        Ok(self
            .layers
            .iter()
            .fold(input.to_vec(), |h, layer| layer.invoke(&h)))
    }

    pub fn quantize_input(&self, x: &[f32]) -> Vec<i8> {
        x.iter().map(|&v| self.input.quantize(v)).collect()
    }

    pub fn dequantize_output(&self, q: &[i8]) -> Vec<f32> {
        q.iter().map(|&v| self.output.dequantize(v)).collect()
    }

    /// Float in, float out, integer arithmetic in between.
    pub fn predict(&self, x: &[f32]) -> Result<Vec<f32>, FormatError> {
        let q = self.invoke(&self.quantize_input(x))?;
        Ok(self.dequantize_output(&q))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quant::fixed::QuantizedMultiplier;
    use crate::quant::params::QuantParams;

    fn unit() -> QuantParams {
        QuantParams {
            scale: 1.0 / 64.0,
            zero_point: 0,
        }
    }

    /// 2 -> 2 layer whose multiplier is exactly 1/2.
    fn layer(activation: Activation) -> QuantizedLayer {
        let half = QuantizedMultiplier::from_real(0.5).unwrap();
        QuantizedLayer {
            in_dim: 2,
            out_dim: 2,
            activation,
            input: unit(),
            accum: unit(),
            output: unit(),
            weights: vec![2, 0, 0, -2],
            weight_scales: vec![1.0 / 128.0; 2],
            bias: vec![0, 0],
            multipliers: vec![half, half],
            lut: None,
        }
    }

    #[test]
    fn relu_clamps_at_zero_point() {
        let l = layer(Activation::Relu);
        assert_eq!(l.invoke(&[10, 10]), vec![10, 0]);
        let lin = layer(Activation::None);
        assert_eq!(lin.invoke(&[10, 10]), vec![10, -10]);
    }

    #[test]
    fn requantized_values_saturate() {
        let mut l = layer(Activation::None);
        l.weights = vec![127, 127, -127, -127];
        l.multipliers = vec![QuantizedMultiplier::from_real(1.0).unwrap(); 2];
        assert_eq!(l.invoke(&[100, 100]), vec![127, -128]);
    }

    #[test]
    fn tanh_layer_reads_the_table() {
        let mut l = layer(Activation::Tanh);
        // Identity table shifted by one so the lookup is observable.
        l.lut = Some((QMIN..=QMAX).map(|q| (q.max(QMIN + 1) - 1) as i8).collect());
        assert_eq!(l.invoke(&[10, 10]), vec![9, -11]);
        assert_eq!(l.invoke(&[-128, -128]), vec![-128, 126]);
    }

    #[test]
    fn input_length_is_checked() {
        let model = QuantizedModel {
            input: unit(),
            output: unit(),
            layers: vec![layer(Activation::None)],
        };
        assert_eq!(
            model.invoke(&[1, 2, 3]),
            Err(FormatError::InputLength {
                expected: 2,
                actual: 3
            })
        );
        let y = model.predict(&[0.5, 0.25]).unwrap();
        assert_eq!(y, vec![0.5, -0.25]);
    }
}
