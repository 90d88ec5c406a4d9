//! Per-tensor affine quantization parameters.
//!
//! `real = scale * (q - zero_point)` with `q` in the signed 8-bit domain.

use crate::error::QuantError;

pub const QMIN: i32 = -128;
pub const QMAX: i32 = 127;

/// Scale and zero-point of one int8 tensor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuantParams {
    pub scale: f32,
    pub zero_point: i8,
}

impl QuantParams {
    /// Fixed output parameters of an int8 tanh: covers [-1, 127/128].
    pub const TANH_OUTPUT: Self = Self {
        scale: 1.0 / 128.0,
        zero_point: 0,
    };

    /// Asymmetric parameters covering an observed `[min, max]`.
    ///
    /// The range is widened to contain 0 so zero stays exactly representable.
    /// Non-finite or zero-width ranges are errors, never a zero/NaN scale.
    pub fn from_range(tensor: &str, min: f32, max: f32) -> Result<Self, QuantError> {
        if !(min.is_finite() && max.is_finite()) {
            return Err(QuantError::NonFiniteRange {
                tensor: tensor.to_string(),
                min,
                max,
            });
        }
        let min = min.min(0.0);
        let max = max.max(0.0);
        let scale = (max - min) / (QMAX - QMIN) as f32;
        if !(scale.is_normal() && scale > 0.0) {
            return Err(QuantError::DegenerateRange {
                tensor: tensor.to_string(),
            });
        }
        let zero_point = (QMIN as f32 - min / scale)
            .round()
            .clamp(QMIN as f32, QMAX as f32) as i8;
        Ok(Self { scale, zero_point })
    }

    #[inline]
    pub fn quantize(&self, x: f32) -> i8 {
        let q = (x / self.scale).round() + self.zero_point as f32;
        q.clamp(QMIN as f32, QMAX as f32) as i8
    }

    #[inline]
    pub fn dequantize(&self, q: i8) -> f32 {
        self.scale * (q as i32 - self.zero_point as i32) as f32
    }

    /// Smallest real value representable without clipping.
    pub fn min_real(&self) -> f32 {
        self.dequantize(QMIN as i8)
    }

    /// Largest real value representable without clipping.
    pub fn max_real(&self) -> f32 {
        self.dequantize(QMAX as i8)
    }

    /// Share of `values` that fall outside the representable range by more
    /// than half a step, i.e. that would saturate when quantized.
    pub fn clip_fraction<'a>(&self, values: impl IntoIterator<Item = &'a f32>) -> f32 {
        let lo = self.min_real() - 0.5 * self.scale;
        let hi = self.max_real() + 0.5 * self.scale;
        let (mut clipped, mut total) = (0usize, 0usize);
        for &v in values {
            total += 1;
            if v < lo || v > hi {
                clipped += 1;
            }
        }
        if total == 0 {
            0.0
        } else {
            clipped as f32 / total as f32
        }
    }

    pub fn is_valid(&self) -> bool {
        self.scale.is_finite() && self.scale > 0.0
    }
}

impl std::fmt::Display for QuantParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "scale {:.6} zp {} [{:.4}, {:.4}]",
            self.scale,
            self.zero_point,
            self.min_real(),
            self.max_real()
        )
    }
}
