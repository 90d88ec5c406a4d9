//! Fixed-point requantization.
//!
//! A positive real multiplier M is encoded as a Q31 mantissa q in
//! [2^30, 2^31) and a power-of-two exponent: M = q * 2^(shift - 31).
//! Applying it to an i32 accumulator needs only a 64-bit product and a
//! rounding right shift, so the firmware never touches floats.

use crate::error::QuantError;

/// Largest left shift a multiplier may carry.
pub const MAX_SHIFT: i8 = 30;
/// Smallest shift before the multiplier underflows to zero.
pub const MIN_SHIFT: i8 = -31;

/// Q31 multiplier plus exponent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuantizedMultiplier {
    pub multiplier: i32,
    pub shift: i8,
}

impl QuantizedMultiplier {
    pub const ZERO: Self = Self {
        multiplier: 0,
        shift: 0,
    };

    /// Encode a real multiplier.
    ///
    /// Tiny multipliers collapse to [`Self::ZERO`]; negative, non-finite or
    /// too-large ones are errors.
    pub fn from_real(m: f64) -> Result<Self, QuantError> {
        if !m.is_finite() || m < 0.0 {
            return Err(QuantError::Multiplier(m));
        }
        if m == 0.0 {
            return Ok(Self::ZERO);
        }

        // m = frac * 2^exp with frac in [0.5, 1)
        let mut exp = m.log2().floor() as i32 + 1;
        let mut frac = m / 2f64.powi(exp);
        while frac >= 1.0 {
            frac /= 2.0;
            exp += 1;
        }
        while frac < 0.5 {
            frac *= 2.0;
            exp -= 1;
        }

        let mut q = (frac * (1u64 << 31) as f64).round() as i64;
        if q == 1i64 << 31 {
            q /= 2;
            exp += 1;
        }
        if exp < MIN_SHIFT as i32 {
            return Ok(Self::ZERO);
        }
        if exp > MAX_SHIFT as i32 {
            return Err(QuantError::Multiplier(m));
        }
        Ok(Self {
            multiplier: q as i32,
            shift: exp as i8,
        })
    }

    /// The real value this multiplier stands for.
    pub fn to_real(self) -> f64 {
        self.multiplier as f64 * 2f64.powi(self.shift as i32 - 31)
    }

    /// `round(x * M)`, halves rounded away from zero, saturated to i32.
    #[inline]
    pub fn apply(self, x: i32) -> i32 {
        let prod = x as i64 * self.multiplier as i64;
        let right = 31 - self.shift as i32;
        let scaled = if right <= 0 {
            prod.saturating_mul(1i64 << (-right))
        } else {
            let half = 1i64 << (right - 1);
            if prod >= 0 {
                (prod + half) >> right
            } else {
                -((-prod + half) >> right)
            }
        };
        scaled.clamp(i32::MIN as i64, i32::MAX as i64) as i32
    }

    /// Whether the encoding is one [`Self::from_real`] can produce.
    pub fn is_canonical(self) -> bool {
        if self == Self::ZERO {
            return true;
        }
        (MIN_SHIFT..=MAX_SHIFT).contains(&self.shift) && self.multiplier >= 1 << 30
    }
}

/// Integer dot product of int8 weights against zero-point-corrected int8
/// inputs, seeded with an i32 bias.
#[inline]
pub fn dot_i8(weights: &[i8], input: &[i8], input_zero_point: i8, bias: i32) -> i32 {
    let zp = input_zero_point as i32;
    weights
        .iter()
        .zip(input)
        .fold(bias, |acc, (&w, &x)| {
            acc.wrapping_add(w as i32 * (x as i32 - zp))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_common_multipliers() {
        let half = QuantizedMultiplier::from_real(0.5).unwrap();
        assert_eq!(half.multiplier, 1 << 30);
        assert_eq!(half.shift, 0);

        let one = QuantizedMultiplier::from_real(1.0).unwrap();
        assert_eq!(one.multiplier, 1 << 30);
        assert_eq!(one.shift, 1);

        for m in [1e-4, 0.003_921_568, 0.25, 0.7, 1.5, 37.0] {
            let q = QuantizedMultiplier::from_real(m).unwrap();
            assert!(q.is_canonical(), "{m} -> {q:?}");
            assert!((q.to_real() - m).abs() / m < 1e-9, "{m} -> {}", q.to_real());
        }
    }

    #[test]
    fn apply_rounds_half_away_from_zero() {
        let half = QuantizedMultiplier::from_real(0.5).unwrap();
        assert_eq!(half.apply(4), 2);
        assert_eq!(half.apply(5), 3);
        assert_eq!(half.apply(-5), -3);
        assert_eq!(half.apply(0), 0);

        let m = QuantizedMultiplier::from_real(0.001).unwrap();
        assert_eq!(m.apply(123_456), 123);
        assert_eq!(m.apply(-123_456), -123);
    }

    #[test]
    fn apply_tracks_float_product() {
        for &real in &[0.0123, 0.5, 0.9999, 2.75, 100.0] {
            let m = QuantizedMultiplier::from_real(real).unwrap();
            for &x in &[-40_000, -777, -1, 1, 13, 9_999, 65_535] {
                let expected = (x as f64 * real).round();
                assert!(
                    (m.apply(x) as f64 - expected).abs() <= 1.0,
                    "{x} * {real}: {} vs {expected}",
                    m.apply(x)
                );
            }
        }
    }

    #[test]
    fn large_products_saturate() {
        let m = QuantizedMultiplier::from_real(1000.0).unwrap();
        assert_eq!(m.apply(i32::MAX), i32::MAX);
        assert_eq!(m.apply(i32::MIN), i32::MIN);
    }

    #[test]
    fn rejects_bad_multipliers() {
        assert!(QuantizedMultiplier::from_real(-1.0).is_err());
        assert!(QuantizedMultiplier::from_real(f64::NAN).is_err());
        assert!(QuantizedMultiplier::from_real(1e12).is_err());
        assert_eq!(
            QuantizedMultiplier::from_real(1e-12).unwrap(),
            QuantizedMultiplier::ZERO
        );
        assert_eq!(QuantizedMultiplier::ZERO.apply(12345), 0);
    }

    #[test]
    fn dot_corrects_zero_point() {
        // (1*(3-1)) + (-2*(1-1)) + (4*(-1-1)) + 10 = 2 + 0 - 8 + 10
        assert_eq!(dot_i8(&[1, -2, 4], &[3, 1, -1], 1, 10), 4);
        assert_eq!(dot_i8(&[127; 16], &[-128; 16], 127, 0), -127 * 255 * 16);
    }
}
