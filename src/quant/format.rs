//! Byte layout of the quantized model.
//!
//! Little-endian, no padding, no alignment. Float scales are metadata for
//! converting at the model boundary and for inspection; inference itself
//! needs only the integer fields.
//!
//! ```text
//! "HQ8\0" | layer_count u8 | input params | output params | layers...
//! params = scale f32, zero_point i8
//! layer  = in u16, out u16, activation u8,
//!          input params, accum params, output params,
//!          weights i8[out*in], weight_scales f32[out], bias i32[out],
//!          multiplier i32[out], shift i8[out], [lut i8[256] if tanh]
//! ```

use crate::error::FormatError;
use crate::neural::Activation;

use super::fixed::QuantizedMultiplier;
use super::params::QuantParams;

pub const MAGIC: [u8; 4] = *b"HQ8\0";
/// Entries in a tanh lookup table, one per int8 value.
pub const LUT_SIZE: usize = 256;

/// One integer dense layer.
#[derive(Clone, Debug, PartialEq)]
pub struct QuantizedLayer {
    pub in_dim: usize,
    pub out_dim: usize,
    pub activation: Activation,
    pub input: QuantParams,
    /// Domain the accumulator is requantized into.
    pub accum: QuantParams,
    pub output: QuantParams,
    /// Row-major `[out_dim][in_dim]`, symmetric, zero-point 0.
    pub weights: Vec<i8>,
    pub weight_scales: Vec<f32>,
    /// Scale `input.scale * weight_scales[c]`, zero-point 0.
    pub bias: Vec<i32>,
    pub multipliers: Vec<QuantizedMultiplier>,
    /// Maps `accum` values to `output` values; tanh layers only.
    pub lut: Option<Vec<i8>>,
}

impl QuantizedLayer {
    pub fn row(&self, c: usize) -> &[i8] {
        &self.weights[c * self.in_dim..(c + 1) * self.in_dim]
    }
}

/// Decoded full-integer model.
#[derive(Clone, Debug, PartialEq)]
pub struct QuantizedModel {
    pub input: QuantParams,
    pub output: QuantParams,
    pub layers: Vec<QuantizedLayer>,
}

impl QuantizedModel {
    pub fn input_dim(&self) -> usize {
        self.layers.first().map_or(0, |l| l.in_dim)
    }

    pub fn output_dim(&self) -> usize {
        self.layers.last().map_or(0, |l| l.out_dim)
    }

    /// Serialize to the wire layout. Counts and dimensions are written at
    /// their wire widths; call [`Self::validate`] first on hand-built models.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::default();
        w.bytes(&MAGIC);
        w.u8(self.layers.len() as u8);
        w.params(self.input);
        w.params(self.output);
        for layer in &self.layers {
            w.u16(layer.in_dim as u16);
            w.u16(layer.out_dim as u16);
            w.u8(layer.activation.code());
            w.params(layer.input);
            w.params(layer.accum);
            w.params(layer.output);
            for &q in &layer.weights {
                w.i8(q);
            }
            for &s in &layer.weight_scales {
                w.f32(s);
            }
            for &b in &layer.bias {
                w.i32(b);
            }
            for m in &layer.multipliers {
                w.i32(m.multiplier);
            }
            for m in &layer.multipliers {
                w.i8(m.shift);
            }
            if let Some(lut) = &layer.lut {
                for &q in lut {
                    w.i8(q);
                }
            }
        }
        w.buf
    }

    /// Parse and validate the wire layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        let mut r = Reader::new(bytes);
        if r.take(4)? != MAGIC.as_slice() {
            return Err(FormatError::BadMagic);
        }
        let layer_count = r.u8()? as usize;
        if layer_count == 0 {
            return Err(FormatError::NoLayers);
        }
        let input = r.params()?;
        let output = r.params()?;

        let mut layers = Vec::with_capacity(layer_count);
        for _ in 0..layer_count {
            let in_dim = r.u16()? as usize;
            let out_dim = r.u16()? as usize;
            let code = r.u8()?;
            let activation =
                Activation::from_code(code).ok_or(FormatError::UnknownActivation(code))?;
            let layer_input = r.params()?;
            let accum = r.params()?;
            let layer_output = r.params()?;

            let weights: Vec<i8> = r
                .take(in_dim * out_dim)?
                .iter()
                .map(|&b| b as i8)
                .collect();
            let weight_scales: Vec<f32> =
                (0..out_dim).map(|_| r.f32()).collect::<Result<_, _>>()?;
            let bias: Vec<i32> = (0..out_dim).map(|_| r.i32()).collect::<Result<_, _>>()?;
            let mults: Vec<i32> = (0..out_dim).map(|_| r.i32()).collect::<Result<_, _>>()?;
            let shifts = r.take(out_dim)?;
            let multipliers = mults
                .iter()
                .zip(shifts)
                .map(|(&multiplier, &shift)| QuantizedMultiplier {
                    multiplier,
                    shift: shift as i8,
                })
                .collect();
            let lut = if activation == Activation::Tanh {
                Some(r.take(LUT_SIZE)?.iter().map(|&b| b as i8).collect())
            } else {
                None
            };

            layers.push(QuantizedLayer {
                in_dim,
                out_dim,
                activation,
                input: layer_input,
                accum,
                output: layer_output,
                weights,
                weight_scales,
                bias,
                multipliers,
                lut,
            });
        }
        if r.remaining() > 0 {
            return Err(FormatError::TrailingBytes(r.remaining()));
        }

        let model = Self {
            input,
            output,
            layers,
        };
        model.validate()?;
        Ok(model)
    }

    /// Structural checks shared by the decoder and the quantizer.
    pub fn validate(&self) -> Result<(), FormatError> {
        if self.layers.is_empty() {
            return Err(FormatError::NoLayers);
        }
        if self.layers.len() > u8::MAX as usize {
            return Err(FormatError::TooManyLayers(self.layers.len()));
        }
        let invalid = |layer: usize, reason: String| FormatError::InvalidLayer { layer, reason };

        for (i, layer) in self.layers.iter().enumerate() {
            if layer.in_dim == 0 || layer.out_dim == 0 {
                return Err(invalid(i, "zero dimension".into()));
            }
            if layer.in_dim > u16::MAX as usize || layer.out_dim > u16::MAX as usize {
                return Err(invalid(
                    i,
                    format!("{}x{} does not fit u16 dimensions", layer.out_dim, layer.in_dim),
                ));
            }
            // Every per-channel table is indexed by output channel during inference.
            let lengths = [
                ("weights", layer.weights.len(), layer.in_dim * layer.out_dim),
                ("weight scales", layer.weight_scales.len(), layer.out_dim),
                ("bias", layer.bias.len(), layer.out_dim),
                ("multipliers", layer.multipliers.len(), layer.out_dim),
            ];
            for (name, actual, expected) in lengths {
                if actual != expected {
                    return Err(invalid(i, format!("{name}: {actual} entries, expected {expected}")));
                }
            }
            for (name, p) in [
                ("input", layer.input),
                ("accum", layer.accum),
                ("output", layer.output),
            ] {
                if !p.is_valid() {
                    return Err(invalid(i, format!("{name} scale {} is invalid", p.scale)));
                }
            }
            if layer.weight_scales.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
                return Err(invalid(i, "non-positive weight scale".into()));
            }
            if let Some(m) = layer.multipliers.iter().find(|m| !m.is_canonical()) {
                return Err(invalid(i, format!("non-canonical multiplier {m:?}")));
            }
            if layer.weights.iter().any(|&w| w == i8::MIN) {
                return Err(invalid(i, "weights must be symmetric in [-127, 127]".into()));
            }
            match (layer.activation, &layer.lut) {
                (Activation::Tanh, Some(lut)) if lut.len() == LUT_SIZE => {}
                (Activation::Tanh, _) => {
                    return Err(invalid(i, "tanh without lookup table".into()));
                }
                (_, Some(_)) => {
                    return Err(invalid(i, "lookup table on non-tanh layer".into()));
                }
                (_, None) => {
                    if layer.accum != layer.output {
                        return Err(invalid(i, "output params differ from accumulator".into()));
                    }
                }
            }
            if i > 0 {
                let prev = &self.layers[i - 1];
                if prev.out_dim != layer.in_dim {
                    return Err(invalid(
                        i,
                        format!(
                            "expects {} inputs, previous layer gives {}",
                            layer.in_dim, prev.out_dim
                        ),
                    ));
                }
                if prev.output != layer.input {
                    return Err(invalid(i, "input params differ from previous output".into()));
                }
            }
        }

        let first = &self.layers[0];
        let last = &self.layers[self.layers.len() - 1];
        if first.input != self.input {
            return Err(invalid(0, "model input params differ from first layer".into()));
        }
        if last.output != self.output {
            return Err(invalid(
                self.layers.len() - 1,
                "model output params differ from last layer".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn i8(&mut self, v: i8) {
        self.buf.push(v as u8);
    }

    fn u16(&mut self, v: u16) {
        self.bytes(&v.to_le_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.bytes(&v.to_le_bytes());
    }

    fn f32(&mut self, v: f32) {
        self.bytes(&v.to_le_bytes());
    }

    fn params(&mut self, p: QuantParams) {
        self.f32(p.scale);
        self.i8(p.zero_point);
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        if self.remaining() < n {
            return Err(FormatError::Truncated {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], FormatError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, FormatError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn i32(&mut self) -> Result<i32, FormatError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn f32(&mut self) -> Result<f32, FormatError> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    fn params(&mut self) -> Result<QuantParams, FormatError> {
        let scale = self.f32()?;
        let zero_point = self.u8()? as i8;
        Ok(QuantParams { scale, zero_point })
    }
}
