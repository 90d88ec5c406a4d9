//! Row types and the normalization formulas shared with the firmware.

use crate::config::SynthConstants;
use crate::rule;

/// Model input width: dv, dh, pos1, pos2, soma.
pub const FEATURES: usize = 5;
/// Model output width: one movement per servo.
pub const OUTPUTS: usize = 2;

/// One draw of the four light sensors and the two servo angles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawSample {
    pub top: u16,
    pub bottom: u16,
    pub left: u16,
    pub right: u16,
    pub pos1: u8,
    pub pos2: u8,
}

impl RawSample {
    /// Vertical differential `top - bottom`.
    pub fn dv(&self) -> i32 {
        self.top as i32 - self.bottom as i32
    }

    /// Horizontal differential `left - right`.
    pub fn dh(&self) -> i32 {
        self.left as i32 - self.right as i32
    }

    /// Total luminance.
    pub fn soma(&self) -> u32 {
        self.top as u32 + self.bottom as u32 + self.left as u32 + self.right as u32
    }

    pub fn derive(&self, c: &SynthConstants) -> DerivedSample {
        normalize(
            self.dv() as f32,
            self.dh() as f32,
            self.pos1 as f32,
            self.pos2 as f32,
            self.soma() as f32 / c.soma_scale(),
            c,
        )
    }

    /// Rule output on the unnormalized differentials, scaled by the label divisor.
    pub fn label(&self, c: &SynthConstants) -> LabelPair {
        let (d1, d2) = rule::evaluate(self.dv() as f32, self.dh() as f32, &c.rule);
        LabelPair {
            d1: d1 / c.label_divisor,
            d2: d2 / c.label_divisor,
        }
    }
}

/// Map physical quantities to model features.
///
/// `soma_norm` is already divided by four times the sensor full scale, which
/// is what the firmware hands over.
pub fn normalize(
    dv: f32,
    dh: f32,
    pos1: f32,
    pos2: f32,
    soma_norm: f32,
    c: &SynthConstants,
) -> DerivedSample {
    DerivedSample {
        dv: dv / c.sensor_scale,
        dh: dh / c.sensor_scale,
        pos1: (pos1 - c.servo_center) / c.servo_span,
        pos2: (pos2 - c.servo_center) / c.servo_span,
        soma: soma_norm,
    }
}

/// Normalized model input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DerivedSample {
    pub dv: f32,
    pub dh: f32,
    pub pos1: f32,
    pub pos2: f32,
    pub soma: f32,
}

impl DerivedSample {
    /// Features in model input order.
    pub fn to_array(&self) -> [f32; FEATURES] {
        [self.dv, self.dh, self.pos1, self.pos2, self.soma]
    }
}

/// Normalized rule decision for both axes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LabelPair {
    pub d1: f32,
    pub d2: f32,
}

impl LabelPair {
    pub fn to_array(&self) -> [f32; OUTPUTS] {
        [self.d1, self.d2]
    }
}
