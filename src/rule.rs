//! Dead-band control rule: the analytic ground truth for every label.
//!
//! Each axis moves by a fixed velocity only when its light differential
//! strictly exceeds the threshold, in the direction of the differential.

use crate::config::RuleConstants;

/// Movement decision for both servos, in degrees per step.
pub type Movement = (f32, f32);

/// Decide the movement of one axis.
#[inline]
pub fn axis(diff: f32, rule: &RuleConstants) -> f32 {
    if diff.abs() > rule.threshold {
        if diff > 0.0 {
            rule.velocity
        } else {
            -rule.velocity
        }
    } else {
        0.0
    }
}

/// Evaluate the rule on the unnormalized differentials.
///
/// `dv = top - bottom` drives servo 1, `dh = left - right` drives servo 2.
#[inline]
pub fn evaluate(dv: f32, dh: f32, rule: &RuleConstants) -> Movement {
    (axis(dv, rule), axis(dh, rule))
}

/// Full-context entry point matching the model's input signature.
///
/// Servo positions and total luminance are accepted but do not influence
/// the decision.
#[inline]
pub fn evaluate_full(
    dv: f32,
    dh: f32,
    _pos1: f32,
    _pos2: f32,
    _soma: f32,
    rule: &RuleConstants,
) -> Movement {
    evaluate(dv, dh, rule)
}
