//! Dataset synthesizer.
//!
//! Draws uniform sensor/servo samples, derives features and labels. The
//! random stream sits behind [`SampleSource`] so tests can script draws.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use super::corpus::{Row, TrainingCorpus};
use super::sample::RawSample;
use crate::config::SynthConstants;
use crate::error::{Error, Result};

/// Source of raw integer draws.
pub trait SampleSource {
    /// Uniform light-sensor reading in `0..=max`.
    fn sensor(&mut self, max: u16) -> u16;
    /// Uniform servo angle in `0..=max`.
    fn servo(&mut self, max: u8) -> u8;
}

/// Adapts any `rand` generator into a [`SampleSource`].
pub struct RngSource<R>(pub R);

impl RngSource<ChaCha8Rng> {
    pub fn seeded(seed: u64) -> Self {
        Self(ChaCha8Rng::seed_from_u64(seed))
    }
}

impl<R: Rng> SampleSource for RngSource<R> {
    fn sensor(&mut self, max: u16) -> u16 {
        self.0.gen_range(0..=max)
    }

    fn servo(&mut self, max: u8) -> u8 {
        self.0.gen_range(0..=max)
    }
}

/// Synthesize `n` rows from a seeded ChaCha8 stream.
///
/// Identical seeds give identical corpora.
pub fn synthesize(n: usize, seed: u64, c: &SynthConstants) -> Result<TrainingCorpus> {
    synthesize_from(&mut RngSource::seeded(seed), n, c)
}

/// Synthesize `n` held-out rows for scoring a trained policy.
///
/// Same seed as the training corpus but ChaCha8 stream 3, so no row is
/// shared with the draws [`synthesize`] makes.
pub fn synthesize_holdout(n: usize, seed: u64, c: &SynthConstants) -> Result<TrainingCorpus> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(3);
    synthesize_from(&mut RngSource(rng), n, c)
}

/// Synthesize `n` rows from an arbitrary draw source.
///
/// Per row the draw order is top, bottom, left, right, pos1, pos2.
pub fn synthesize_from<S: SampleSource + ?Sized>(
    source: &mut S,
    n: usize,
    c: &SynthConstants,
) -> Result<TrainingCorpus> {
    if n == 0 {
        return Err(Error::config("sample count must be positive"));
    }
    if !(c.sensor_scale > 0.0 && c.servo_span > 0.0 && c.label_divisor > 0.0) {
        return Err(Error::Synthesis(format!(
            "normalization divisors must be positive: sensor {}, servo {}, label {}",
            c.sensor_scale, c.servo_span, c.label_divisor
        )));
    }

    let mut rows = Vec::with_capacity(n);
    for _ in 0..n {
        let raw = RawSample {
            top: source.sensor(c.sensor_max),
            bottom: source.sensor(c.sensor_max),
            left: source.sensor(c.sensor_max),
            right: source.sensor(c.sensor_max),
            pos1: source.servo(c.servo_max),
            pos2: source.servo(c.servo_max),
        };
        rows.push(Row {
            raw,
            features: raw.derive(c),
            label: raw.label(c),
        });
    }

    debug!(rows = rows.len(), "synthesized corpus");
    Ok(TrainingCorpus::new(rows))
}
