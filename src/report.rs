//! How faithfully the exported policy reproduces the dead-band rule.
//!
//! Three gaps are measured on a corpus: float model vs labels, quantized vs
//! float model, and discrete movement decisions vs the rule itself.

use statrs::statistics::Statistics;

use crate::config::SynthConstants;
use crate::data::TrainingCorpus;
use crate::error::{Error, Result};
use crate::neural::FloatModel;
use crate::quant::QuantizedModel;
use crate::rule;

#[derive(Clone, Debug, PartialEq)]
pub struct AgreementReport {
    pub rows: usize,
    /// Float model MSE against the normalized labels.
    pub float_mse: f64,
    /// Quantized model MSE against the normalized labels.
    pub quant_mse: f64,
    /// Largest |quantized - float| over all outputs.
    pub max_deviation: f64,
    pub mean_deviation: f64,
    /// Share of axis decisions where the float model picks the rule's move.
    pub float_agreement: f64,
    /// Same for the quantized model.
    pub quant_agreement: f64,
}

impl std::fmt::Display for AgreementReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} rows: mse float {:.5} quant {:.5}, deviation max {:.4} mean {:.4}, \
             agreement float {:.1}% quant {:.1}%",
            self.rows,
            self.float_mse,
            self.quant_mse,
            self.max_deviation,
            self.mean_deviation,
            self.float_agreement * 100.0,
            self.quant_agreement * 100.0
        )
    }
}

/// Snap a normalized model output to the nearest rule movement.
pub fn decide(output: f32, c: &SynthConstants) -> f32 {
    let velocity = c.rule.velocity;
    let steps = (output * c.label_divisor / velocity).round().clamp(-1.0, 1.0);
    steps * velocity
}

/// Score both models on every row of `corpus`, normally rows held out from
/// training.
pub fn evaluate(
    float: &FloatModel,
    quant: &QuantizedModel,
    corpus: &TrainingCorpus,
    c: &SynthConstants,
) -> Result<AgreementReport> {
    if corpus.is_empty() {
        return Err(Error::config("cannot report on an empty corpus"));
    }

    let n = corpus.len() * 2;
    let mut float_sq = Vec::with_capacity(n);
    let mut quant_sq = Vec::with_capacity(n);
    let mut deviation = Vec::with_capacity(n);
    let (mut float_hits, mut quant_hits) = (0usize, 0usize);

    for row in corpus.rows() {
        let x = row.features.to_array();
        let yf = float.forward(&x);
        let yq = quant.predict(&x)?;
        let (m1, m2) = rule::evaluate(row.raw.dv() as f32, row.raw.dh() as f32, &c.rule);
        for (i, (&label, want)) in row.label.to_array().iter().zip([m1, m2]).enumerate() {
            float_sq.push(((yf[i] - label) as f64).powi(2));
            quant_sq.push(((yq[i] - label) as f64).powi(2));
            deviation.push((yq[i] - yf[i]).abs() as f64);
            float_hits += usize::from(decide(yf[i], c) == want);
            quant_hits += usize::from(decide(yq[i], c) == want);
        }
    }

    Ok(AgreementReport {
        rows: corpus.len(),
        float_mse: float_sq.iter().mean(),
        quant_mse: quant_sq.iter().mean(),
        max_deviation: deviation.iter().abs_max(),
        mean_deviation: deviation.iter().mean(),
        float_agreement: float_hits as f64 / n as f64,
        quant_agreement: quant_hits as f64 / n as f64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthesize;
    use crate::neural::{Activation, DenseLayer};
    use crate::quant::test_support::glorot_policy;
    use crate::quant::{quantize, CalibrationSet, InputDomain};

    #[test]
    fn decide_snaps_to_rule_moves() {
        let c = SynthConstants::default();
        assert_eq!(decide(2.0 / 3.0, &c), 2.0);
        assert_eq!(decide(-0.6, &c), -2.0);
        assert_eq!(decide(0.1, &c), 0.0);
        assert_eq!(decide(0.99, &c), 2.0);
    }

    /// Float model that outputs `tanh(k * dv)`, `tanh(k * dh)`: a smooth
    /// stand-in for the dead-band rule.
    fn soft_rule() -> FloatModel {
        let k = 200.0;
        FloatModel {
            layers: vec![DenseLayer {
                in_dim: 5,
                out_dim: 2,
                weights: vec![k, 0.0, 0.0, 0.0, 0.0, 0.0, k, 0.0, 0.0, 0.0],
                bias: vec![0.0, 0.0],
                activation: Activation::Tanh,
            }],
        }
    }

    #[test]
    fn smooth_rule_mostly_agrees() {
        let c = SynthConstants::default();
        let corpus = synthesize(3_000, 42, &c).unwrap();
        let float = soft_rule();
        let set = CalibrationSet::draw(&corpus, 4, 256, 1);
        let quant = quantize(&float, &set, InputDomain::default()).unwrap();
        let report = evaluate(&float, &quant, &corpus, &c).unwrap();
        assert_eq!(report.rows, 3_000);
        // Only differentials inside a narrow band around the threshold
        // disagree; they are a few percent of uniform draws.
        assert!(report.float_agreement > 0.9, "{report}");
        assert!(report.quant_agreement > 0.9, "{report}");
        // The steep slope makes the transition band coarse once quantized,
        // but saturated rows dominate.
        assert!(report.mean_deviation < 0.05, "{report}");
        assert!(report.mean_deviation <= report.max_deviation);
    }

    #[test]
    fn untrained_model_reports_finite_numbers() {
        let c = SynthConstants::default();
        let corpus = synthesize(500, 3, &c).unwrap();
        let float = glorot_policy(2);
        let set = CalibrationSet::draw(&corpus, 2, 256, 3);
        let quant = quantize(&float, &set, InputDomain::default()).unwrap();
        let report = evaluate(&float, &quant, &corpus, &c).unwrap();
        assert!(report.float_mse.is_finite() && report.quant_mse.is_finite());
        assert!((0.0..=1.0).contains(&report.float_agreement));
    }

    #[test]
    fn empty_corpus_is_rejected() {
        let c = SynthConstants::default();
        let corpus = TrainingCorpus::new(Vec::new());
        let float = glorot_policy(2);
        let set = CalibrationSet::draw(&synthesize(100, 1, &c).unwrap(), 1, 64, 1);
        let quant = quantize(&float, &set, InputDomain::default()).unwrap();
        assert!(evaluate(&float, &quant, &corpus, &c).is_err());
    }
}
