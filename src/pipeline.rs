//! The export run, stage by stage: synthesize, train, calibrate, quantize,
//! score, emit.

use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::data::{synthesize, synthesize_holdout, TrainingCorpus};
use crate::emit::{self, EmittedArtifact};
use crate::error::{Error, Result};
use crate::neural::{self, FloatModel};
use crate::quant::{quantize, CalibrationSet, InputDomain, QuantizedModel};
use crate::report::{self, AgreementReport};

/// Everything a run produced, for callers that want more than the files.
#[derive(Clone, Debug)]
pub struct PipelineOutcome {
    pub corpus: TrainingCorpus,
    pub epoch_losses: Vec<f32>,
    pub float_model: FloatModel,
    pub model: QuantizedModel,
    /// Share of corpus feature values the input params saturate.
    pub input_clip_fraction: f32,
    /// Agreement scored on rows the model never trained on.
    pub report: AgreementReport,
    pub artifact: EmittedArtifact,
}

/// Run the whole export. Files are written only after every earlier stage
/// has succeeded.
pub fn run(config: &PipelineConfig) -> Result<PipelineOutcome> {
    config.validate()?;
    let c = &config.synth;

    let corpus = synthesize(config.samples, config.seed, c)?;
    corpus.verify_labels(c).map_err(|row| {
        Error::Synthesis(format!("row {row}: label disagrees with the rule"))
    })?;
    info!(rows = corpus.len(), seed = config.seed, "synthesized corpus");

    let trained = neural::train(&corpus, &config.train)?;

    let cal = &config.calibration;
    let set = CalibrationSet::draw(&corpus, cal.rounds, cal.batch_size, cal.seed);
    let model = quantize(&trained.model, &set, InputDomain::from(cal))?;

    let input_clip_fraction = model.input.clip_fraction(&corpus.feature_matrix());
    if input_clip_fraction > 0.0 {
        warn!(
            fraction = input_clip_fraction,
            params = %model.input,
            "input quantization saturates part of the corpus"
        );
    }

    let holdout = synthesize_holdout(config.holdout, config.seed, c)?;
    let report = report::evaluate(&trained.model, &model, &holdout, c)?;
    info!(rows = holdout.len(), %report, "held-out policy agreement");

    let bytes = model.to_bytes();
    // The bytes must decode to the same model before they leave the process.
    if QuantizedModel::from_bytes(&bytes)? != model {
        return Err(Error::Format(crate::error::FormatError::InvalidLayer {
            layer: 0,
            reason: "encoded model does not decode to itself".into(),
        }));
    }
    info!(bytes = bytes.len(), layers = model.layers.len(), "quantized model");

    let artifact = emit::write_artifacts(&bytes, &config.output)?;
    println!("[OK] model exported successfully");

    Ok(PipelineOutcome {
        corpus,
        epoch_losses: trained.epoch_losses,
        float_model: trained.model,
        model,
        input_clip_fraction,
        report,
        artifact,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.samples = 0;
        config.output.dir = dir.path().to_path_buf();
        assert!(matches!(run(&config), Err(Error::Config(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn out_of_domain_calibration_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.samples = 300;
        config.train.epochs = 1;
        config.calibration.rounds = 1;
        // Declared domain narrower than the normalized features.
        config.calibration.input_min = -0.1;
        config.calibration.input_max = 0.1;
        config.output.dir = dir.path().to_path_buf();
        assert!(matches!(
            run(&config),
            Err(Error::Quant(crate::error::QuantError::CalibrationOutOfDomain { .. }))
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
