//! Mini-batch MSE training of the policy network.
//!
//! Adam on `Autodiff<NdArray>`, a fixed number of epochs, rows reshuffled
//! every epoch. There is no convergence check and no early stopping:
//! whatever weights exist after the last epoch are the result.

use burn::backend::{Autodiff, NdArray};
use burn::nn::loss::{MseLoss, Reduction};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use super::float::FloatModel;
use super::policy::{PolicyNet, PolicyNetConfig};
use crate::config::TrainConfig;
use crate::data::{TrainingCorpus, FEATURES, OUTPUTS};
use crate::error::{Error, Result};

/// Default training backend.
pub type TrainBackend = Autodiff<NdArray>;

/// Result of one training epoch.
pub struct EpochResult {
    /// Row-weighted mean MSE over the epoch.
    pub avg_loss: f32,
    pub num_batches: usize,
}

/// Trained weights plus the loss history.
pub struct TrainOutcome {
    pub model: FloatModel,
    pub epoch_losses: Vec<f32>,
}

/// Train on the default CPU backend.
pub fn train(corpus: &TrainingCorpus, config: &TrainConfig) -> Result<TrainOutcome> {
    let device = Default::default();
    train_with_device::<TrainBackend>(corpus, config, &device)
}

/// Train with a specific autodiff backend device.
pub fn train_with_device<B: AutodiffBackend>(
    corpus: &TrainingCorpus,
    config: &TrainConfig,
    device: &B::Device,
) -> Result<TrainOutcome> {
    if corpus.is_empty() {
        return Err(Error::Training("corpus is empty".into()));
    }
    if config.epochs == 0 || config.batch_size == 0 {
        return Err(Error::config("epochs and batch size must be positive"));
    }

    let net_config = PolicyNetConfig::new()
        .with_d_input(FEATURES)
        .with_d_output(OUTPUTS);
    let mut model = net_config.init_seeded::<B>(config.seed, device);
    let mut optimizer = create_optimizer::<B>();

    let x = corpus.feature_matrix();
    let y = corpus.label_matrix();
    let mut order: Vec<usize> = (0..corpus.len()).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    rng.set_stream(1);

    info!(
        rows = corpus.len(),
        params = net_config.param_count(),
        epochs = config.epochs,
        batch_size = config.batch_size,
        "training policy network"
    );

    let mut epoch_losses = Vec::with_capacity(config.epochs);
    for epoch in 0..config.epochs {
        order.shuffle(&mut rng);
        let (next, result) = train_epoch(
            model,
            &x,
            &y,
            &order,
            config.batch_size,
            &mut optimizer,
            config.learning_rate,
            device,
        )?;
        model = next;
        if result.avg_loss.is_finite() {
            info!(
                epoch = epoch + 1,
                loss = result.avg_loss,
                batches = result.num_batches,
                "epoch done"
            );
        } else {
            warn!(epoch = epoch + 1, "loss is not finite");
        }
        epoch_losses.push(result.avg_loss);
    }

    Ok(TrainOutcome {
        model: model.to_float_model()?,
        epoch_losses,
    })
}

/// One pass over `order` in mini-batches. The last batch may be short.
///
/// `x` is `[rows, FEATURES]`, `y` is `[rows, OUTPUTS]`, both row-major.
#[allow(clippy::too_many_arguments)]
pub fn train_epoch<B: AutodiffBackend>(
    model: PolicyNet<B>,
    x: &[f32],
    y: &[f32],
    order: &[usize],
    batch_size: usize,
    optimizer: &mut impl Optimizer<PolicyNet<B>, B>,
    lr: f64,
    device: &B::Device,
) -> Result<(PolicyNet<B>, EpochResult)> {
    let mut model = model;
    let loss_fn = MseLoss::new();
    let mut weighted_loss = 0.0f64;
    let mut num_batches = 0;

    for batch in order.chunks(batch_size) {
        let mut bx = Vec::with_capacity(batch.len() * FEATURES);
        let mut by = Vec::with_capacity(batch.len() * OUTPUTS);
        for &i in batch {
            bx.extend_from_slice(&x[i * FEATURES..(i + 1) * FEATURES]);
            by.extend_from_slice(&y[i * OUTPUTS..(i + 1) * OUTPUTS]);
        }
        let inputs =
            Tensor::<B, 2>::from_data(TensorData::new(bx, [batch.len(), FEATURES]), device);
        let targets =
            Tensor::<B, 2>::from_data(TensorData::new(by, [batch.len(), OUTPUTS]), device);

        let predictions = model.forward(inputs);
        let loss = loss_fn.forward(predictions, targets, Reduction::Mean);
        let loss_val = loss
            .clone()
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| Error::Training(format!("read loss: {e:?}")))?[0];
        weighted_loss += loss_val as f64 * batch.len() as f64;
        num_batches += 1;

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &model);
        model = optimizer.step(lr, model, grads);
    }

    let avg_loss = if order.is_empty() {
        0.0
    } else {
        (weighted_loss / order.len() as f64) as f32
    };
    Ok((
        model,
        EpochResult {
            avg_loss,
            num_batches,
        },
    ))
}

/// Adam with epsilon 1e-7.
pub fn create_optimizer<B: AutodiffBackend>() -> impl Optimizer<PolicyNet<B>, B> {
    AdamConfig::new().with_epsilon(1e-7).init()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SynthConstants;
    use crate::data::synthesize;

    #[test]
    fn loss_decreases_over_epochs() {
        let corpus = synthesize(2_000, 42, &SynthConstants::default()).unwrap();
        let config = TrainConfig {
            epochs: 4,
            batch_size: 64,
            learning_rate: 5e-3,
            seed: 42,
        };
        let outcome = train(&corpus, &config).unwrap();
        assert_eq!(outcome.epoch_losses.len(), 4);
        assert!(outcome.epoch_losses.iter().all(|l| l.is_finite()));
        let first = outcome.epoch_losses[0];
        let last = outcome.epoch_losses[3];
        assert!(last < first, "loss went from {first} to {last}");
        assert_eq!(outcome.model.input_dim(), FEATURES);
        assert_eq!(outcome.model.output_dim(), OUTPUTS);
    }

    #[test]
    fn short_last_batch_is_kept() {
        let corpus = synthesize(300, 1, &SynthConstants::default()).unwrap();
        let device = Default::default();
        let model = PolicyNetConfig::new().init_seeded::<TrainBackend>(1, &device);
        let mut optimizer = create_optimizer::<TrainBackend>();
        let order: Vec<usize> = (0..corpus.len()).collect();
        let (_, result) = train_epoch(
            model,
            &corpus.feature_matrix(),
            &corpus.label_matrix(),
            &order,
            256,
            &mut optimizer,
            1e-3,
            &device,
        )
        .unwrap();
        assert_eq!(result.num_batches, 2);
        assert!(result.avg_loss > 0.0);
    }

    #[test]
    fn empty_corpus_rejected() {
        let corpus = TrainingCorpus::new(Vec::new());
        assert!(matches!(
            train(&corpus, &TrainConfig::default()),
            Err(Error::Training(_))
        ));
    }
}
