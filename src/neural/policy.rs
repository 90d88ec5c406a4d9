//! The policy regressor in burn: 5 → 16 → 16 → 2.
//!
//! ReLU on both hidden layers, tanh on the output so predictions share the
//! label range.

use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::{relu, tanh};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::float::{Activation, DenseLayer, FloatModel};
use crate::error::Error;

/// Policy network configuration.
#[derive(Config, Debug)]
pub struct PolicyNetConfig {
    #[config(default = 5)]
    pub d_input: usize,
    #[config(default = 16)]
    pub d_hidden: usize,
    #[config(default = 2)]
    pub d_output: usize,
}

/// Two hidden ReLU layers and a tanh head.
#[derive(Module, Debug)]
pub struct PolicyNet<B: Backend> {
    hidden1: Linear<B>,
    hidden2: Linear<B>,
    head: Linear<B>,
}

impl PolicyNetConfig {
    /// Initialize with burn's default initializer.
    pub fn init<B: Backend>(&self, device: &B::Device) -> PolicyNet<B> {
        PolicyNet {
            hidden1: LinearConfig::new(self.d_input, self.d_hidden).init(device),
            hidden2: LinearConfig::new(self.d_hidden, self.d_hidden).init(device),
            head: LinearConfig::new(self.d_hidden, self.d_output).init(device),
        }
    }

    /// Initialize with Glorot-uniform weights drawn from a seeded stream and
    /// zero biases, so a given seed always starts from the same weights.
    pub fn init_seeded<B: Backend>(&self, seed: u64, device: &B::Device) -> PolicyNet<B> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut net = self.init::<B>(device);
        glorot(&mut net.hidden1, self.d_input, self.d_hidden, &mut rng, device);
        glorot(&mut net.hidden2, self.d_hidden, self.d_hidden, &mut rng, device);
        glorot(&mut net.head, self.d_hidden, self.d_output, &mut rng, device);
        net
    }

    /// Parameter count for the configured topology.
    pub fn param_count(&self) -> usize {
        (self.d_input + 1) * self.d_hidden
            + (self.d_hidden + 1) * self.d_hidden
            + (self.d_hidden + 1) * self.d_output
    }
}

fn glorot<B: Backend>(
    layer: &mut Linear<B>,
    d_in: usize,
    d_out: usize,
    rng: &mut ChaCha8Rng,
    device: &B::Device,
) {
    let limit = (6.0 / (d_in + d_out) as f64).sqrt() as f32;
    let weights: Vec<f32> = (0..d_in * d_out)
        .map(|_| rng.gen_range(-limit..=limit))
        .collect();
    layer.weight = Param::from_tensor(Tensor::from_data(
        TensorData::new(weights, [d_in, d_out]),
        device,
    ));
    layer.bias = Some(Param::from_tensor(Tensor::zeros([d_out], device)));
}

impl<B: Backend> PolicyNet<B> {
    /// `x`: [batch, d_input] → [batch, d_output] in (-1, 1).
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let h = relu(self.hidden1.forward(x));
        let h = relu(self.hidden2.forward(h));
        tanh(self.head.forward(h))
    }

    /// Copy the learned weights out of the backend.
    pub fn to_float_model(&self) -> crate::error::Result<FloatModel> {
        Ok(FloatModel {
            layers: vec![
                dense_from_linear(&self.hidden1, Activation::Relu)?,
                dense_from_linear(&self.hidden2, Activation::Relu)?,
                dense_from_linear(&self.head, Activation::Tanh)?,
            ],
        })
    }
}

/// burn stores `Linear` weights as `[d_in, d_out]`; transpose to `[out][in]`.
fn dense_from_linear<B: Backend>(
    linear: &Linear<B>,
    activation: Activation,
) -> crate::error::Result<DenseLayer> {
    let [d_in, d_out] = linear.weight.dims();
    let stored = linear
        .weight
        .val()
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| Error::Training(format!("read weights: {e:?}")))?;

    let mut weights = vec![0.0f32; d_in * d_out];
    for i in 0..d_in {
        for o in 0..d_out {
            weights[o * d_in + i] = stored[i * d_out + o];
        }
    }

    let bias = match &linear.bias {
        Some(b) => b
            .val()
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| Error::Training(format!("read bias: {e:?}")))?,
        None => vec![0.0; d_out],
    };

    Ok(DenseLayer {
        in_dim: d_in,
        out_dim: d_out,
        weights,
        bias,
        activation,
    })
}
