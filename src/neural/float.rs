//! Backend-free float model.
//!
//! The trainer hands its weights over in this form; the quantizer runs the
//! calibration forward pass on it without touching burn.

/// Layer activation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    None,
    Relu,
    Tanh,
}

impl Activation {
    #[inline]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Activation::None => x,
            Activation::Relu => x.max(0.0),
            Activation::Tanh => x.tanh(),
        }
    }

    /// Wire code used by the quantized model format.
    pub fn code(self) -> u8 {
        match self {
            Activation::None => 0,
            Activation::Relu => 1,
            Activation::Tanh => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Activation::None),
            1 => Some(Activation::Relu),
            2 => Some(Activation::Tanh),
            _ => None,
        }
    }
}

impl std::fmt::Display for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Activation::None => write!(f, "linear"),
            Activation::Relu => write!(f, "relu"),
            Activation::Tanh => write!(f, "tanh"),
        }
    }
}

/// Fully connected layer, weights row-major `[out_dim][in_dim]`.
#[derive(Clone, Debug, PartialEq)]
pub struct DenseLayer {
    pub in_dim: usize,
    pub out_dim: usize,
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
    pub activation: Activation,
}

impl DenseLayer {
    /// Weights feeding output channel `c`.
    pub fn row(&self, c: usize) -> &[f32] {
        &self.weights[c * self.in_dim..(c + 1) * self.in_dim]
    }

    /// `W·x + b`, before the activation.
    pub fn pre_activation(&self, x: &[f32]) -> Vec<f32> {
        (0..self.out_dim)
            .map(|c| {
                self.row(c)
                    .iter()
                    .zip(x)
                    .fold(self.bias[c], |acc, (w, v)| acc + w * v)
            })
            .collect()
    }

    pub fn forward(&self, x: &[f32]) -> Vec<f32> {
        let mut out = self.pre_activation(x);
        for v in out.iter_mut() {
            *v = self.activation.apply(*v);
        }
        out
    }

    pub fn is_finite(&self) -> bool {
        self.weights.iter().chain(&self.bias).all(|v| v.is_finite())
    }
}

/// Output of one layer during a traced forward pass.
#[derive(Clone, Debug)]
pub struct LayerTrace {
    pub pre: Vec<f32>,
    pub post: Vec<f32>,
}

/// Feed-forward stack of dense layers.
#[derive(Clone, Debug, PartialEq)]
pub struct FloatModel {
    pub layers: Vec<DenseLayer>,
}

impl FloatModel {
    pub fn input_dim(&self) -> usize {
        self.layers.first().map_or(0, |l| l.in_dim)
    }

    pub fn output_dim(&self) -> usize {
        self.layers.last().map_or(0, |l| l.out_dim)
    }

    pub fn param_count(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.weights.len() + l.bias.len())
            .sum()
    }

    pub fn forward(&self, x: &[f32]) -> Vec<f32> {
        self.layers
            .iter()
            .fold(x.to_vec(), |h, layer| layer.forward(&h))
    }

    /// Forward pass that keeps every layer's pre- and post-activation output.
    pub fn forward_trace(&self, x: &[f32]) -> Vec<LayerTrace> {
        let mut traces = Vec::with_capacity(self.layers.len());
        let mut h = x.to_vec();
        for layer in &self.layers {
            let pre = layer.pre_activation(&h);
            let post: Vec<f32> = pre.iter().map(|&v| layer.activation.apply(v)).collect();
            h = post.clone();
            traces.push(LayerTrace { pre, post });
        }
        traces
    }
}
