//! Model trainer: fits the 5 → 16 → 16 → 2 policy regressor.
//!
//! The optimizer is burn's Adam on the NdArray autodiff backend. Training
//! produces a backend-free [`FloatModel`] that the quantizer consumes.
//!
//! ```ignore
//! use heliostat::neural;
//! let outcome = neural::train(&corpus, &config.train)?;
//! let float_model = outcome.model;
//! ```

pub mod float;
pub mod policy;
pub mod train;

pub use float::{Activation, DenseLayer, FloatModel, LayerTrace};
pub use policy::{PolicyNet, PolicyNetConfig};
pub use train::{train, train_with_device, TrainBackend, TrainOutcome};
