//! Synthetic training data.
//!
//! Raw sensor and servo draws, the normalized features the model sees,
//! and the rule-derived labels it learns.

pub mod corpus;
pub mod sample;
pub mod synth;

pub use corpus::{Row, TrainingCorpus};
pub use sample::{normalize, DerivedSample, LabelPair, RawSample, FEATURES, OUTPUTS};
pub use synth::{synthesize, synthesize_from, synthesize_holdout, RngSource, SampleSource};
