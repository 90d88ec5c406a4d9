//! The synthesized training corpus.

use super::sample::{DerivedSample, LabelPair, RawSample, FEATURES};
use crate::config::SynthConstants;

/// One corpus row. The raw draw is kept so labels stay auditable.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Row {
    pub raw: RawSample,
    pub features: DerivedSample,
    pub label: LabelPair,
}

/// Ordered, immutable collection of rows.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingCorpus {
    rows: Vec<Row>,
}

impl TrainingCorpus {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Feature rows in model input order.
    pub fn feature_rows(&self) -> impl ExactSizeIterator<Item = [f32; FEATURES]> + '_ {
        self.rows.iter().map(|r| r.features.to_array())
    }

    /// Row-major `[len, FEATURES]` feature matrix.
    pub fn feature_matrix(&self) -> Vec<f32> {
        self.rows
            .iter()
            .flat_map(|r| r.features.to_array())
            .collect()
    }

    /// Row-major `[len, OUTPUTS]` label matrix.
    pub fn label_matrix(&self) -> Vec<f32> {
        self.rows.iter().flat_map(|r| r.label.to_array()).collect()
    }

    /// Check that every label equals the rule applied to its raw draw.
    ///
    /// Returns the index of the first mismatching row.
    pub fn verify_labels(&self, c: &SynthConstants) -> Result<(), usize> {
        match self.rows.iter().position(|r| r.raw.label(c) != r.label) {
            Some(i) => Err(i),
            None => Ok(()),
        }
    }
}
