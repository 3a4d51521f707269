//! Result ranking
//!
//! Pairs each output score with its label, sorts by descending score and
//! applies the acceptance threshold to the top entry.

use std::cmp::Ordering;

use super::engine::EngineError;
use super::labels::{LabelTable, MetadataTable};

/// One classified product
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Index into the label table
    pub index: usize,
    /// Class label
    pub label: String,
    /// Model score (0.0 - 1.0)
    pub score: f32,
    /// Product weight, if known
    pub weight: Option<String>,
    /// Product description, if known
    pub description: Option<String>,
}

impl Prediction {
    /// Whether the score meets the acceptance threshold
    pub fn is_accepted(&self, threshold: f32) -> bool {
        self.score >= threshold
    }
}

/// Predictions sorted by descending score, ties in label order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ranking {
    predictions: Vec<Prediction>,
}

impl Ranking {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Rank a raw score vector against the label table.
    ///
    /// The score vector must have exactly one entry per label.
    pub fn from_scores(
        scores: &[f32],
        labels: &LabelTable,
        metadata: &MetadataTable,
    ) -> Result<Self, EngineError> {
        if scores.len() != labels.len() {
            return Err(EngineError::LabelMismatch {
                labels: labels.len(),
                outputs: scores.len(),
            });
        }

        let mut predictions: Vec<Prediction> = scores
            .iter()
            .enumerate()
            .map(|(index, &score)| {
                let info = metadata.get(index).cloned().unwrap_or_default();
                Prediction {
                    index,
                    label: labels.get(index).unwrap_or_default().to_string(),
                    score,
                    weight: info.weight,
                    description: info.description,
                }
            })
            .collect();

        // sort_by is stable: equal scores keep label-table order
        predictions.sort_by(|a, b| descending(a.score, b.score));

        Ok(Self { predictions })
    }

    /// Highest scoring prediction regardless of threshold
    pub fn top(&self) -> Option<&Prediction> {
        self.predictions.first()
    }

    /// Highest scoring prediction if it meets `threshold`
    pub fn best(&self, threshold: f32) -> Option<&Prediction> {
        self.top().filter(|p| p.is_accepted(threshold))
    }

    pub fn predictions(&self) -> &[Prediction] {
        &self.predictions
    }

    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }

    /// "Label = x, Score = y" lines for debug logging
    pub fn describe(&self) -> String {
        self.predictions
            .iter()
            .map(|p| format!("Label = {}, Score = {}", p.label, p.score))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Descending order with NaN sorted last
fn descending(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}
