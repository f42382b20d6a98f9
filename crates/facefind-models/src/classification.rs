//! Classification results and label sets.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors interpreting a classifier's output.
#[derive(Debug, Error, PartialEq)]
pub enum LabelError {
    #[error("Label set is empty")]
    Empty,

    #[error("Classifier produced {got} scores but the label set has {expected} labels")]
    Mismatch { expected: usize, got: usize },

    #[error("Classifier produced an empty distribution")]
    EmptyDistribution,

    #[error("Classifier produced a non-finite score at index {0}")]
    NotFinite(usize),
}

/// Ordered set of identity labels, indexed by classifier class index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Labels(Vec<String>);

impl Labels {
    pub fn new(labels: Vec<String>) -> Result<Self, LabelError> {
        if labels.is_empty() {
            return Err(LabelError::Empty);
        }
        Ok(Self(labels))
    }

    /// Parse a label file: either a JSON array of strings, or one label per
    /// line with blank lines ignored.
    pub fn parse(content: &str) -> Result<Self, LabelError> {
        let trimmed = content.trim_start();
        if trimmed.starts_with('[') {
            if let Ok(labels) = serde_json::from_str::<Vec<String>>(trimmed) {
                return Self::new(labels);
            }
        }

        let labels = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self::new(labels)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Label and probability of the argmax class for one face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Index of the argmax class
    pub class_index: usize,
    /// Label of the argmax class
    pub label: String,
    /// Probability of the argmax class (0.0-1.0)
    pub probability: f64,
}

impl ClassificationResult {
    pub fn new(class_index: usize, label: impl Into<String>, probability: f64) -> Self {
        Self {
            class_index,
            label: label.into(),
            probability,
        }
    }

    /// Interpret a probability distribution over `labels`.
    ///
    /// Ties resolve to the lowest class index.
    pub fn from_distribution(scores: &[f32], labels: &Labels) -> Result<Self, LabelError> {
        if scores.is_empty() {
            return Err(LabelError::EmptyDistribution);
        }
        if scores.len() != labels.len() {
            return Err(LabelError::Mismatch {
                expected: labels.len(),
                got: scores.len(),
            });
        }

        let mut best = 0usize;
        for (index, score) in scores.iter().enumerate() {
            if !score.is_finite() {
                return Err(LabelError::NotFinite(index));
            }
            if *score > scores[best] {
                best = index;
            }
        }

        let label = labels.get(best).ok_or(LabelError::Mismatch {
            expected: labels.len(),
            got: scores.len(),
        })?;

        Ok(Self::new(best, label, scores[best] as f64))
    }
}
