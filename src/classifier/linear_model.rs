//! Multinomial logistic model read from a JSON file.
//!
//! File layout:
//!
//! ```json
//! {
//!   "classes": ["BENIGN", "DOS", "PROBE", "R2L", "U2R"],
//!   "weights": [[...9 values...], ...one row per class...],
//!   "bias": [0.0, 0.0, 0.0, 0.0, 0.0],
//!   "mean": [...9 values...],
//!   "scale": [...9 values...]
//! }
//! ```
//!
//! `mean` and `scale` are optional standardization parameters applied before the linear
//! layer. A zero scale leaves the feature unscaled.

use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::classifier_adapter::Classifier;
use super::types::*;
use crate::error_handling::types::ClassifierError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub classes: Vec<String>,
    pub weights: Vec<[f64; FEATURE_COUNT]>,
    pub bias: Vec<f64>,
    #[serde(default)]
    pub mean: Option<[f64; FEATURE_COUNT]>,
    #[serde(default)]
    pub scale: Option<[f64; FEATURE_COUNT]>,
}

impl LinearModel {
    pub fn from_file(path: &Path) -> Result<Self, ClassifierError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            ClassifierError::ModelLoadFailed(format!("{}: {}", path.display(), e))
        })?;
        let model = Self::from_json(&raw)?;
        info!(
            "Classifier model loaded from {} ({} classes)",
            path.display(),
            model.classes.len()
        );
        Ok(model)
    }

    pub fn from_json(raw: &str) -> Result<Self, ClassifierError> {
        let model: LinearModel = serde_json::from_str(raw)
            .map_err(|e| ClassifierError::ModelLoadFailed(e.to_string()))?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), ClassifierError> {
        if self.classes.len() < 2 {
            return Err(ClassifierError::ModelLoadFailed(
                "a model needs at least two classes".to_string(),
            ));
        }
        if self.weights.len() != self.classes.len() || self.bias.len() != self.classes.len() {
            return Err(ClassifierError::ModelLoadFailed(format!(
                "{} classes but {} weight rows and {} biases",
                self.classes.len(),
                self.weights.len(),
                self.bias.len()
            )));
        }
        let finite = self.weights.iter().flatten().all(|w| w.is_finite())
            && self.bias.iter().all(|b| b.is_finite());
        if !finite {
            return Err(ClassifierError::ModelLoadFailed(
                "non-finite model parameter".to_string(),
            ));
        }
        Ok(())
    }

    fn standardize(&self, vector: &FeatureVector) -> [f64; FEATURE_COUNT] {
        let mut x = *vector.values();
        if let Some(mean) = &self.mean {
            for (v, m) in x.iter_mut().zip(mean) {
                *v -= m;
            }
        }
        if let Some(scale) = &self.scale {
            for (v, s) in x.iter_mut().zip(scale) {
                if *s != 0.0 {
                    *v /= s;
                }
            }
        }
        x
    }

    /// Class probabilities in `classes` order.
    pub fn probabilities(&self, vector: &FeatureVector) -> Vec<f64> {
        let x = self.standardize(vector);
        let logits: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(&x).map(|(w, v)| w * v).sum::<f64>() + b)
            .collect();

        let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exp: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let total: f64 = exp.iter().sum();
        exp.into_iter().map(|e| e / total).collect()
    }
}

impl Classifier for LinearModel {
    fn predict(&self, vector: &FeatureVector) -> Result<Prediction, ClassifierError> {
        let probabilities = self.probabilities(vector);
        let (index, confidence) = probabilities
            .iter()
            .cloned()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or(ClassifierError::ModelUnavailable)?;
        if !confidence.is_finite() {
            return Err(ClassifierError::PredictionFailed(
                "probabilities overflowed".to_string(),
            ));
        }

        let class_label = self.classes[index].clone();
        Ok(Prediction {
            is_malicious: class_label != BENIGN_LABEL,
            class_label,
            confidence,
        })
    }
}
