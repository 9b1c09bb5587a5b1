//! Pre-trained genre classifier, loaded once and shared read-only.

mod artifact;

pub use artifact::{ClassifierArtifact, ModelParams, StandardScaler};

use crate::audio::FEATURE_LENGTH;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Failed to read classifier at {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse classifier: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid classifier: {0}")]
    Invalid(String),
    #[error("Feature vector has {actual} values, classifier expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenrePrediction {
    pub label: String,
    /// Percentage in [0, 100].
    pub confidence: f64,
}

#[derive(Debug)]
pub struct GenreClassifier {
    artifact: ClassifierArtifact,
}

impl GenreClassifier {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ClassifierError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ClassifierError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let classifier = Self::from_json(&content)?;
        info!(
            "Loaded {} classifier from {:?} with {} classes",
            classifier.kind(),
            path,
            classifier.classes().len()
        );
        Ok(classifier)
    }

    pub fn from_json(json: &str) -> Result<Self, ClassifierError> {
        let artifact: ClassifierArtifact = serde_json::from_str(json)?;
        Self::from_artifact(artifact)
    }

    pub fn from_artifact(artifact: ClassifierArtifact) -> Result<Self, ClassifierError> {
        artifact.validate().map_err(ClassifierError::Invalid)?;
        if artifact.n_features != FEATURE_LENGTH {
            warn!(
                "Classifier expects {} features but the extractor produces {}; every prediction will fail",
                artifact.n_features, FEATURE_LENGTH
            );
        }
        Ok(GenreClassifier { artifact })
    }

    pub fn classes(&self) -> &[String] {
        &self.artifact.classes
    }

    pub fn n_features(&self) -> usize {
        self.artifact.n_features
    }

    pub fn kind(&self) -> &'static str {
        match self.artifact.model {
            ModelParams::LogisticRegression { .. } => "logistic_regression",
            ModelParams::KNearestNeighbors { .. } => "k_nearest_neighbors",
        }
    }

    pub fn predict(&self, features: &[f64]) -> Result<GenrePrediction, ClassifierError> {
        if features.len() != self.artifact.n_features {
            return Err(ClassifierError::DimensionMismatch {
                expected: self.artifact.n_features,
                actual: features.len(),
            });
        }
        let x = self.scale(features);

        let (class_index, probability) = match &self.artifact.model {
            ModelParams::LogisticRegression {
                coefficients,
                intercepts,
            } => {
                let scores: Vec<f64> = coefficients
                    .iter()
                    .zip(intercepts)
                    .map(|(row, b)| row.iter().zip(&x).map(|(w, v)| w * v).sum::<f64>() + b)
                    .collect();
                let probabilities = softmax(&scores);
                argmax(&probabilities)
            }
            ModelParams::KNearestNeighbors { k, samples, labels } => {
                let mut distances: Vec<(f64, usize)> = samples
                    .iter()
                    .zip(labels)
                    .map(|(sample, label)| {
                        let d = sample
                            .iter()
                            .zip(&x)
                            .map(|(a, b)| (a - b).powi(2))
                            .sum::<f64>();
                        (d, *label)
                    })
                    .collect();
                distances.sort_by(|a, b| a.0.total_cmp(&b.0));

                let mut votes = vec![0usize; self.artifact.classes.len()];
                for (_, label) in distances.iter().take(*k) {
                    votes[*label] += 1;
                }
                let shares: Vec<f64> = votes.iter().map(|v| *v as f64 / *k as f64).collect();
                argmax(&shares)
            }
        };

        Ok(GenrePrediction {
            label: self.artifact.classes[class_index].clone(),
            confidence: probability * 100.0,
        })
    }

    fn scale(&self, features: &[f64]) -> Vec<f64> {
        match &self.artifact.scaler {
            Some(scaler) => features
                .iter()
                .zip(scaler.mean.iter().zip(&scaler.scale))
                .map(|(x, (mean, scale))| (x - mean) / scale)
                .collect(),
            None => features.to_vec(),
        }
    }
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

/// Index and value of the largest element; the lowest index wins ties.
fn argmax(values: &[f64]) -> (usize, f64) {
    values
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, v)| {
            if v > best.1 {
                (i, v)
            } else {
                best
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn two_feature_logistic() -> GenreClassifier {
        GenreClassifier::from_json(
            &json!({
                "classes": ["blues", "metal"],
                "n_features": 2,
                "scaler": {"mean": [10.0, 0.0], "scale": [2.0, 1.0]},
                "model": {
                    "type": "logistic_regression",
                    "coefficients": [[-1.0, 0.0], [1.0, 0.0]],
                    "intercepts": [0.0, 0.0]
                }
            })
            .to_string(),
        )
        .unwrap()
    }

    #[test]
    fn logistic_regression_picks_highest_probability() {
        let classifier = two_feature_logistic();
        // Scaled first feature is +2 -> metal.
        let prediction = classifier.predict(&[14.0, 3.0]).unwrap();
        assert_eq!(prediction.label, "metal");
        let expected = 100.0 / (1.0 + (-4.0f64).exp());
        assert!((prediction.confidence - expected).abs() < 1e-9);

        let prediction = classifier.predict(&[6.0, 3.0]).unwrap();
        assert_eq!(prediction.label, "blues");
    }

    #[test]
    fn equal_scores_resolve_to_first_class() {
        let prediction = two_feature_logistic().predict(&[10.0, 0.0]).unwrap();
        assert_eq!(prediction.label, "blues");
        assert!((prediction.confidence - 50.0).abs() < 1e-9);
    }

    #[test]
    fn nearest_neighbors_votes() {
        let classifier = GenreClassifier::from_json(
            &json!({
                "classes": ["jazz", "rock", "pop"],
                "n_features": 1,
                "model": {
                    "type": "k_nearest_neighbors",
                    "k": 3,
                    "samples": [[0.0], [0.1], [0.2], [5.0], [5.1], [9.0]],
                    "labels": [0, 0, 1, 1, 1, 2]
                }
            })
            .to_string(),
        )
        .unwrap();
        assert_eq!(classifier.kind(), "k_nearest_neighbors");

        let near_zero = classifier.predict(&[0.05]).unwrap();
        assert_eq!(near_zero.label, "jazz");
        assert!((near_zero.confidence - 200.0 / 3.0).abs() < 1e-9);

        let near_five = classifier.predict(&[5.05]).unwrap();
        assert_eq!(near_five.label, "rock");
        assert!((near_five.confidence - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        let err = two_feature_logistic().predict(&[1.0; 15]).unwrap_err();
        assert!(matches!(
            err,
            ClassifierError::DimensionMismatch {
                expected: 2,
                actual: 15
            }
        ));
    }

    #[test]
    fn rejects_inconsistent_artifacts() {
        let bad_rows = json!({
            "classes": ["a", "b"],
            "n_features": 2,
            "model": {"type": "logistic_regression", "coefficients": [[1.0, 2.0]], "intercepts": [0.0, 0.0]}
        });
        assert!(matches!(
            GenreClassifier::from_json(&bad_rows.to_string()),
            Err(ClassifierError::Invalid(_))
        ));

        let bad_label = json!({
            "classes": ["a"],
            "n_features": 1,
            "model": {"type": "k_nearest_neighbors", "k": 1, "samples": [[0.0]], "labels": [3]}
        });
        assert!(matches!(
            GenreClassifier::from_json(&bad_label.to_string()),
            Err(ClassifierError::Invalid(_))
        ));

        let zero_scale = json!({
            "classes": ["a"],
            "n_features": 1,
            "scaler": {"mean": [0.0], "scale": [0.0]},
            "model": {"type": "logistic_regression", "coefficients": [[1.0]], "intercepts": [0.0]}
        });
        assert!(GenreClassifier::from_json(&zero_scale.to_string()).is_err());

        let duplicate_classes = json!({
            "classes": ["a", "a"],
            "n_features": 1,
            "model": {"type": "logistic_regression", "coefficients": [[1.0], [1.0]], "intercepts": [0.0, 0.0]}
        });
        assert!(GenreClassifier::from_json(&duplicate_classes.to_string()).is_err());
    }

    #[test]
    fn unknown_model_type_fails_to_parse() {
        let json = json!({
            "classes": ["a"],
            "n_features": 1,
            "model": {"type": "random_forest"}
        });
        assert!(matches!(
            GenreClassifier::from_json(&json.to_string()),
            Err(ClassifierError::Parse(_))
        ));
    }

    #[test]
    fn load_reports_missing_file() {
        assert!(matches!(
            GenreClassifier::load("/nonexistent/genre_classifier.json"),
            Err(ClassifierError::Read { .. })
        ));
    }
}
