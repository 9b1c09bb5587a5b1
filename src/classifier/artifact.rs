//! On-disk representation of a trained classifier.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierArtifact {
    pub classes: Vec<String>,
    pub n_features: usize,
    #[serde(default)]
    pub scaler: Option<StandardScaler>,
    pub model: ModelParams,
}

/// Per-feature `(x - mean) / scale`, applied before the model.
#[derive(Debug, Clone, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ModelParams {
    /// One weight row and one intercept per class, softmax over the scores.
    #[serde(rename = "logistic_regression")]
    LogisticRegression {
        coefficients: Vec<Vec<f64>>,
        intercepts: Vec<f64>,
    },
    /// Majority vote among the `k` nearest training samples. Labels index
    /// into `classes`.
    #[serde(rename = "k_nearest_neighbors")]
    KNearestNeighbors {
        k: usize,
        samples: Vec<Vec<f64>>,
        labels: Vec<usize>,
    },
}

impl ClassifierArtifact {
    /// Checks that every array agrees with `classes` and `n_features`.
    pub fn validate(&self) -> Result<(), String> {
        if self.classes.is_empty() {
            return Err("classifier has no classes".to_string());
        }
        let mut sorted = self.classes.clone();
        sorted.sort();
        sorted.dedup();
        if sorted.len() != self.classes.len() {
            return Err("classifier classes are not unique".to_string());
        }
        if self.classes.iter().any(|c| c.trim().is_empty()) {
            return Err("classifier has a blank class name".to_string());
        }
        if self.n_features == 0 {
            return Err("n_features must be positive".to_string());
        }

        if let Some(scaler) = &self.scaler {
            if scaler.mean.len() != self.n_features || scaler.scale.len() != self.n_features {
                return Err(format!(
                    "scaler has {} means and {} scales, expected {}",
                    scaler.mean.len(),
                    scaler.scale.len(),
                    self.n_features
                ));
            }
            if scaler.scale.iter().any(|s| *s == 0.0 || !s.is_finite()) {
                return Err("scaler contains a zero or non-finite scale".to_string());
            }
        }

        match &self.model {
            ModelParams::LogisticRegression {
                coefficients,
                intercepts,
            } => {
                if coefficients.len() != self.classes.len() || intercepts.len() != self.classes.len()
                {
                    return Err(format!(
                        "logistic regression has {} coefficient rows and {} intercepts for {} classes",
                        coefficients.len(),
                        intercepts.len(),
                        self.classes.len()
                    ));
                }
                if let Some(row) = coefficients.iter().find(|r| r.len() != self.n_features) {
                    return Err(format!(
                        "coefficient row has {} weights, expected {}",
                        row.len(),
                        self.n_features
                    ));
                }
            }
            ModelParams::KNearestNeighbors { k, samples, labels } => {
                if *k == 0 || *k > samples.len() {
                    return Err(format!("k = {} with {} samples", k, samples.len()));
                }
                if labels.len() != samples.len() {
                    return Err(format!(
                        "{} labels for {} samples",
                        labels.len(),
                        samples.len()
                    ));
                }
                if let Some(label) = labels.iter().find(|l| **l >= self.classes.len()) {
                    return Err(format!("label {} is not a class index", label));
                }
                if samples.iter().any(|s| s.len() != self.n_features) {
                    return Err(format!(
                        "training sample length differs from n_features = {}",
                        self.n_features
                    ));
                }
            }
        }
        Ok(())
    }
}
