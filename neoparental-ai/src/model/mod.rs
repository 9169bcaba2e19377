//! Model capabilities
//!
//! A served model is either a classifier (class probabilities) or a
//! regressor (one continuous value). The variant is chosen once, when the
//! artifact is loaded, and never re-inspected per request.

pub mod artifact;
pub mod forest;
pub mod loader;

use ndarray::ArrayView1;
use serde::Serialize;
use std::fmt;

use crate::error::InferenceError;
use crate::features::FeatureVector;

pub use artifact::ArtifactModel;
pub use loader::{load_artifact, load_model, ModelContext, ModelMetadata};

/// Model capability tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Classifier,
    Regressor,
}

impl ModelKind {
    /// Any class name containing "Classifier" is a classifier
    pub fn from_class_name(class_name: &str) -> Self {
        if class_name.contains("Classifier") {
            ModelKind::Classifier
        } else {
            ModelKind::Regressor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Classifier => "classifier",
            ModelKind::Regressor => "regressor",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Class-probability inference
pub trait ClassifierModel: Send + Sync {
    /// Expected input width
    fn n_features(&self) -> usize;

    /// Probability per class, indexed by class id
    fn predict_proba(&self, features: ArrayView1<'_, f64>) -> Result<Vec<f64>, InferenceError>;
}

/// Continuous-value inference
pub trait RegressorModel: Send + Sync {
    /// Expected input width
    fn n_features(&self) -> usize;

    fn predict(&self, features: ArrayView1<'_, f64>) -> Result<f64, InferenceError>;
}

/// Raw model output for one feature vector
#[derive(Debug, Clone, PartialEq)]
pub enum Inference {
    Probabilities(Vec<f64>),
    Scalar(f64),
}

/// Loaded model, tagged by capability
pub enum Model {
    Classifier(Box<dyn ClassifierModel>),
    Regressor(Box<dyn RegressorModel>),
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("kind", &self.kind())
            .field("n_features", &self.n_features())
            .finish()
    }
}

impl Model {
    pub fn kind(&self) -> ModelKind {
        match self {
            Model::Classifier(_) => ModelKind::Classifier,
            Model::Regressor(_) => ModelKind::Regressor,
        }
    }

    pub fn n_features(&self) -> usize {
        match self {
            Model::Classifier(m) => m.n_features(),
            Model::Regressor(m) => m.n_features(),
        }
    }

    /// Run the model on one feature vector and check its output
    ///
    /// Probabilities must be non-empty, finite and within `[0, 1]`; a scalar
    /// must be finite.
    pub fn infer(&self, features: &FeatureVector) -> Result<Inference, InferenceError> {
        let expected = self.n_features();
        if features.len() != expected {
            return Err(InferenceError::FeatureCount {
                expected,
                actual: features.len(),
            });
        }

        match self {
            Model::Classifier(model) => {
                let probs = model.predict_proba(features.view())?;
                if probs.is_empty() {
                    return Err(InferenceError::InvalidDistribution(
                        "no class probabilities".to_string(),
                    ));
                }
                if let Some(p) = probs.iter().find(|p| !(0.0..=1.0).contains(*p)) {
                    return Err(InferenceError::InvalidDistribution(format!(
                        "probability {} outside [0, 1]",
                        p
                    )));
                }
                Ok(Inference::Probabilities(probs))
            }
            Model::Regressor(model) => {
                let value = model.predict(features.view())?;
                if !value.is_finite() {
                    return Err(InferenceError::NonFinite);
                }
                Ok(Inference::Scalar(value))
            }
        }
    }
}
