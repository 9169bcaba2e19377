//! Startup model loading
//!
//! Loading never aborts startup: a missing or broken artifact leaves the
//! context without a model and the reason in its metadata, so the health
//! endpoint can report the degraded state.

use serde::Serialize;
use std::path::Path;
use tracing::{error, info};

use super::{ArtifactModel, Model, ModelKind};
use crate::error::ModelLoadError;
use crate::features::FeatureLayout;

/// Loader outcome as reported by the health endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ModelMetadata {
    Loaded {
        #[serde(rename = "type")]
        kind: ModelKind,
        class: String,
        path: String,
        library: String,
    },
    Failed {
        error: String,
    },
}

/// Immutable model state built once at startup
#[derive(Debug)]
pub struct ModelContext {
    model: Option<Model>,
    metadata: ModelMetadata,
}

impl ModelContext {
    pub fn new(model: Model, metadata: ModelMetadata) -> Self {
        Self {
            model: Some(model),
            metadata,
        }
    }

    /// Context without a model
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            model: None,
            metadata: ModelMetadata::Failed {
                error: reason.into(),
            },
        }
    }

    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn model_type(&self) -> Option<ModelKind> {
        self.model.as_ref().map(Model::kind)
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}

/// Read, validate and classify the artifact at `path`
///
/// The artifact's input width must equal the length of `layout`.
pub fn load_artifact(
    path: &Path,
    layout: FeatureLayout,
) -> Result<(Model, ModelMetadata), ModelLoadError> {
    if !path.exists() {
        return Err(ModelLoadError::NotFound(path.to_path_buf()));
    }

    let json = std::fs::read_to_string(path).map_err(|source| ModelLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let artifact = ArtifactModel::from_json(&json)?;

    if artifact.n_features() != layout.len() {
        return Err(ModelLoadError::LayoutMismatch {
            layout: layout.name(),
            expected: layout.len(),
            artifact: artifact.n_features(),
        });
    }

    let metadata = ModelMetadata::Loaded {
        kind: artifact.kind(),
        class: artifact.class_name().to_string(),
        path: path.display().to_string(),
        library: artifact.library().to_string(),
    };

    let model = match artifact.kind() {
        ModelKind::Classifier => Model::Classifier(Box::new(artifact)),
        ModelKind::Regressor => Model::Regressor(Box::new(artifact)),
    };

    Ok((model, metadata))
}

/// Load the model for the service, recording failures instead of returning them
pub fn load_model(path: &Path, layout: FeatureLayout) -> ModelContext {
    info!(path = %path.display(), layout = %layout, "Loading model");

    match load_artifact(path, layout) {
        Ok((model, metadata)) => {
            if let ModelMetadata::Loaded { class, kind, .. } = &metadata {
                info!(class = %class, kind = %kind, "Model loaded successfully");
            }
            ModelContext::new(model, metadata)
        }
        Err(e) => {
            error!(path = %path.display(), "Model loading error: {}", e);
            ModelContext::unavailable(e.to_string())
        }
    }
}
