//! Exported model artifacts
//!
//! The training side exports the fitted estimator as a JSON document: class
//! name, input width, an optional standard scaler and either a linear or a
//! tree-ensemble estimator. [`ArtifactModel`] evaluates that document and
//! implements both model capabilities; the loader decides which one to use.

use ndarray::{Array1, Array2, ArrayView1};
use serde::Deserialize;

use super::forest::DecisionTree;
use super::{ClassifierModel, ModelKind, RegressorModel};
use crate::error::{InferenceError, ModelLoadError};

/// Top-level artifact document
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactDocument {
    pub class_name: String,
    #[serde(default = "default_library")]
    pub library: String,
    pub n_features: usize,
    #[serde(default)]
    pub scaler: Option<ScalerParams>,
    pub estimator: EstimatorParams,
}

fn default_library() -> String {
    "scikit-learn".to_string()
}

/// Standard scaling `(x - mean) / scale`
#[derive(Debug, Clone, Deserialize)]
pub struct ScalerParams {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EstimatorParams {
    /// One coefficient row per class (or a single row)
    Linear {
        coef: Vec<Vec<f64>>,
        intercept: Vec<f64>,
    },
    /// Averaged decision trees
    Forest { trees: Vec<DecisionTree> },
}

#[derive(Debug, Clone)]
struct Scaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl Scaler {
    fn transform(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        (&x - &self.mean) / &self.scale
    }
}

#[derive(Debug, Clone)]
enum Estimator {
    Linear {
        coef: Array2<f64>,
        intercept: Array1<f64>,
    },
    Forest {
        trees: Vec<DecisionTree>,
    },
}

/// Validated, ready-to-evaluate artifact
#[derive(Debug, Clone)]
pub struct ArtifactModel {
    class_name: String,
    library: String,
    kind: ModelKind,
    n_features: usize,
    scaler: Option<Scaler>,
    estimator: Estimator,
}

impl ArtifactModel {
    /// Validate a parsed document
    pub fn from_document(doc: ArtifactDocument) -> Result<Self, ModelLoadError> {
        let kind = ModelKind::from_class_name(&doc.class_name);
        let n_features = doc.n_features;
        if n_features == 0 {
            return Err(ModelLoadError::Invalid("n_features must be positive".to_string()));
        }

        let scaler = doc
            .scaler
            .map(|s| build_scaler(s, n_features))
            .transpose()?;
        let estimator = build_estimator(doc.estimator, kind, n_features)?;

        Ok(Self {
            class_name: doc.class_name,
            library: doc.library,
            kind,
            n_features,
            scaler,
            estimator,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, ModelLoadError> {
        let doc: ArtifactDocument = serde_json::from_str(json)?;
        Self::from_document(doc)
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn library(&self) -> &str {
        &self.library
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    fn prepare(&self, x: ArrayView1<'_, f64>) -> Result<Array1<f64>, InferenceError> {
        if x.len() != self.n_features {
            return Err(InferenceError::FeatureCount {
                expected: self.n_features,
                actual: x.len(),
            });
        }
        Ok(match &self.scaler {
            Some(scaler) => scaler.transform(x),
            None => x.to_owned(),
        })
    }
}

fn build_scaler(params: ScalerParams, n_features: usize) -> Result<Scaler, ModelLoadError> {
    if params.mean.len() != n_features || params.scale.len() != n_features {
        return Err(ModelLoadError::Invalid(format!(
            "scaler has {} means and {} scales for {} features",
            params.mean.len(),
            params.scale.len(),
            n_features
        )));
    }
    if params.mean.iter().chain(&params.scale).any(|v| !v.is_finite()) {
        return Err(ModelLoadError::Invalid("scaler contains non-finite values".to_string()));
    }

    // Constant training features were exported with scale 0
    let scale = params
        .scale
        .into_iter()
        .map(|s| if s == 0.0 { 1.0 } else { s })
        .collect();

    Ok(Scaler {
        mean: Array1::from_vec(params.mean),
        scale,
    })
}

fn build_estimator(
    params: EstimatorParams,
    kind: ModelKind,
    n_features: usize,
) -> Result<Estimator, ModelLoadError> {
    match params {
        EstimatorParams::Linear { coef, intercept } => {
            let rows = coef.len();
            if rows == 0 {
                return Err(ModelLoadError::Invalid("linear model has no coefficients".to_string()));
            }
            if kind == ModelKind::Regressor && rows != 1 {
                return Err(ModelLoadError::Invalid(format!(
                    "linear regressor needs one coefficient row, got {}",
                    rows
                )));
            }
            if intercept.len() != rows {
                return Err(ModelLoadError::Invalid(format!(
                    "{} intercepts for {} coefficient rows",
                    intercept.len(),
                    rows
                )));
            }
            if let Some(row) = coef.iter().find(|row| row.len() != n_features) {
                return Err(ModelLoadError::Invalid(format!(
                    "coefficient row has {} values for {} features",
                    row.len(),
                    n_features
                )));
            }

            let flat: Vec<f64> = coef.into_iter().flatten().collect();
            let coef = Array2::from_shape_vec((rows, n_features), flat)
                .map_err(|e| ModelLoadError::Invalid(e.to_string()))?;

            Ok(Estimator::Linear {
                coef,
                intercept: Array1::from_vec(intercept),
            })
        }
        EstimatorParams::Forest { trees } => {
            let first = trees
                .first()
                .ok_or_else(|| ModelLoadError::Invalid("forest has no trees".to_string()))?;
            let n_outputs = first.value.first().map(Vec::len).unwrap_or(0);
            if n_outputs == 0 {
                return Err(ModelLoadError::Invalid("tree leaves have no outputs".to_string()));
            }
            for tree in &trees {
                tree.validate(n_features, n_outputs)?;
            }
            Ok(Estimator::Forest { trees })
        }
    }
}

fn softmax(z: &Array1<f64>) -> Vec<f64> {
    let max = z.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
    let exp = z.mapv(|v| (v - max).exp());
    let sum = exp.sum();
    exp.iter().map(|v| v / sum).collect()
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl ClassifierModel for ArtifactModel {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_proba(&self, features: ArrayView1<'_, f64>) -> Result<Vec<f64>, InferenceError> {
        let x = self.prepare(features)?;

        let probs = match &self.estimator {
            Estimator::Linear { coef, intercept } => {
                let z = coef.dot(&x) + intercept;
                if z.iter().any(|v| !v.is_finite()) {
                    return Err(InferenceError::InvalidDistribution(
                        "non-finite decision value".to_string(),
                    ));
                }
                if z.len() == 1 {
                    let p = sigmoid(z[0]);
                    vec![1.0 - p, p]
                } else {
                    softmax(&z)
                }
            }
            Estimator::Forest { trees } => {
                let n_classes = trees[0].value[0].len();
                let mut total = vec![0.0; n_classes];
                for tree in trees {
                    let leaf = tree.leaf_value(x.view());
                    let sum: f64 = leaf.iter().sum();
                    if sum > 0.0 {
                        for (t, v) in total.iter_mut().zip(leaf) {
                            *t += v / sum;
                        }
                    }
                }
                let n_trees = trees.len() as f64;
                total.into_iter().map(|t| t / n_trees).collect()
            }
        };

        Ok(probs)
    }
}

impl RegressorModel for ArtifactModel {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict(&self, features: ArrayView1<'_, f64>) -> Result<f64, InferenceError> {
        let x = self.prepare(features)?;

        let value = match &self.estimator {
            Estimator::Linear { coef, intercept } => coef.row(0).dot(&x) + intercept[0],
            Estimator::Forest { trees } => {
                let sum: f64 = trees.iter().map(|t| t.leaf_value(x.view())[0]).sum();
                sum / trees.len() as f64
            }
        };

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    const LOGISTIC: &str = r#"{
        "class_name": "LogisticRegressionClassifier",
        "n_features": 2,
        "scaler": { "mean": [1.0, 0.0], "scale": [2.0, 0.0] },
        "estimator": {
            "kind": "linear",
            "coef": [[1.0, 0.0], [0.0, 1.0], [-1.0, -1.0]],
            "intercept": [0.0, 0.0, 0.0]
        }
    }"#;

    const FOREST_REGRESSOR: &str = r#"{
        "class_name": "RandomForestRegressor",
        "library": "scikit-learn",
        "n_features": 1,
        "estimator": {
            "kind": "forest",
            "trees": [
                {
                    "children_left": [1, -1, -1],
                    "children_right": [2, -1, -1],
                    "feature": [0, -2, -2],
                    "threshold": [0.0, -2.0, -2.0],
                    "value": [[2.0], [1.0], [3.0]]
                },
                {
                    "children_left": [-1],
                    "children_right": [-1],
                    "feature": [-2],
                    "threshold": [-2.0],
                    "value": [[2.0]]
                }
            ]
        }
    }"#;

    #[test]
    fn test_linear_classifier_softmax() {
        let model = ArtifactModel::from_json(LOGISTIC).unwrap();
        assert_eq!(model.kind(), ModelKind::Classifier);
        assert_eq!(model.library(), "scikit-learn");

        // Scaled input is (0, 0): all logits equal
        let probs = model.predict_proba(array![1.0, 0.0].view()).unwrap();
        for p in &probs {
            assert!((p - 1.0 / 3.0).abs() < 1e-12);
        }

        // Scaled input (1, 5): second class wins
        let probs = model.predict_proba(array![3.0, 5.0].view()).unwrap();
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(probs[1] > probs[0] && probs[0] > probs[2]);
    }

    #[test]
    fn test_single_row_is_logistic() {
        let json = r#"{
            "class_name": "LogisticRegressionClassifier",
            "n_features": 1,
            "estimator": { "kind": "linear", "coef": [[1.0]], "intercept": [0.0] }
        }"#;
        let model = ArtifactModel::from_json(json).unwrap();
        let probs = model.predict_proba(array![0.0].view()).unwrap();
        assert_eq!(probs, vec![0.5, 0.5]);
    }

    #[test]
    fn test_forest_regressor_averages_trees() {
        let model = ArtifactModel::from_json(FOREST_REGRESSOR).unwrap();
        assert_eq!(model.kind(), ModelKind::Regressor);
        assert_eq!(RegressorModel::predict(&model, array![-1.0].view()).unwrap(), 1.5);
        assert_eq!(RegressorModel::predict(&model, array![1.0].view()).unwrap(), 2.5);
    }

    #[test]
    fn test_forest_classifier_normalizes_leaves() {
        let json = r#"{
            "class_name": "RandomForestClassifier",
            "n_features": 1,
            "estimator": {
                "kind": "forest",
                "trees": [
                    {
                        "children_left": [-1], "children_right": [-1],
                        "feature": [-2], "threshold": [-2.0],
                        "value": [[6.0, 2.0]]
                    },
                    {
                        "children_left": [-1], "children_right": [-1],
                        "feature": [-2], "threshold": [-2.0],
                        "value": [[0.0, 1.0]]
                    }
                ]
            }
        }"#;
        let model = ArtifactModel::from_json(json).unwrap();
        let probs = model.predict_proba(array![0.0].view()).unwrap();
        assert_eq!(probs, vec![0.375, 0.625]);
    }

    #[test]
    fn test_wrong_width_is_inference_error() {
        let model = ArtifactModel::from_json(LOGISTIC).unwrap();
        let result = model.predict_proba(array![1.0, 2.0, 3.0].view());
        assert!(matches!(
            result,
            Err(InferenceError::FeatureCount {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_invalid_documents() {
        let cases = [
            // ragged coefficients
            r#"{"class_name": "X", "n_features": 2,
                "estimator": {"kind": "linear", "coef": [[1.0]], "intercept": [0.0]}}"#,
            // intercept count
            r#"{"class_name": "XClassifier", "n_features": 1,
                "estimator": {"kind": "linear", "coef": [[1.0], [2.0]], "intercept": [0.0]}}"#,
            // multi-row regressor
            r#"{"class_name": "Ridge", "n_features": 1,
                "estimator": {"kind": "linear", "coef": [[1.0], [2.0]], "intercept": [0.0, 0.0]}}"#,
            // scaler width
            r#"{"class_name": "Ridge", "n_features": 1, "scaler": {"mean": [0.0, 0.0], "scale": [1.0]},
                "estimator": {"kind": "linear", "coef": [[1.0]], "intercept": [0.0]}}"#,
            // empty forest
            r#"{"class_name": "RandomForestRegressor", "n_features": 1,
                "estimator": {"kind": "forest", "trees": []}}"#,
        ];
        for json in cases {
            assert!(
                matches!(ArtifactModel::from_json(json), Err(ModelLoadError::Invalid(_))),
                "accepted {}",
                json
            );
        }
    }

    #[test]
    fn test_unknown_estimator_kind_is_parse_error() {
        let json = r#"{"class_name": "SVC", "n_features": 1, "estimator": {"kind": "kernel"}}"#;
        assert!(matches!(
            ArtifactModel::from_json(json),
            Err(ModelLoadError::Parse(_))
        ));
    }
}
