//! Prediction Service
//!
//! **Purpose:** Turn an uploaded clip (or a ready feature vector) into a
//! [`PredictionReport`] using the model loaded at startup.
//!
//! **Pipeline:** model check → clip validation → decode → extract → infer →
//! report. Each step returns its own error kind and nothing is retried.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::audio::{AudioClip, AudioDecoder};
use crate::error::PredictError;
use crate::features::{FeatureExtractor, FeatureVector};
use crate::model::{Inference, ModelContext};

/// Fixed class id to label table
pub const CLASS_LABELS: [&str; 5] = ["Belly_pain", "Burping", "Discomfort", "Hungry", "Tired/Sleepy"];

/// Label for a class id, if the table has one
pub fn class_label(index: i64) -> Option<&'static str> {
    usize::try_from(index)
        .ok()
        .and_then(|i| CLASS_LABELS.get(i))
        .copied()
}

/// Scale a fraction to a percentage with two decimals
fn percent(fraction: f64) -> f64 {
    (fraction * 100.0 * 100.0).round() / 100.0
}

/// Interpreted model output, before timing is attached
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub value: f64,
    pub label: Option<&'static str>,
    /// Percentage in `[0, 100]`, two decimals
    ///
    /// For classifiers this is the winning class probability. For regressors
    /// it is a proximity heuristic, `max(0, 1 - |v - round(v)|)`: how close
    /// the value lands to an integer class id. It is not a calibrated
    /// probability.
    pub confidence: f64,
}

impl Prediction {
    /// Interpret a raw model output
    pub fn from_inference(inference: &Inference) -> Self {
        match inference {
            Inference::Probabilities(probs) => {
                // First index wins ties
                let (index, max) = probs
                    .iter()
                    .enumerate()
                    .fold((0usize, f64::NEG_INFINITY), |best, (i, &p)| {
                        if p > best.1 {
                            (i, p)
                        } else {
                            best
                        }
                    });
                Self {
                    value: index as f64,
                    label: CLASS_LABELS.get(index).copied(),
                    confidence: percent(max),
                }
            }
            Inference::Scalar(value) => {
                let nearest = value.round_ties_even();
                let proximity = (1.0 - (value - nearest).abs()).max(0.0);
                Self {
                    value: *value,
                    label: class_label(nearest as i64),
                    confidence: percent(proximity),
                }
            }
        }
    }
}

/// Response body for a successful prediction
#[derive(Debug, Clone, Serialize)]
pub struct PredictionReport {
    pub prediction_value: f64,
    pub predicted_label: Option<String>,
    pub confidence: Option<f64>,
    /// Seconds from request receipt to report construction
    pub processing_time: f64,
    /// RFC 3339
    pub timestamp: String,
}

impl PredictionReport {
    pub fn new(prediction: Prediction, started: Instant) -> Self {
        Self {
            prediction_value: prediction.value,
            predicted_label: prediction.label.map(str::to_string),
            confidence: Some(prediction.confidence),
            processing_time: started.elapsed().as_secs_f64(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Shared, read-only prediction pipeline
#[derive(Debug)]
pub struct PredictionService {
    context: Arc<ModelContext>,
    decoder: AudioDecoder,
    extractor: FeatureExtractor,
    max_upload_bytes: usize,
}

impl PredictionService {
    pub fn new(
        context: Arc<ModelContext>,
        decoder: AudioDecoder,
        extractor: FeatureExtractor,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            context,
            decoder,
            extractor,
            max_upload_bytes,
        }
    }

    pub fn context(&self) -> &ModelContext {
        &self.context
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Full pipeline for one uploaded clip
    ///
    /// `started` is when the request was received; it anchors
    /// `processing_time`.
    pub fn predict_clip(
        &self,
        clip: AudioClip,
        started: Instant,
    ) -> Result<PredictionReport, PredictError> {
        if !self.context.is_loaded() {
            return Err(PredictError::ModelUnavailable);
        }
        clip.validate(self.max_upload_bytes)?;

        let filename = clip.filename().to_string();
        let waveform = self.decoder.decode(clip)?;
        debug!(
            filename = %filename,
            duration_secs = waveform.duration_seconds(),
            "Decoded clip"
        );

        let features = self.extractor.extract(&waveform)?;
        let prediction = self.infer(&features)?;

        let report = PredictionReport::new(prediction, started);
        info!(
            filename = %filename,
            value = report.prediction_value,
            label = report.predicted_label.as_deref().unwrap_or("-"),
            confidence = report.confidence.unwrap_or_default(),
            processing_time = report.processing_time,
            "Prediction complete"
        );
        Ok(report)
    }

    /// Report for an already extracted feature vector
    pub fn predict(&self, features: &FeatureVector) -> Result<PredictionReport, PredictError> {
        let started = Instant::now();
        let prediction = self.infer(features)?;
        Ok(PredictionReport::new(prediction, started))
    }

    fn infer(&self, features: &FeatureVector) -> Result<Prediction, PredictError> {
        let model = self.context.model().ok_or(PredictError::ModelUnavailable)?;
        let inference = model.infer(features)?;
        Ok(Prediction::from_inference(&inference))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InferenceError;
    use crate::features::FeatureLayout;
    use crate::model::{ClassifierModel, Model, ModelKind, ModelMetadata, RegressorModel};
    use ndarray::ArrayView1;

    struct StubClassifier(Vec<f64>);

    impl ClassifierModel for StubClassifier {
        fn n_features(&self) -> usize {
            194
        }

        fn predict_proba(&self, _: ArrayView1<'_, f64>) -> Result<Vec<f64>, InferenceError> {
            Ok(self.0.clone())
        }
    }

    struct StubRegressor(f64);

    impl RegressorModel for StubRegressor {
        fn n_features(&self) -> usize {
            194
        }

        fn predict(&self, _: ArrayView1<'_, f64>) -> Result<f64, InferenceError> {
            Ok(self.0)
        }
    }

    struct Failing;

    impl RegressorModel for Failing {
        fn n_features(&self) -> usize {
            194
        }

        fn predict(&self, _: ArrayView1<'_, f64>) -> Result<f64, InferenceError> {
            Err(InferenceError::Failed("boom".to_string()))
        }
    }

    fn service(model: Model) -> PredictionService {
        let metadata = ModelMetadata::Loaded {
            kind: model.kind(),
            class: "Stub".to_string(),
            path: "memory".to_string(),
            library: "test".to_string(),
        };
        PredictionService::new(
            Arc::new(ModelContext::new(model, metadata)),
            AudioDecoder::default(),
            FeatureExtractor::default(),
            10 * 1024 * 1024,
        )
    }

    fn vector() -> FeatureVector {
        FeatureVector::new(vec![0.0; 194], FeatureLayout::Standard).unwrap()
    }

    fn regress(value: f64) -> Prediction {
        Prediction::from_inference(&Inference::Scalar(value))
    }

    #[test]
    fn test_classifier_report() {
        let svc = service(Model::Classifier(Box::new(StubClassifier(vec![
            0.1, 0.1, 0.6, 0.1, 0.1,
        ]))));
        let report = svc.predict(&vector()).unwrap();
        assert_eq!(report.prediction_value, 2.0);
        assert_eq!(report.predicted_label.as_deref(), Some("Discomfort"));
        assert_eq!(report.confidence, Some(60.0));
        assert!(report.processing_time >= 0.0);
    }

    #[test]
    fn test_classifier_ties_pick_first_index() {
        let p = Prediction::from_inference(&Inference::Probabilities(vec![0.4, 0.4, 0.2]));
        assert_eq!(p.value, 0.0);
        assert_eq!(p.label, Some("Belly_pain"));
    }

    #[test]
    fn test_classifier_index_outside_table_has_no_label() {
        let mut probs = vec![0.0; 7];
        probs[6] = 1.0;
        let p = Prediction::from_inference(&Inference::Probabilities(probs));
        assert_eq!(p.value, 6.0);
        assert_eq!(p.label, None);
        assert_eq!(p.confidence, 100.0);
    }

    #[test]
    fn test_classifier_confidence_rounding() {
        let p = Prediction::from_inference(&Inference::Probabilities(vec![0.123456, 0.876544]));
        assert_eq!(p.confidence, 87.65);
    }

    #[test]
    fn test_regressor_confidence_heuristic() {
        let p = regress(2.1);
        assert_eq!(p.value, 2.1);
        assert_eq!(p.label, Some("Discomfort"));
        assert_eq!(p.confidence, 90.0);

        let p = regress(2.5);
        assert_eq!(p.confidence, 50.0);
        // Ties round to even: 2.5 -> 2
        assert_eq!(p.label, Some("Discomfort"));

        assert_eq!(regress(3.5).label, Some("Tired/Sleepy"));
        assert_eq!(regress(4.0).confidence, 100.0);
    }

    #[test]
    fn test_regressor_out_of_table() {
        assert_eq!(regress(7.2).label, None);
        assert_eq!(regress(-1.0).label, None);
        assert_eq!(regress(-0.4).label, Some("Belly_pain"));
    }

    #[test]
    fn test_confidence_is_bounded() {
        for v in [-3.7, -0.5, 0.0, 0.49, 1.51, 2.999, 1e6] {
            let c = regress(v).confidence;
            assert!((0.0..=100.0).contains(&c), "{} -> {}", v, c);
        }
        for probs in [vec![1.0], vec![0.0, 0.0], vec![0.2, 0.3, 0.5]] {
            let c = Prediction::from_inference(&Inference::Probabilities(probs)).confidence;
            assert!((0.0..=100.0).contains(&c));
        }
    }

    #[test]
    fn test_regressor_report_through_service() {
        let svc = service(Model::Regressor(Box::new(StubRegressor(2.1))));
        assert_eq!(svc.context().model_type(), Some(ModelKind::Regressor));
        let report = svc.predict(&vector()).unwrap();
        assert_eq!(report.prediction_value, 2.1);
        assert_eq!(report.confidence, Some(90.0));
    }

    #[test]
    fn test_inference_failure_is_preserved() {
        let svc = service(Model::Regressor(Box::new(Failing)));
        match svc.predict(&vector()) {
            Err(PredictError::Inference(InferenceError::Failed(msg))) => assert_eq!(msg, "boom"),
            other => panic!("expected inference error, got {:?}", other),
        }
    }

    #[test]
    fn test_no_model_is_unavailable_before_validation() {
        let svc = PredictionService::new(
            Arc::new(ModelContext::unavailable("Model file not found")),
            AudioDecoder::default(),
            FeatureExtractor::default(),
            10,
        );
        // Bad extension and oversize, but the missing model is reported first
        let clip = AudioClip::new(vec![0u8; 100], "notes.txt");
        assert!(matches!(
            svc.predict_clip(clip, Instant::now()),
            Err(PredictError::ModelUnavailable)
        ));
        assert!(matches!(
            svc.predict(&vector()),
            Err(PredictError::ModelUnavailable)
        ));
    }

    #[test]
    fn test_validation_precedes_decoding() {
        let svc = service(Model::Regressor(Box::new(StubRegressor(1.0))));

        let clip = AudioClip::new(b"not audio".to_vec(), "notes.txt");
        assert!(matches!(
            svc.predict_clip(clip, Instant::now()),
            Err(PredictError::InvalidFormat { .. })
        ));

        let clip = AudioClip::new(vec![0u8; 11 * 1024 * 1024], "big.wav");
        assert!(matches!(
            svc.predict_clip(clip, Instant::now()),
            Err(PredictError::FileTooLarge { .. })
        ));

        let clip = AudioClip::new(b"not audio".to_vec(), "cry.wav");
        assert!(matches!(
            svc.predict_clip(clip, Instant::now()),
            Err(PredictError::Extraction(_))
        ));
    }

    #[test]
    fn test_report_serialization() {
        let report = PredictionReport::new(regress(2.1), Instant::now());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["prediction_value"], 2.1);
        assert_eq!(json["predicted_label"], "Discomfort");
        assert_eq!(json["confidence"], 90.0);
        assert!(json["processing_time"].is_number());
        assert!(chrono::DateTime::parse_from_rfc3339(json["timestamp"].as_str().unwrap()).is_ok());
    }
}
