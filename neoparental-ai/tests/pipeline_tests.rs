//! End-to-end pipeline tests: WAV bytes → features → prediction report

use ndarray::ArrayView1;
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::time::Instant;

use neoparental_ai::audio::{AudioClip, AudioDecoder, TARGET_SAMPLE_RATE};
use neoparental_ai::error::{InferenceError, PredictError};
use neoparental_ai::features::{FeatureExtractor, FeatureLayout};
use neoparental_ai::model::{load_model, ClassifierModel, Model, ModelContext, ModelMetadata};
use neoparental_ai::prediction::PredictionService;

struct StubClassifier;

impl ClassifierModel for StubClassifier {
    fn n_features(&self) -> usize {
        194
    }

    fn predict_proba(&self, features: ArrayView1<'_, f64>) -> Result<Vec<f64>, InferenceError> {
        assert!(features.iter().all(|v| v.is_finite()));
        Ok(vec![0.1, 0.1, 0.6, 0.1, 0.1])
    }
}

fn sine_wav(freq: f32, seconds: f32, sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        let n = (sample_rate as f32 * seconds) as usize;
        for i in 0..n {
            let t = i as f32 / sample_rate as f32;
            let v = (2.0 * std::f32::consts::PI * freq * t).sin() * 0.5;
            writer.write_sample((v * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

fn stub_service() -> PredictionService {
    let metadata = ModelMetadata::Loaded {
        kind: neoparental_ai::model::ModelKind::Classifier,
        class: "StubClassifier".to_string(),
        path: "memory".to_string(),
        library: "test".to_string(),
    };
    PredictionService::new(
        Arc::new(ModelContext::new(
            Model::Classifier(Box::new(StubClassifier)),
            metadata,
        )),
        AudioDecoder::default(),
        FeatureExtractor::default(),
        10 * 1024 * 1024,
    )
}

#[test]
fn test_two_second_sine_extracts_finite_vector() {
    let clip = AudioClip::new(sine_wav(440.0, 2.0, TARGET_SAMPLE_RATE), "tone.wav");
    let waveform = AudioDecoder::default().decode(clip).unwrap();
    assert_eq!(waveform.samples.len(), 32_000);

    let vector = FeatureExtractor::default().extract(&waveform).unwrap();
    assert_eq!(vector.len(), 194);
    assert!(vector.as_slice().iter().all(|v| v.is_finite()));

    // Same input, same vector
    let again = FeatureExtractor::default().extract(&waveform).unwrap();
    assert_eq!(vector, again);
}

#[test]
fn test_two_second_sine_through_stub_classifier() {
    let service = stub_service();
    let bytes = sine_wav(440.0, 2.0, TARGET_SAMPLE_RATE);

    let first = service
        .predict_clip(AudioClip::new(bytes.clone(), "tone.wav"), Instant::now())
        .unwrap();
    assert_eq!(first.prediction_value, 2.0);
    assert_eq!(first.predicted_label.as_deref(), Some("Discomfort"));
    assert_eq!(first.confidence, Some(60.0));

    let second = service
        .predict_clip(AudioClip::new(bytes, "tone.wav"), Instant::now())
        .unwrap();
    assert_eq!(first.prediction_value, second.prediction_value);
    assert_eq!(first.confidence, second.confidence);
}

#[test]
fn test_resampled_input_matches_layout() {
    let clip = AudioClip::new(sine_wav(440.0, 1.0, 44_100), "tone.wav");
    let waveform = AudioDecoder::default().decode(clip).unwrap();
    assert_eq!(waveform.sample_rate, TARGET_SAMPLE_RATE);

    let vector = FeatureExtractor::new(FeatureLayout::WithMfccStd)
        .extract(&waveform)
        .unwrap();
    assert_eq!(vector.len(), 234);
}

#[test]
fn test_rejections_happen_before_extraction() {
    let service = stub_service();

    let result = service.predict_clip(AudioClip::new(b"hi".to_vec(), "notes.txt"), Instant::now());
    assert!(matches!(result, Err(PredictError::InvalidFormat { .. })));

    let result = service.predict_clip(
        AudioClip::new(vec![0u8; 11 * 1024 * 1024], "big.flac"),
        Instant::now(),
    );
    assert!(matches!(result, Err(PredictError::FileTooLarge { .. })));
}

#[test]
fn test_exported_artifact_serves_predictions() {
    // Linear classifier over the standard layout: class 3 gets a large bias
    let n = FeatureLayout::Standard.len();
    let coef: Vec<Vec<f64>> = (0..5).map(|_| vec![0.0; n]).collect();
    let doc = serde_json::json!({
        "class_name": "LogisticRegressionClassifier",
        "library": "scikit-learn",
        "n_features": n,
        "estimator": {
            "kind": "linear",
            "coef": coef,
            "intercept": [0.0, 0.0, 0.0, 10.0, 0.0],
        }
    });
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(doc.to_string().as_bytes()).unwrap();

    let context = load_model(file.path(), FeatureLayout::Standard);
    assert!(context.is_loaded());

    let service = PredictionService::new(
        Arc::new(context),
        AudioDecoder::default(),
        FeatureExtractor::default(),
        10 * 1024 * 1024,
    );
    let report = service
        .predict_clip(
            AudioClip::new(sine_wav(300.0, 0.5, TARGET_SAMPLE_RATE), "tone.wav"),
            Instant::now(),
        )
        .unwrap();
    assert_eq!(report.prediction_value, 3.0);
    assert_eq!(report.predicted_label.as_deref(), Some("Hungry"));
    assert!(report.confidence.unwrap() > 99.0);
}
