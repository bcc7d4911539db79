//! Classification pipeline: preprocessing, face detection, classification
//! and the prediction policies that shape the final ranked list.
//!
//! [`ClassificationPipeline::classify`] never fails. Any stage error is
//! logged and the whole call collapses to `[{other, 0.0}]`.

use crate::capability::{FaceDetection, ImageClassification};
use crate::preprocess::{PreprocessError, Preprocessor, CLASSIFIER_INPUT_SIZE, FACE_INPUT_SIZE};
use crate::types::{ClassificationResult, Prediction, CAR_LABEL, PERSON_CONFIDENCE, PERSON_LABEL};
use std::path::Path;
use thiserror::Error;

/// Predictions below this confidence are dropped.
pub const MIN_CONFIDENCE: f32 = 0.3;
/// Number of classifier labels considered per image.
pub const CLASSIFIER_TOP_K: usize = 5;

/// Classifier labels that collapse into a single `car` prediction.
pub const VEHICLE_CATEGORIES: &[&str] = &[
    "car",
    "minivan",
    "truck",
    "pickup",
    "racer",
    "convertible",
    "limousine",
    "sports_car",
    "model_t",
    "ambulance",
    "beach_wagon",
];

/// Pipeline stage at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FaceDetection,
    Classification,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::FaceDetection => f.write_str("face detection"),
            Stage::Classification => f.write_str("classification"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{stage}: {source}")]
    Preprocess {
        stage: Stage,
        #[source]
        source: PreprocessError,
    },
    #[error("{stage}: inference failed: {source}")]
    Inference {
        stage: Stage,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Tunable thresholds for the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub min_confidence: f32,
    pub top_k: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_confidence: MIN_CONFIDENCE,
            top_k: CLASSIFIER_TOP_K,
        }
    }
}

/// Turns an image file into a ranked, policy-filtered prediction list.
pub struct ClassificationPipeline<D, C> {
    detector: D,
    classifier: C,
    preprocessor: Preprocessor,
    config: PipelineConfig,
}

impl<D, C> ClassificationPipeline<D, C>
where
    D: FaceDetection,
    C: ImageClassification,
{
    pub fn new(detector: D, classifier: C, preprocessor: Preprocessor, config: PipelineConfig) -> Self {
        Self {
            detector,
            classifier,
            preprocessor,
            config,
        }
    }

    /// Classify the image at `path`.
    ///
    /// Always returns at least one prediction; on any failure the result is
    /// exactly `[{other, 0.0}]`.
    pub fn classify(&mut self, path: &Path) -> ClassificationResult {
        match self.try_classify(path) {
            Ok(predictions) => {
                tracing::debug!(path = %path.display(), ?predictions, "classified");
                predictions
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "classification failed; using fallback");
                vec![Prediction::fallback()]
            }
        }
    }

    /// Run every stage, surfacing the first failure.
    pub fn try_classify(&mut self, path: &Path) -> Result<ClassificationResult, PipelineError> {
        let mut result = Vec::new();

        if self.has_faces(path)? {
            result.push(Prediction::new(PERSON_LABEL, PERSON_CONFIDENCE));
        }

        let candidates = self.top_predictions(path)?;
        apply_policies(&mut result, candidates, self.config.min_confidence);

        // A capability that returns nothing usable still yields a non-empty result
        if result.is_empty() {
            result.push(Prediction::fallback());
        }
        Ok(result)
    }

    fn has_faces(&mut self, path: &Path) -> Result<bool, PipelineError> {
        let stage = Stage::FaceDetection;
        let image = self.prepare(path, FACE_INPUT_SIZE, stage)?;
        let faces = self
            .detector
            .detect_faces(&image)
            .map_err(|e| PipelineError::Inference {
                stage,
                source: Box::new(e),
            })?;
        tracing::debug!(path = %path.display(), faces = faces.len(), "face detection");
        Ok(!faces.is_empty())
    }

    fn top_predictions(&mut self, path: &Path) -> Result<Vec<Prediction>, PipelineError> {
        let stage = Stage::Classification;
        let image = self.prepare(path, CLASSIFIER_INPUT_SIZE, stage)?;
        self.classifier
            .classify_image(&image, self.config.top_k)
            .map_err(|e| PipelineError::Inference {
                stage,
                source: Box::new(e),
            })
    }

    fn prepare(&self, path: &Path, target: u32, stage: Stage) -> Result<image::RgbImage, PipelineError> {
        let wrap = |source| PipelineError::Preprocess { stage, source };
        let image = self.preprocessor.validate(path).map_err(wrap)?;
        self.preprocessor.resize_for(&image, target).map_err(wrap)
    }
}

/// Whether `label` names a vehicle category that collapses into `car`.
pub fn is_vehicle_category(label: &str) -> bool {
    VEHICLE_CATEGORIES
        .iter()
        .any(|v| v.eq_ignore_ascii_case(label))
}

/// Append the confidence-filtered `candidates` to `result`.
///
/// Vehicle labels collapse into one `car` prediction carrying their maximum
/// confidence. Other labels are appended in rank order until `result`
/// contains a `person` prediction.
pub fn apply_policies(result: &mut Vec<Prediction>, candidates: Vec<Prediction>, min_confidence: f32) {
    let (vehicles, others): (Vec<_>, Vec<_>) = candidates
        .into_iter()
        .filter(|p| p.confidence() >= min_confidence)
        .partition(|p| is_vehicle_category(p.label()));

    if let Some(max) = vehicles.iter().map(Prediction::confidence).reduce(f32::max) {
        result.push(Prediction::new(CAR_LABEL, max));
    }

    for prediction in others {
        if result.iter().any(|p| p.label() == PERSON_LABEL) {
            break;
        }
        result.push(prediction);
    }
}
