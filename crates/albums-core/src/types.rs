use serde::{Deserialize, Serialize};
use std::fmt;

/// Label synthesized when the face detector finds at least one face.
pub const PERSON_LABEL: &str = "person";
/// Confidence assigned to the synthesized person prediction.
pub const PERSON_CONFIDENCE: f32 = 0.95;
/// Label that all vehicle-category predictions collapse into.
pub const CAR_LABEL: &str = "car";
/// Label of the single prediction returned when classification fails.
pub const FALLBACK_LABEL: &str = "other";

/// A single label/confidence pair.
///
/// Fields are private: once built, a prediction is not modified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    label: String,
    confidence: f32,
}

impl Prediction {
    /// Create a prediction, clamping `confidence` into [0, 1] (NaN → 0).
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            label: label.into(),
            confidence,
        }
    }

    /// The `{other, 0.0}` fallback used whenever classification fails.
    pub fn fallback() -> Self {
        Self::new(FALLBACK_LABEL, 0.0)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }
}

/// Ranked predictions for one image. Never empty when produced by the pipeline.
pub type ClassificationResult = Vec<Prediction>;

/// Name of an album, backed 1:1 by a directory under the storage root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlbumName(String);

impl AlbumName {
    /// Catch-all album for images no vocabulary matches.
    pub const OTHER: &'static str = "Other";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Album used when no taxonomy vocabulary matches.
    pub fn other() -> Self {
        Self(Self::OTHER.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlbumName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AlbumName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}
