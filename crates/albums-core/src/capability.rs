//! Model capability seams.
//!
//! The pipeline only sees these traits. Production uses the ONNX-backed
//! [`FaceDetector`](crate::FaceDetector) and
//! [`ImageClassifier`](crate::ImageClassifier); tests plug in doubles.
//! Both take `&mut self`: a model instance is never shared between
//! concurrent inference calls.

use crate::types::{BoundingBox, Prediction};
use image::RgbImage;
use thiserror::Error;

/// Error reported by a capability that is not one of the ONNX backends.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct CapabilityError(pub String);

/// Image → detected face boxes.
pub trait FaceDetection {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Detect faces in an RGB image already resized to the detector's input size.
    fn detect_faces(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, Self::Error>;
}

/// Image → ranked label/confidence pairs.
pub trait ImageClassification {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Return at most `top_k` predictions, highest confidence first.
    fn classify_image(
        &mut self,
        image: &RgbImage,
        top_k: usize,
    ) -> Result<Vec<Prediction>, Self::Error>;
}
