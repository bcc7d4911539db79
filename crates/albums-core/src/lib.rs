//! albums-core: Photo classification and album assignment.
//!
//! Uses SCRFD for face detection and MobileNetV2 for general image
//! classification, both running via ONNX Runtime for CPU inference.
//! The pipeline turns raw predictions into album names through a
//! keyword taxonomy.

pub mod capability;
pub mod classifier;
pub mod detector;
pub mod pipeline;
pub mod preprocess;
pub mod taxonomy;
pub mod types;

use std::path::PathBuf;

pub use capability::{FaceDetection, ImageClassification};
pub use classifier::ImageClassifier;
pub use detector::FaceDetector;
pub use pipeline::{ClassificationPipeline, PipelineConfig};
pub use preprocess::{PreprocessConfig, PreprocessError, Preprocessor};
pub use taxonomy::Taxonomy;
pub use types::{AlbumName, BoundingBox, ClassificationResult, Prediction};

/// Default directory searched for the ONNX models and label file.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("/usr/share/photo-albums/models")
}
