use albums_core::preprocess::{MAX_IMAGE_DIMENSION, PRE_RESIZE_DIMENSION};
use albums_core::{PipelineConfig, PreprocessConfig};
use std::path::PathBuf;

/// Largest accepted upload, in bytes (50 MB).
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding one subdirectory per album.
    pub storage_root: PathBuf,
    /// Directory containing the ONNX model files and ImageNet labels.
    pub model_dir: PathBuf,
    /// Classifier predictions below this confidence are dropped.
    pub min_confidence: f32,
    /// Uploads larger than this are rejected.
    pub max_upload_bytes: u64,
    /// Images with a larger side than this are rejected.
    pub max_image_dimension: u32,
    /// Images are bounded to this side before the final model resize.
    pub pre_resize_dimension: u32,
}

impl Config {
    /// Load configuration from `ALBUMS_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("ALBUMS_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| albums_core::default_model_dir());

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("photo-albums");

        let storage_root = std::env::var("ALBUMS_STORAGE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("uploads"));

        Self {
            storage_root,
            model_dir,
            min_confidence: env_f32("ALBUMS_MIN_CONFIDENCE", albums_core::pipeline::MIN_CONFIDENCE),
            max_upload_bytes: env_u64("ALBUMS_MAX_UPLOAD_BYTES", MAX_UPLOAD_BYTES),
            max_image_dimension: env_u32("ALBUMS_MAX_IMAGE_DIMENSION", MAX_IMAGE_DIMENSION),
            pre_resize_dimension: env_u32("ALBUMS_PRE_RESIZE_DIMENSION", PRE_RESIZE_DIMENSION),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_path("det_10g.onnx")
    }

    /// Path to the MobileNetV2 classification model.
    pub fn classifier_model_path(&self) -> String {
        self.model_path("mobilenetv2-12.onnx")
    }

    /// Path to the ImageNet label file (one class per line).
    pub fn labels_path(&self) -> String {
        self.model_path("imagenet_labels.txt")
    }

    pub fn preprocess_config(&self) -> PreprocessConfig {
        PreprocessConfig {
            max_dimension: self.max_image_dimension,
            pre_resize_dimension: self.pre_resize_dimension,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            min_confidence: self.min_confidence,
            ..PipelineConfig::default()
        }
    }

    fn model_path(&self, file: &str) -> String {
        self.model_dir.join(file).to_string_lossy().into_owned()
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_paths_join_model_dir() {
        let config = Config {
            storage_root: PathBuf::from("/srv/uploads"),
            model_dir: PathBuf::from("/opt/models"),
            min_confidence: 0.3,
            max_upload_bytes: MAX_UPLOAD_BYTES,
            max_image_dimension: 4000,
            pre_resize_dimension: 1024,
        };
        assert_eq!(config.scrfd_model_path(), "/opt/models/det_10g.onnx");
        assert_eq!(config.classifier_model_path(), "/opt/models/mobilenetv2-12.onnx");
        assert_eq!(config.labels_path(), "/opt/models/imagenet_labels.txt");
        assert_eq!(config.pipeline_config().top_k, 5);
        assert_eq!(config.preprocess_config().max_dimension, 4000);
    }

    #[test]
    fn test_env_parse_falls_back_on_garbage() {
        std::env::set_var("ALBUMS_TEST_GARBAGE_F32", "not-a-number");
        assert_eq!(env_f32("ALBUMS_TEST_GARBAGE_F32", 0.25), 0.25);
        assert_eq!(env_u64("ALBUMS_TEST_UNSET_U64", 7), 7);
    }
}
