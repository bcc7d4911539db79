//! MobileNetV2 image classifier via ONNX Runtime.
//!
//! Scores a 224×224 RGB image against the 1000 ImageNet classes and returns
//! the top-k labels. Class names come from a plain-text label file, one
//! class per line, in model output order.

use crate::capability::ImageClassification;
use crate::preprocess::CLASSIFIER_INPUT_SIZE;
use crate::types::Prediction;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants (ImageNet normalization on [0, 1] pixels) ---
const MOBILENET_INPUT_SIZE: usize = CLASSIFIER_INPUT_SIZE as usize;
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
const IMAGENET_CLASSES: usize = 1000;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model file not found: {0}; download mobilenetv2-12.onnx and place it in the model directory")]
    ModelNotFound(String),
    #[error("label file unreadable: {path}: {source}")]
    Labels {
        path: String,
        source: std::io::Error,
    },
    #[error("label file {path} has {found} labels, expected {expected}")]
    LabelCount {
        path: String,
        found: usize,
        expected: usize,
    },
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// MobileNetV2-based ImageNet classifier.
pub struct ImageClassifier {
    session: Session,
    labels: Vec<String>,
}

impl ImageClassifier {
    /// Load the MobileNetV2 ONNX model and its ImageNet label file.
    pub fn load(model_path: &str, labels_path: &str) -> Result<Self, ClassifierError> {
        if !Path::new(model_path).exists() {
            return Err(ClassifierError::ModelNotFound(model_path.to_string()));
        }

        let text = std::fs::read_to_string(labels_path).map_err(|source| ClassifierError::Labels {
            path: labels_path.to_string(),
            source,
        })?;
        let labels = parse_labels(&text);
        if labels.len() != IMAGENET_CLASSES {
            return Err(ClassifierError::LabelCount {
                path: labels_path.to_string(),
                found: labels.len(),
                expected: IMAGENET_CLASSES,
            });
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            labels = labels.len(),
            "loaded MobileNetV2 model"
        );

        Ok(Self { session, labels })
    }

    /// Classify an RGB image, returning the `top_k` most likely labels.
    pub fn classify(&mut self, image: &RgbImage, top_k: usize) -> Result<Vec<Prediction>, ClassifierError> {
        let input = Self::preprocess(image);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("score extraction: {e}")))?;

        if raw_data.len() != self.labels.len() {
            return Err(ClassifierError::InferenceFailed(format!(
                "expected {} class scores, got {}",
                self.labels.len(),
                raw_data.len()
            )));
        }

        // Some exports end in a softmax layer, most emit logits.
        let probs = if is_probability_vector(raw_data) {
            raw_data.to_vec()
        } else {
            softmax(raw_data)
        };

        Ok(top_k_indices(&probs, top_k)
            .into_iter()
            .map(|i| Prediction::new(self.labels[i].clone(), probs[i]))
            .collect())
    }

    /// Preprocess an RGB image into a NCHW float tensor with ImageNet normalization.
    fn preprocess(image: &RgbImage) -> Array4<f32> {
        let size = MOBILENET_INPUT_SIZE;
        let resized;
        let source = if image.dimensions() == (size as u32, size as u32) {
            image
        } else {
            resized = imageops::resize(image, size as u32, size as u32, FilterType::Triangle);
            &resized
        };

        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in source.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                let value = pixel[c] as f32 / 255.0;
                tensor[[0, c, y, x]] = (value - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            }
        }

        tensor
    }
}

impl ImageClassification for ImageClassifier {
    type Error = ClassifierError;

    fn classify_image(&mut self, image: &RgbImage, top_k: usize) -> Result<Vec<Prediction>, ClassifierError> {
        self.classify(image, top_k)
    }
}

/// Parse a label file into class names.
///
/// Accepts plain names (`sports_car`), WordNet-prefixed lines
/// (`n04285008 sports_car`) and synonym lists (`sports car, sport car`);
/// the first synonym is kept and spaces become underscores.
fn parse_labels(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let name = match line.split_once(' ') {
                Some((wnid, rest)) if is_wordnet_id(wnid) => rest,
                _ => line,
            };
            let first = name.split(',').next().unwrap_or(name).trim();
            first.replace(' ', "_")
        })
        .collect()
}

fn is_wordnet_id(token: &str) -> bool {
    token.len() == 9 && token.starts_with('n') && token[1..].bytes().all(|b| b.is_ascii_digit())
}

fn is_probability_vector(values: &[f32]) -> bool {
    let in_range = values.iter().all(|v| (0.0..=1.0).contains(v));
    let sum: f32 = values.iter().sum();
    in_range && (sum - 1.0).abs() < 1e-3
}

/// Numerically stable softmax.
fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum > 0.0 {
        exps.iter().map(|e| e / sum).collect()
    } else {
        vec![0.0; logits.len()]
    }
}

/// Indices of the `k` largest values, highest first. Ties keep index order.
fn top_k_indices(values: &[f32], k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..values.len()).collect();
    indices.sort_by(|&a, &b| {
        values[b]
            .partial_cmp(&values[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    indices.truncate(k);
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0, 4.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_softmax_large_logits_stable() {
        let probs = softmax(&[1000.0, 1000.0]);
        assert!((probs[0] - 0.5).abs() < 1e-6);
        assert!(probs.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_top_k_indices() {
        let values = [0.1, 0.5, 0.05, 0.3, 0.05];
        assert_eq!(top_k_indices(&values, 3), vec![1, 3, 0]);
        assert_eq!(top_k_indices(&values, 10).len(), 5);
    }

    #[test]
    fn test_is_probability_vector() {
        assert!(is_probability_vector(&[0.2, 0.3, 0.5]));
        assert!(!is_probability_vector(&[2.0, -1.0, 0.5]));
        assert!(!is_probability_vector(&[0.2, 0.2, 0.2]));
    }

    #[test]
    fn test_parse_labels_formats() {
        let text = "tench\nn04285008 sports_car\nsports car, sport car\n\n  Model T  \n";
        assert_eq!(
            parse_labels(text),
            vec!["tench", "sports_car", "sports_car", "Model_T"]
        );
    }

    #[test]
    fn test_preprocess_output_shape_and_normalization() {
        let img = RgbImage::from_pixel(10, 20, image::Rgb([255, 0, 128]));
        let tensor = ImageClassifier::preprocess(&img);
        assert_eq!(tensor.shape(), &[1, 3, MOBILENET_INPUT_SIZE, MOBILENET_INPUT_SIZE]);

        let r = tensor[[0, 0, 5, 5]];
        let expected_r = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        assert!((r - expected_r).abs() < 1e-4, "got {r}, expected {expected_r}");

        let g = tensor[[0, 1, 5, 5]];
        let expected_g = (0.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1];
        assert!((g - expected_g).abs() < 1e-4);
    }

    #[test]
    fn test_load_missing_model() {
        let err = ImageClassifier::load("/nonexistent/mobilenetv2-12.onnx", "/nonexistent/labels.txt")
            .err()
            .unwrap();
        assert!(matches!(err, ClassifierError::ModelNotFound(_)));
    }
}
