//! Face detection with an SCRFD ONNX model.
//!
//! The model predicts, for every anchor on three feature maps (strides 8,
//! 16 and 32), a face score, box distances and five landmarks. Anchors
//! above the score threshold are decoded into image coordinates and
//! overlapping boxes are merged with greedy NMS.

use crate::capability::FaceDetection;
use crate::preprocess::FACE_INPUT_SIZE;
use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::{DynValue, TensorRef};
use std::path::Path;
use thiserror::Error;

const INPUT_SIDE: usize = FACE_INPUT_SIZE as usize;
// Pixels are mapped to roughly [-1, 1]
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_SCALE: f32 = 128.0;
const SCORE_THRESHOLD: f32 = 0.5;
const NMS_IOU: f32 = 0.4;
const STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;
const OUTPUTS_PER_STRIDE: usize = 3;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}; download det_10g.onnx from insightface and place it in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Output tensor positions of the three heads for one stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StrideHeads {
    score: usize,
    bbox: usize,
    kps: usize,
}

/// Factors from caller image coordinates to detector input coordinates.
struct InputScale {
    x: f32,
    y: f32,
}

pub struct FaceDetector {
    session: Session,
    heads: [StrideHeads; 3],
}

impl FaceDetector {
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?names,
            "loaded SCRFD model"
        );

        let expected = STRIDES.len() * OUTPUTS_PER_STRIDE;
        if names.len() < expected {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD needs {expected} outputs (score, bbox and kps per stride), model has {}",
                names.len()
            )));
        }

        let heads = locate_heads(&names);
        tracing::debug!(?heads, "SCRFD head layout");

        Ok(Self { session, heads })
    }

    /// Faces in `image`, most confident first, in `image` coordinates.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        let (input, scale) = to_input_tensor(image);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (heads, stride) in self.heads.iter().zip(STRIDES) {
            let scores = head_values(&outputs[heads.score], "score", stride)?;
            let bboxes = head_values(&outputs[heads.bbox], "bbox", stride)?;
            let kps = head_values(&outputs[heads.kps], "kps", stride)?;
            candidates.extend(decode_stride(scores, bboxes, kps, stride, &scale, SCORE_THRESHOLD));
        }

        let faces = suppress_overlaps(candidates, NMS_IOU);
        tracing::debug!(faces = faces.len(), "SCRFD detection complete");
        Ok(faces)
    }
}

impl FaceDetection for FaceDetector {
    type Error = DetectorError;

    fn detect_faces(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        self.detect(image)
    }
}

fn head_values<'a>(value: &'a DynValue, head: &str, stride: usize) -> Result<&'a [f32], DetectorError> {
    value
        .try_extract_tensor::<f32>()
        .map(|(_, values)| values)
        .map_err(|e| DetectorError::InferenceFailed(format!("{head} head, stride {stride}: {e}")))
}

/// Stretch to the square input side and normalize into an NCHW tensor.
fn to_input_tensor(image: &RgbImage) -> (Array4<f32>, InputScale) {
    let side = INPUT_SIDE as u32;
    let (width, height) = image.dimensions();
    let scale = InputScale {
        x: side as f32 / width.max(1) as f32,
        y: side as f32 / height.max(1) as f32,
    };

    let resized;
    let source = if (width, height) == (side, side) {
        image
    } else {
        resized = imageops::resize(image, side, side, FilterType::Triangle);
        &resized
    };

    let mut tensor = Array4::<f32>::zeros((1, 3, INPUT_SIDE, INPUT_SIDE));
    for (x, y, pixel) in source.enumerate_pixels() {
        for (c, &value) in pixel.0.iter().enumerate() {
            tensor[[0, c, y as usize, x as usize]] = (value as f32 - PIXEL_MEAN) / PIXEL_SCALE;
        }
    }
    (tensor, scale)
}

/// Map each stride to its score/bbox/kps output positions.
///
/// Exports with `score_8`, `bbox_16`, `kps_32`... names are matched by
/// name in any order. Anything else is assumed to use the insightface
/// order: three score heads, then three bbox heads, then three kps heads.
fn locate_heads(names: &[String]) -> [StrideHeads; 3] {
    let position = |head: &str, stride: usize| {
        let wanted = format!("{head}_{stride}");
        names.iter().position(|n| *n == wanted)
    };

    let by_name = STRIDES.map(|stride| {
        Some(StrideHeads {
            score: position("score", stride)?,
            bbox: position("bbox", stride)?,
            kps: position("kps", stride)?,
        })
    });

    if let [Some(s8), Some(s16), Some(s32)] = by_name {
        return [s8, s16, s32];
    }

    tracing::info!(?names, "SCRFD output names not recognized; assuming positional layout");
    std::array::from_fn(|i| StrideHeads {
        score: i,
        bbox: i + STRIDES.len(),
        kps: i + 2 * STRIDES.len(),
    })
}

/// Turn one stride's head outputs into candidate boxes above `threshold`.
///
/// Box and landmark offsets are in stride units relative to the anchor
/// centre; results are divided by `scale` to land in caller coordinates.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    stride: usize,
    scale: &InputScale,
    threshold: f32,
) -> Vec<BoundingBox> {
    let cells_per_row = INPUT_SIDE / stride;
    let anchors = cells_per_row * cells_per_row * ANCHORS_PER_CELL;
    let step = stride as f32;

    scores
        .iter()
        .take(anchors)
        .enumerate()
        .filter(|&(_, &score)| score > threshold)
        .filter_map(|(anchor, &score)| {
            let cell = anchor / ANCHORS_PER_CELL;
            let cx = (cell % cells_per_row) as f32 * step;
            let cy = (cell / cells_per_row) as f32 * step;

            let d = bboxes.get(anchor * 4..anchor * 4 + 4)?;
            let left = (cx - d[0] * step) / scale.x;
            let top = (cy - d[1] * step) / scale.y;
            let right = (cx + d[2] * step) / scale.x;
            let bottom = (cy + d[3] * step) / scale.y;

            let landmarks = kps.get(anchor * 10..anchor * 10 + 10).map(|p| {
                std::array::from_fn(|i| {
                    (
                        (cx + p[2 * i] * step) / scale.x,
                        (cy + p[2 * i + 1] * step) / scale.y,
                    )
                })
            });

            Some(BoundingBox {
                x: left,
                y: top,
                width: right - left,
                height: bottom - top,
                confidence: score,
                landmarks,
            })
        })
        .collect()
}

/// Greedy NMS: keep boxes in confidence order unless they overlap a kept
/// box by more than `max_iou`.
fn suppress_overlaps(mut boxes: Vec<BoundingBox>, max_iou: f32) -> Vec<BoundingBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<BoundingBox> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        if kept.iter().all(|k| iou(k, &candidate) <= max_iou) {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let overlap_w = (a.x + a.width).min(b.x + b.width) - a.x.max(b.x);
    let overlap_h = (a.y + a.height).min(b.y + b.height) - a.y.max(b.y);
    let intersection = overlap_w.max(0.0) * overlap_h.max(0.0);
    let union = a.width * a.height + b.width * b.height - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
