//! SCRFD face detector via ONNX Runtime.
//!
//! Anchor-free decoding over three strides with five-point landmarks,
//! followed by NMS. Input is an RGB image of any size; it is letterboxed
//! into the 640×640 model input and detections are mapped back.

use crate::types::{BoundingBox, Keypoints};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector model not found: {0} (place the antelopev2 pack in the model directory)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A face box with its landmarks, in source-image coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub keypoints: Keypoints,
}

/// Coordinate de-mapping after letterbox resize.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Output tensor indices for one stride: (score_idx, bbox_idx, kps_idx).
type StrideOutputIndices = (usize, usize, usize);

pub struct FaceDetector {
    session: Session,
    input_size: usize,
    stride_indices: [StrideOutputIndices; 3],
}

impl FaceDetector {
    /// Load an SCRFD (bnkps) ONNX model.
    pub fn load(model_path: &str, intra_threads: usize) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = model_path,
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {}",
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            input_size: SCRFD_INPUT_SIZE,
            stride_indices,
        })
    }

    /// Detect faces, highest confidence first.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, DetectorError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }

        let (input, letterbox) = preprocess(image, self.input_size);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut all_detections = Vec::new();
        for (stride_pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.stride_indices[stride_pos];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;
            let (_, kps) = outputs[kps_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("kps stride {stride}: {e}")))?;

            all_detections.extend(decode_stride(
                StrideOutputs { scores, bboxes, kps },
                stride,
                self.input_size,
                &letterbox,
                SCRFD_CONFIDENCE_THRESHOLD,
            ));
        }

        let faces = nms(all_detections, SCRFD_NMS_THRESHOLD);
        tracing::debug!(faces = faces.len(), "SCRFD detection complete");
        Ok(faces)
    }
}

/// Letterbox an RGB image into a normalised NCHW tensor.
///
/// Padding uses the mean value so it normalises to zero.
fn preprocess(image: &RgbImage, input_size: usize) -> (Array4<f32>, LetterboxInfo) {
    let (width, height) = (image.width() as f32, image.height() as f32);
    let scale = (input_size as f32 / width).min(input_size as f32 / height);

    let new_w = ((width * scale).round() as usize).clamp(1, input_size);
    let new_h = ((height * scale).round() as usize).clamp(1, input_size);
    let pad_x = (input_size - new_w) as f32 / 2.0;
    let pad_y = (input_size - new_h) as f32 / 2.0;

    let resized = imageops::resize(image, new_w as u32, new_h as u32, FilterType::Triangle);

    let pad_x_start = pad_x.floor() as usize;
    let pad_y_start = pad_y.floor() as usize;

    let mut tensor = Array4::<f32>::from_elem((1, 3, input_size, input_size), 0.0);
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (tx, ty) = (x as usize + pad_x_start, y as usize + pad_y_start);
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (pixel[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    (tensor, LetterboxInfo { scale, pad_x, pad_y })
}

/// Map output names to stride slots.
///
/// Named exports ("score_8", "bbox_16", "kps_32", ...) are matched by name.
/// Anything else uses the standard positional layout:
///   [0-2] = scores, [3-5] = bboxes, [6-8] = kps  (strides 8, 16, 32)
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let named: Option<Vec<StrideOutputIndices>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?, find("kps", stride)?)))
        .collect();

    match named.as_deref() {
        Some(&[s8, s16, s32]) => {
            tracing::debug!("SCRFD: using name-based output tensor mapping");
            [s8, s16, s32]
        }
        _ => {
            tracing::debug!(?names, "SCRFD: output names not recognized, using positional mapping");
            [(0, 3, 6), (1, 4, 7), (2, 5, 8)]
        }
    }
}

struct StrideOutputs<'a> {
    scores: &'a [f32],
    bboxes: &'a [f32],
    kps: &'a [f32],
}

/// Decode detections for one stride level. Anchors without a full set of
/// landmarks are skipped.
fn decode_stride(
    out: StrideOutputs<'_>,
    stride: usize,
    input_size: usize,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<DetectedFace> {
    let grid = input_size / stride;
    let num_anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let s = stride as f32;
    let unmap = |x: f32, y: f32| {
        (
            (x - letterbox.pad_x) / letterbox.scale,
            (y - letterbox.pad_y) / letterbox.scale,
        )
    };

    let mut detections = Vec::new();

    for idx in 0..num_anchors {
        let score = out.scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let (Some(b), Some(k)) = (out.bboxes.get(idx * 4..idx * 4 + 4), out.kps.get(idx * 10..idx * 10 + 10)) else {
            continue;
        };

        let cell = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_x = (cell % grid) as f32 * s;
        let anchor_y = (cell / grid) as f32 * s;

        let (x1, y1) = unmap(anchor_x - b[0] * s, anchor_y - b[1] * s);
        let (x2, y2) = unmap(anchor_x + b[2] * s, anchor_y + b[3] * s);

        let keypoints = Keypoints(std::array::from_fn(|i| {
            unmap(anchor_x + k[i * 2] * s, anchor_y + k[i * 2 + 1] * s)
        }));

        detections.push(DetectedFace {
            bbox: BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
            },
            keypoints,
        });
    }

    detections
}

/// Non-maximum suppression; result is sorted by confidence, descending.
fn nms(mut detections: Vec<DetectedFace>, iou_threshold: f32) -> Vec<DetectedFace> {
    detections.sort_by(|a, b| {
        b.bbox
            .confidence
            .partial_cmp(&a.bbox.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<DetectedFace> = Vec::new();
    for det in detections {
        if keep.iter().all(|k| iou(&k.bbox, &det.bbox) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

/// Intersection-over-union of two boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let inter_w = (a.x2().min(b.x2()) - a.x.max(b.x)).max(0.0);
    let inter_h = (a.y2().min(b.y2()) - a.y.max(b.y)).max(0.0);
    let inter_area = inter_w * inter_h;
    let union_area = a.area() + b.area() - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}
