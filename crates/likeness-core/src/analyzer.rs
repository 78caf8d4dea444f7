//! Face analysis: detection plus identity embedding for every face.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::FaceDetection;
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_DETECTOR_MODEL: &str = "scrfd_10g_bnkps.onnx";
pub const DEFAULT_RECOGNIZER_MODEL: &str = "glintr100.onnx";

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Finds faces in an image and describes each one.
///
/// An empty result is a valid answer, not an error.
pub trait FaceAnalyzer {
    fn analyze(&mut self, image: &RgbImage) -> Result<Vec<FaceDetection>, AnalyzerError>;
}

/// SCRFD detection followed by ArcFace embedding, both on ONNX Runtime.
pub struct OrtFaceAnalyzer {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OrtFaceAnalyzer {
    pub fn new(detector: FaceDetector, recognizer: FaceRecognizer) -> Self {
        Self { detector, recognizer }
    }

    /// Load both models from `model_dir`.
    pub fn load(
        model_dir: &Path,
        detector_model: &str,
        recognizer_model: &str,
        intra_threads: usize,
    ) -> Result<Self, AnalyzerError> {
        let detector_path = model_dir.join(detector_model);
        let recognizer_path = model_dir.join(recognizer_model);
        let detector = FaceDetector::load(&detector_path.to_string_lossy(), intra_threads)?;
        let recognizer = FaceRecognizer::load(&recognizer_path.to_string_lossy(), intra_threads)?;
        Ok(Self::new(detector, recognizer))
    }
}

impl FaceAnalyzer for OrtFaceAnalyzer {
    fn analyze(&mut self, image: &RgbImage) -> Result<Vec<FaceDetection>, AnalyzerError> {
        let detected = self.detector.detect(image)?;

        let mut faces = Vec::with_capacity(detected.len());
        for face in detected {
            let embedding = self.recognizer.extract(image, &face.keypoints)?;
            faces.push(FaceDetection {
                bbox: face.bbox,
                keypoints: face.keypoints,
                embedding,
            });
        }

        tracing::debug!(
            faces = faces.len(),
            width = image.width(),
            height = image.height(),
            "face analysis complete"
        );
        Ok(faces)
    }
}

impl<T: FaceAnalyzer + ?Sized> FaceAnalyzer for &mut T {
    fn analyze(&mut self, image: &RgbImage) -> Result<Vec<FaceDetection>, AnalyzerError> {
        (**self).analyze(image)
    }
}
