//! ArcFace identity embeddings via ONNX Runtime.

use crate::alignment::{self, ALIGNED_SIZE};
use crate::types::{Embedding, Keypoints};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // symmetric, unlike SCRFD's 128.0
const ARCFACE_EMBEDDING_DIM: usize = 512;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("recognizer model not found: {0} (place the antelopev2 pack in the model directory)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct FaceRecognizer {
    session: Session,
    model_version: String,
}

impl FaceRecognizer {
    /// Load an ArcFace ONNX model. The file stem becomes the embedding's
    /// model version tag.
    pub fn load(model_path: &str, intra_threads: usize) -> Result<Self, RecognizerError> {
        let path = Path::new(model_path);
        if !path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)?;

        let model_version = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "arcface".to_string());

        tracing::info!(path = model_path, version = %model_version, "loaded ArcFace model");

        Ok(Self { session, model_version })
    }

    /// Embed the face at `keypoints`.
    ///
    /// The face is aligned to the canonical 112×112 crop first. The vector is
    /// returned as the network produced it, without L2 normalisation; the
    /// identity adapter downstream was trained on raw embeddings.
    pub fn extract(&mut self, image: &RgbImage, keypoints: &Keypoints) -> Result<Embedding, RecognizerError> {
        let aligned = alignment::align_face(image, keypoints);
        let input = preprocess(&aligned);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != ARCFACE_EMBEDDING_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {ARCFACE_EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding {
            values: raw.to_vec(),
            model_version: Some(self.model_version.clone()),
        })
    }
}

/// Aligned RGB crop → normalised NCHW tensor.
fn preprocess(aligned: &RgbImage) -> Array4<f32> {
    let size = ALIGNED_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for (x, y, pixel) in aligned.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        if x >= size || y >= size {
            continue;
        }
        for c in 0..3 {
            tensor[[0, c, y, x]] = (pixel[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
        }
    }

    tensor
}
