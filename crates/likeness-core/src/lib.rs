//! likeness-core: identity-preserving generation building blocks.
//!
//! Face analysis (SCRFD + ArcFace via ONNX Runtime), pose skeleton rendering,
//! style templating, and the orchestrator that hands conditioning inputs to a
//! diffusion back end.

pub mod alignment;
pub mod analyzer;
pub mod detector;
pub mod generate;
pub mod geometry;
pub mod recognizer;
pub mod skeleton;
pub mod style;
pub mod synth;
pub mod types;

pub use analyzer::{AnalyzerError, FaceAnalyzer, OrtFaceAnalyzer};
pub use generate::{
    randomize_seed, GenerationError, GenerationOutput, GenerationRequest, Generator, ImageRole,
};
pub use geometry::{open_image, resize_image, ResizeSpec};
pub use skeleton::{draw_skeleton, draw_skeleton_with_palette};
pub use style::{StyleBook, StyleEntry, StyleError};
pub use synth::{SynthesisError, SynthesisRequest, Synthesizer};
pub use types::{BoundingBox, Embedding, FaceDetection, FaceSelection, Keypoints};

use std::path::PathBuf;

/// Default location of the face analysis model pack: `./models/antelopev2`.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("models").join("antelopev2")
}
