//! Contract for the diffusion back end.

use crate::types::Embedding;
use image::RgbImage;
use rand::rngs::StdRng;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("synthesis backend failed: {0}")]
    Backend(String),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("image encoding: {0}")]
    Image(#[from] image::ImageError),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything the diffusion pipeline is conditioned on for one call.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub prompt: String,
    pub negative_prompt: String,
    /// Identity embedding of the selected face.
    pub embedding: Embedding,
    /// Keypoint skeleton, sized `width × height`.
    pub control_image: RgbImage,
    /// IdentityNet (ControlNet) strength.
    pub controlnet_conditioning_scale: f32,
    /// Image adapter strength.
    pub adapter_scale: f32,
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
    pub width: u32,
    pub height: u32,
    pub seed: u64,
    /// Generator seeded with `seed`; consumed by the sampler.
    pub generator: StdRng,
}

/// Produces images from a conditioned request.
pub trait Synthesizer {
    fn synthesize(&mut self, request: SynthesisRequest) -> Result<Vec<RgbImage>, SynthesisError>;
}

impl<T: Synthesizer + ?Sized> Synthesizer for &mut T {
    fn synthesize(&mut self, request: SynthesisRequest) -> Result<Vec<RgbImage>, SynthesisError> {
        (**self).synthesize(request)
    }
}
