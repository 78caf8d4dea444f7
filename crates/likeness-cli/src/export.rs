//! Conditioning export: hands a fully prepared request to an external
//! diffusion runner through the filesystem.

use image::RgbImage;
use likeness_core::{Embedding, SynthesisError, SynthesisRequest, Synthesizer};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

pub const CONTROL_IMAGE_FILE: &str = "control.png";
pub const REQUEST_FILE: &str = "request.json";

/// On-disk form of a [`SynthesisRequest`]. The generator itself is not
/// serialisable; runners reseed from `seed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub controlnet_conditioning_scale: f32,
    pub adapter_scale: f32,
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
    pub width: u32,
    pub height: u32,
    pub seed: u64,
    /// Control image path, relative to the request file.
    pub control_image: String,
    pub embedding: Embedding,
}

/// Writes `control.png` and `request.json` into `out_dir` instead of
/// sampling. Produces no images of its own.
pub struct ConditioningExporter {
    out_dir: PathBuf,
}

impl ConditioningExporter {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self { out_dir: out_dir.into() }
    }
}

impl Synthesizer for ConditioningExporter {
    fn synthesize(&mut self, request: SynthesisRequest) -> Result<Vec<RgbImage>, SynthesisError> {
        std::fs::create_dir_all(&self.out_dir)?;

        let control_path = self.out_dir.join(CONTROL_IMAGE_FILE);
        request.control_image.save(&control_path)?;

        let exported = ExportedRequest {
            prompt: request.prompt,
            negative_prompt: request.negative_prompt,
            controlnet_conditioning_scale: request.controlnet_conditioning_scale,
            adapter_scale: request.adapter_scale,
            num_inference_steps: request.num_inference_steps,
            guidance_scale: request.guidance_scale,
            width: request.width,
            height: request.height,
            seed: request.seed,
            control_image: CONTROL_IMAGE_FILE.to_string(),
            embedding: request.embedding,
        };

        let request_path = self.out_dir.join(REQUEST_FILE);
        let writer = BufWriter::new(File::create(&request_path)?);
        serde_json::to_writer_pretty(writer, &exported)?;

        tracing::info!(
            dir = %self.out_dir.display(),
            seed = exported.seed,
            "exported conditioning bundle"
        );
        Ok(Vec::new())
    }
}
