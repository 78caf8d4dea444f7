//! Identity-preserving generation: inputs in, conditioned synthesis out.
//!
//! The [`Generator`] owns its face analyzer and synthesizer, both built once
//! at start-up. Each call is independent; nothing is carried between requests.

use crate::analyzer::{AnalyzerError, FaceAnalyzer};
use crate::geometry::{resize_image, ResizeSpec};
use crate::skeleton::draw_skeleton;
use crate::style::StyleBook;
use crate::synth::{SynthesisError, SynthesisRequest, Synthesizer};
use crate::types::FaceSelection;
use image::RgbImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use thiserror::Error;

/// Largest seed offered to users (`i32::MAX`).
pub const MAX_SEED: u64 = i32::MAX as u64;
pub const DEFAULT_PROMPT: &str = "a person";
pub const DEFAULT_NEGATIVE_PROMPT: &str = "(lowres, low quality, worst quality:1.2), (text:1.2), watermark, (frame:1.2), deformed, ugly, deformed eyes, blur, out of focus, blurry, deformed cat, deformed, photo, anthropomorphic cat, monochrome, pet collar, gun, weapon, blue, 3d, drones, drone, buildings in background, green";
pub const DEFAULT_STYLE: &str = "Watercolor";
pub const DEFAULT_NUM_STEPS: u32 = 22;
pub const DEFAULT_IDENTITYNET_STRENGTH: f32 = 0.70;
pub const DEFAULT_ADAPTER_STRENGTH: f32 = 0.60;
pub const DEFAULT_GUIDANCE_SCALE: f32 = 5.0;
pub const DEFAULT_SEED: u64 = 42;

/// Which uploaded image a face was expected in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    Face,
    Pose,
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRole::Face => f.write_str("image"),
            ImageRole::Pose => f.write_str("reference image"),
        }
    }
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Cannot find any input face image! Please upload the face image")]
    MissingFaceImage,
    #[error("Cannot find any face in the {0}! Please upload another person image")]
    NoFaceDetected(ImageRole),
    #[error("face analysis failed: {0}")]
    Analyzer(#[from] AnalyzerError),
    #[error("synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),
}

impl GenerationError {
    /// True for errors caused by the user's inputs rather than the back end.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, GenerationError::MissingFaceImage | GenerationError::NoFaceDetected(_))
    }
}

/// One generation request, as plain data.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Uploaded face photos; only the first is used.
    pub face_images: Vec<RgbImage>,
    /// Optional pose references; only the first is used.
    pub pose_images: Vec<RgbImage>,
    pub prompt: String,
    pub negative_prompt: String,
    pub style_name: String,
    pub num_steps: u32,
    pub identitynet_strength_ratio: f32,
    pub adapter_strength_ratio: f32,
    pub guidance_scale: f32,
    pub seed: u64,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            face_images: Vec::new(),
            pose_images: Vec::new(),
            prompt: String::new(),
            negative_prompt: DEFAULT_NEGATIVE_PROMPT.to_string(),
            style_name: DEFAULT_STYLE.to_string(),
            num_steps: DEFAULT_NUM_STEPS,
            identitynet_strength_ratio: DEFAULT_IDENTITYNET_STRENGTH,
            adapter_strength_ratio: DEFAULT_ADAPTER_STRENGTH,
            guidance_scale: DEFAULT_GUIDANCE_SCALE,
            seed: DEFAULT_SEED,
        }
    }
}

/// What a successful request produced.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub images: Vec<RgbImage>,
    pub prompt: String,
    pub negative_prompt: String,
    /// Skeleton image that conditioned the pose.
    pub control_image: RgbImage,
    pub width: u32,
    pub height: u32,
    pub seed: u64,
}

/// Return `seed`, or a fresh one in `0..=MAX_SEED` when `randomize` is set.
pub fn randomize_seed(seed: u64, randomize: bool) -> u64 {
    if randomize {
        rand::thread_rng().gen_range(0..=MAX_SEED)
    } else {
        seed
    }
}

pub struct Generator<A, S> {
    analyzer: A,
    synthesizer: S,
    styles: StyleBook,
    resize: ResizeSpec,
    face_selection: FaceSelection,
}

impl<A: FaceAnalyzer, S: Synthesizer> Generator<A, S> {
    pub fn new(analyzer: A, synthesizer: S, styles: StyleBook) -> Self {
        Self {
            analyzer,
            synthesizer,
            styles,
            resize: ResizeSpec::default(),
            face_selection: FaceSelection::default(),
        }
    }

    pub fn with_resize(mut self, resize: ResizeSpec) -> Self {
        self.resize = resize;
        self
    }

    pub fn with_face_selection(mut self, face_selection: FaceSelection) -> Self {
        self.face_selection = face_selection;
        self
    }

    pub fn styles(&self) -> &StyleBook {
        &self.styles
    }

    /// Run one request end to end.
    ///
    /// The primary face is chosen by the configured [`FaceSelection`]. When a
    /// pose reference is given, the last face the analyzer reports in it
    /// drives the skeleton, and the pose image's size becomes the output size.
    pub fn generate(&mut self, request: &GenerationRequest) -> Result<GenerationOutput, GenerationError> {
        let face_image = request.face_images.first().ok_or(GenerationError::MissingFaceImage)?;

        let prompt = if request.prompt.trim().is_empty() {
            DEFAULT_PROMPT
        } else {
            request.prompt.as_str()
        };
        let (prompt, negative_prompt) =
            self.styles
                .apply_style(&request.style_name, prompt, &request.negative_prompt);

        let face_image = resize_image(face_image, &self.resize);
        let faces = self.analyzer.analyze(&face_image)?;
        let face = self
            .face_selection
            .select(&faces)
            .ok_or(GenerationError::NoFaceDetected(ImageRole::Face))?;

        tracing::info!(
            faces = faces.len(),
            confidence = face.bbox.confidence,
            selection = ?self.face_selection,
            "primary face selected"
        );

        let embedding = face.embedding.clone();
        let (mut width, mut height) = face_image.dimensions();
        let mut control_image = draw_skeleton((width, height), &face.keypoints);

        if let Some(pose_image) = request.pose_images.first() {
            let pose_image = resize_image(pose_image, &self.resize);
            let pose_faces = self.analyzer.analyze(&pose_image)?;
            let pose_face = pose_faces
                .last()
                .ok_or(GenerationError::NoFaceDetected(ImageRole::Pose))?;

            (width, height) = pose_image.dimensions();
            control_image = draw_skeleton((width, height), &pose_face.keypoints);
            tracing::info!(width, height, "using reference pose");
        }

        let seed = request.seed;
        tracing::info!(seed, width, height, steps = request.num_steps, "start inference");
        tracing::debug!(%prompt, %negative_prompt, "styled prompts");

        let images = self.synthesizer.synthesize(SynthesisRequest {
            prompt: prompt.clone(),
            negative_prompt: negative_prompt.clone(),
            embedding,
            control_image: control_image.clone(),
            controlnet_conditioning_scale: request.identitynet_strength_ratio,
            adapter_scale: request.adapter_strength_ratio,
            num_inference_steps: request.num_steps,
            guidance_scale: request.guidance_scale,
            width,
            height,
            seed,
            generator: StdRng::seed_from_u64(seed),
        })?;

        tracing::info!(images = images.len(), "inference complete");

        Ok(GenerationOutput {
            images,
            prompt,
            negative_prompt,
            control_image,
            width,
            height,
            seed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, Embedding, FaceDetection, Keypoints};
    use image::Rgb;

    /// Returns scripted detections per call and records every image size it saw.
    #[derive(Default)]
    struct ScriptedAnalyzer {
        responses: Vec<Vec<FaceDetection>>,
        seen: Vec<(u32, u32)>,
    }

    impl FaceAnalyzer for ScriptedAnalyzer {
        fn analyze(&mut self, image: &RgbImage) -> Result<Vec<FaceDetection>, AnalyzerError> {
            self.seen.push(image.dimensions());
            Ok(if self.responses.is_empty() {
                Vec::new()
            } else {
                self.responses.remove(0)
            })
        }
    }

    #[derive(Default)]
    struct RecordingSynthesizer {
        requests: Vec<SynthesisRequest>,
        first_draws: Vec<u64>,
    }

    impl Synthesizer for RecordingSynthesizer {
        fn synthesize(&mut self, mut request: SynthesisRequest) -> Result<Vec<RgbImage>, SynthesisError> {
            self.first_draws.push(request.generator.gen());
            let out = RgbImage::new(request.width, request.height);
            self.requests.push(request);
            Ok(vec![out])
        }
    }

    struct FailingSynthesizer;

    impl Synthesizer for FailingSynthesizer {
        fn synthesize(&mut self, _request: SynthesisRequest) -> Result<Vec<RgbImage>, SynthesisError> {
            Err(SynthesisError::Backend("out of memory".into()))
        }
    }

    fn face_at(x: f32, y: f32, size: f32, tag: f32) -> FaceDetection {
        let cx = x + size / 2.0;
        let cy = y + size / 2.0;
        FaceDetection {
            bbox: BoundingBox { x, y, width: size, height: size, confidence: 0.9 },
            keypoints: Keypoints([
                (cx - 20.0, cy - 15.0),
                (cx + 20.0, cy - 15.0),
                (cx, cy),
                (cx - 15.0, cy + 20.0),
                (cx + 15.0, cy + 20.0),
            ]),
            embedding: Embedding { values: vec![tag; 4], model_version: None },
        }
    }

    fn photo(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([200, 180, 160]))
    }

    fn request_with(face_images: Vec<RgbImage>) -> GenerationRequest {
        GenerationRequest {
            face_images,
            prompt: "cat".into(),
            negative_prompt: String::new(),
            ..GenerationRequest::default()
        }
    }

    #[test]
    fn test_missing_face_image_short_circuits() {
        let mut analyzer = ScriptedAnalyzer::default();
        let mut synth = RecordingSynthesizer::default();
        let mut gen = Generator::new(&mut analyzer, &mut synth, StyleBook::builtin());

        let err = gen.generate(&request_with(vec![])).unwrap_err();
        assert!(matches!(err, GenerationError::MissingFaceImage));
        assert!(err.is_user_facing());
        drop(gen);

        assert!(analyzer.seen.is_empty());
        assert!(synth.requests.is_empty());
    }

    #[test]
    fn test_no_face_detected() {
        let mut synth = RecordingSynthesizer::default();
        let mut gen = Generator::new(ScriptedAnalyzer::default(), &mut synth, StyleBook::builtin());

        let err = gen.generate(&request_with(vec![photo(640, 480)])).unwrap_err();
        assert!(matches!(err, GenerationError::NoFaceDetected(ImageRole::Face)));
        assert_eq!(
            err.to_string(),
            "Cannot find any face in the image! Please upload another person image"
        );
        drop(gen);
        assert!(synth.requests.is_empty());
    }

    #[test]
    fn test_generates_with_styled_prompt_and_resized_face() {
        let analyzer = ScriptedAnalyzer {
            responses: vec![vec![face_at(300.0, 200.0, 200.0, 1.0)]],
            ..Default::default()
        };
        let mut synth = RecordingSynthesizer::default();
        let mut gen = Generator::new(analyzer, &mut synth, StyleBook::builtin());

        let mut request = request_with(vec![photo(640, 480), photo(10, 10)]);
        request.seed = 7;
        let output = gen.generate(&request).unwrap();
        drop(gen);

        let (prompt, negative) = StyleBook::builtin().apply_style("Watercolor", "cat", "");
        assert_eq!(output.prompt, prompt);
        assert_eq!(output.negative_prompt, negative);
        assert_eq!((output.width, output.height), (1024, 768));
        assert_eq!(output.control_image.dimensions(), (1024, 768));
        assert_eq!(output.images.len(), 1);
        assert_eq!(output.seed, 7);

        let sent = &synth.requests[0];
        assert_eq!(sent.prompt, prompt);
        assert_eq!(sent.embedding.values, vec![1.0; 4]);
        assert_eq!((sent.width, sent.height), (1024, 768));
        assert_eq!(sent.controlnet_conditioning_scale, DEFAULT_IDENTITYNET_STRENGTH);
        assert_eq!(sent.adapter_scale, DEFAULT_ADAPTER_STRENGTH);
        assert_eq!(sent.num_inference_steps, DEFAULT_NUM_STEPS);
        assert_eq!(sent.guidance_scale, DEFAULT_GUIDANCE_SCALE);
        // Nose dot of the selected face, drawn at full intensity.
        assert_eq!(*sent.control_image.get_pixel(400, 300), Rgb([0, 0, 255]));
    }

    #[test]
    fn test_empty_prompt_defaults_to_a_person() {
        let analyzer = ScriptedAnalyzer {
            responses: vec![vec![face_at(100.0, 100.0, 100.0, 1.0)]],
            ..Default::default()
        };
        let mut gen = Generator::new(analyzer, RecordingSynthesizer::default(), StyleBook::builtin());

        let mut request = request_with(vec![photo(512, 512)]);
        request.prompt = "   ".into();
        request.style_name = "(No style)".into();
        let output = gen.generate(&request).unwrap();
        assert_eq!(output.prompt, "a person");
    }

    #[test]
    fn test_literal_selection_picks_odd_key_winner() {
        // Under the literal key the small low face wins; its embedding is sent.
        let analyzer = ScriptedAnalyzer {
            responses: vec![vec![
                face_at(0.0, 0.0, 100.0, 1.0),
                face_at(500.0, 600.0, 60.0, 2.0),
            ]],
            ..Default::default()
        };
        let mut synth = RecordingSynthesizer::default();
        let mut gen = Generator::new(analyzer, &mut synth, StyleBook::builtin());
        gen.generate(&request_with(vec![photo(1024, 1024)])).unwrap();
        drop(gen);
        assert_eq!(synth.requests[0].embedding.values, vec![2.0; 4]);
    }

    #[test]
    fn test_area_selection_picks_largest_box() {
        let analyzer = ScriptedAnalyzer {
            responses: vec![vec![
                face_at(0.0, 0.0, 100.0, 1.0),
                face_at(500.0, 600.0, 60.0, 2.0),
            ]],
            ..Default::default()
        };
        let mut synth = RecordingSynthesizer::default();
        let mut gen = Generator::new(analyzer, &mut synth, StyleBook::builtin())
            .with_face_selection(FaceSelection::Area);
        gen.generate(&request_with(vec![photo(1024, 1024)])).unwrap();
        drop(gen);
        assert_eq!(synth.requests[0].embedding.values, vec![1.0; 4]);
    }

    #[test]
    fn test_pose_reference_uses_last_face_and_pose_size() {
        let mut analyzer = ScriptedAnalyzer {
            responses: vec![
                vec![face_at(100.0, 100.0, 200.0, 1.0)],
                vec![face_at(50.0, 50.0, 100.0, 8.0), face_at(600.0, 300.0, 100.0, 9.0)],
            ],
            ..Default::default()
        };
        let mut synth = RecordingSynthesizer::default();
        let mut gen = Generator::new(&mut analyzer, &mut synth, StyleBook::builtin());

        let mut request = request_with(vec![photo(1024, 1024)]);
        request.pose_images = vec![photo(480, 640)];
        let output = gen.generate(&request).unwrap();
        drop(gen);

        assert_eq!(analyzer.seen, vec![(1024, 1024), (768, 1024)]);
        assert_eq!((output.width, output.height), (768, 1024));

        let sent = &synth.requests[0];
        // Identity still comes from the primary face.
        assert_eq!(sent.embedding.values, vec![1.0; 4]);
        assert_eq!(sent.control_image.dimensions(), (768, 1024));
        // Skeleton follows the last pose face (nose at 650, 350).
        assert_eq!(*sent.control_image.get_pixel(650, 350), Rgb([0, 0, 255]));
        assert_eq!(*sent.control_image.get_pixel(100, 100), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_pose_without_face_fails() {
        let analyzer = ScriptedAnalyzer {
            responses: vec![vec![face_at(100.0, 100.0, 200.0, 1.0)], vec![]],
            ..Default::default()
        };
        let mut gen = Generator::new(analyzer, RecordingSynthesizer::default(), StyleBook::builtin());

        let mut request = request_with(vec![photo(512, 512)]);
        request.pose_images = vec![photo(512, 512)];
        let err = gen.generate(&request).unwrap_err();
        assert!(matches!(err, GenerationError::NoFaceDetected(ImageRole::Pose)));
        assert!(err.to_string().contains("reference image"));
    }

    #[test]
    fn test_same_seed_same_generator_stream() {
        let analyzer = ScriptedAnalyzer {
            responses: vec![
                vec![face_at(100.0, 100.0, 200.0, 1.0)],
                vec![face_at(100.0, 100.0, 200.0, 1.0)],
                vec![face_at(100.0, 100.0, 200.0, 1.0)],
            ],
            ..Default::default()
        };
        let mut synth = RecordingSynthesizer::default();
        let mut gen = Generator::new(analyzer, &mut synth, StyleBook::builtin());

        let mut request = request_with(vec![photo(512, 512)]);
        request.seed = 1234;
        gen.generate(&request).unwrap();
        gen.generate(&request).unwrap();
        request.seed = 1235;
        gen.generate(&request).unwrap();
        drop(gen);

        assert_eq!(synth.first_draws[0], synth.first_draws[1]);
        assert_ne!(synth.first_draws[0], synth.first_draws[2]);
    }

    #[test]
    fn test_synthesis_failure_is_not_user_facing() {
        let analyzer = ScriptedAnalyzer {
            responses: vec![vec![face_at(100.0, 100.0, 200.0, 1.0)]],
            ..Default::default()
        };
        let mut gen = Generator::new(analyzer, FailingSynthesizer, StyleBook::builtin());
        let err = gen.generate(&request_with(vec![photo(512, 512)])).unwrap_err();
        assert!(matches!(err, GenerationError::Synthesis(_)));
        assert!(!err.is_user_facing());
    }

    #[test]
    fn test_randomize_seed() {
        assert_eq!(randomize_seed(42, false), 42);
        for _ in 0..100 {
            assert!(randomize_seed(42, true) <= MAX_SEED);
        }
    }

    #[test]
    fn test_request_defaults() {
        let request = GenerationRequest::default();
        assert_eq!(request.num_steps, 22);
        assert_eq!(request.style_name, "Watercolor");
        assert_eq!(request.seed, 42);
        assert!((request.identitynet_strength_ratio - 0.70).abs() < 1e-6);
        assert!((request.adapter_strength_ratio - 0.60).abs() < 1e-6);
        assert!((request.guidance_scale - 5.0).abs() < 1e-6);
    }
}
