use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use image::RgbImage;
use likeness_core::generate::{
    DEFAULT_ADAPTER_STRENGTH, DEFAULT_GUIDANCE_SCALE, DEFAULT_IDENTITYNET_STRENGTH,
    DEFAULT_NEGATIVE_PROMPT, DEFAULT_NUM_STEPS, DEFAULT_SEED,
};
use likeness_core::{
    draw_skeleton, open_image, randomize_seed, resize_image, FaceAnalyzer, GenerationError,
    GenerationRequest, ImageRole, OrtFaceAnalyzer, ResizeSpec,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod export;

use config::Config;
use export::ConditioningExporter;

#[derive(Parser)]
#[command(name = "likeness", about = "Identity-preserving image generation front end")]
struct Cli {
    /// Style table to use instead of the built-in one
    #[arg(long, global = true)]
    styles_file: Option<PathBuf>,

    /// Directory containing the face analysis models
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available style templates
    Styles,
    /// Resize an image onto the 64-pixel generation grid
    Resize {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, default_value_t = 1024)]
        max_side: u32,
        #[arg(long, default_value_t = 1024)]
        min_side: u32,
        /// Centre the result on a white max_side × max_side canvas
        #[arg(long)]
        pad: bool,
    },
    /// Detect the primary face in a photo and render its keypoint skeleton
    Pose {
        face: PathBuf,
        #[arg(short, long, default_value = "pose.png")]
        out: PathBuf,
    },
    /// Prepare a generation request and export its conditioning bundle
    Generate {
        /// Face photo (repeatable; the first is used)
        #[arg(long = "face", required = true)]
        faces: Vec<PathBuf>,
        /// Optional pose reference photo
        #[arg(long)]
        pose: Option<PathBuf>,
        #[arg(short, long, default_value = "")]
        prompt: String,
        #[arg(long, default_value = DEFAULT_NEGATIVE_PROMPT)]
        negative_prompt: String,
        /// Style template name (see `likeness styles`)
        #[arg(long)]
        style: Option<String>,
        #[arg(long, default_value_t = DEFAULT_NUM_STEPS)]
        steps: u32,
        /// IdentityNet strength (pose/identity fidelity)
        #[arg(long, default_value_t = DEFAULT_IDENTITYNET_STRENGTH)]
        identitynet_strength: f32,
        /// Image adapter strength (identity detail)
        #[arg(long, default_value_t = DEFAULT_ADAPTER_STRENGTH)]
        adapter_strength: f32,
        #[arg(long, default_value_t = DEFAULT_GUIDANCE_SCALE)]
        guidance_scale: f32,
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,
        /// Ignore --seed and draw a fresh one
        #[arg(long)]
        randomize_seed: bool,
        #[arg(short, long, default_value = "out")]
        out_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(path) = cli.styles_file {
        config.styles_path = Some(path);
    }
    if let Some(dir) = cli.model_dir {
        config.model_dir = dir;
    }

    match cli.command {
        Commands::Styles => {
            let styles = config.load_styles()?;
            for name in styles.names() {
                let marker = if name == styles.default_name() { " (default)" } else { "" };
                println!("{name}{marker}");
            }
        }
        Commands::Resize {
            input,
            output,
            max_side,
            min_side,
            pad,
        } => {
            let spec = ResizeSpec {
                max_side,
                min_side,
                pad_to_max_side: pad,
                ..ResizeSpec::default()
            };
            let resized = resize_image(&load_rgb(&input)?, &spec);
            resized
                .save(&output)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("{} -> {}x{}", output.display(), resized.width(), resized.height());
        }
        Commands::Pose { face, out } => {
            let mut analyzer = OrtFaceAnalyzer::load(
                &config.model_dir,
                &config.detector_model,
                &config.recognizer_model,
                config.intra_threads,
            )?;
            let image = resize_image(&load_rgb(&face)?, &config.resize_spec());
            let faces = analyzer.analyze(&image)?;
            let chosen = config
                .face_selection
                .select(&faces)
                .ok_or(GenerationError::NoFaceDetected(ImageRole::Face))?;

            let skeleton = draw_skeleton(image.dimensions(), &chosen.keypoints);
            skeleton
                .save(&out)
                .with_context(|| format!("writing {}", out.display()))?;
            println!(
                "{} faces found; skeleton written to {}",
                faces.len(),
                out.display()
            );
        }
        Commands::Generate {
            faces,
            pose,
            prompt,
            negative_prompt,
            style,
            steps,
            identitynet_strength,
            adapter_strength,
            guidance_scale,
            seed,
            randomize_seed: randomize,
            out_dir,
        } => {
            let exporter = ConditioningExporter::new(&out_dir);
            let generator = engine::load_generator(&config, exporter)?;
            let style_name = style.unwrap_or_else(|| generator.styles().default_name().to_string());
            let handle = engine::spawn_engine(generator)?;

            let request = GenerationRequest {
                face_images: faces.iter().map(|p| load_rgb(p)).collect::<Result<_>>()?,
                pose_images: pose.iter().map(|p| load_rgb(p)).collect::<Result<_>>()?,
                prompt,
                negative_prompt,
                style_name,
                num_steps: steps,
                identitynet_strength_ratio: identitynet_strength,
                adapter_strength_ratio: adapter_strength,
                guidance_scale,
                seed: randomize_seed(seed, randomize),
            };

            let output = handle.generate(request).await?;
            for (i, image) in output.images.iter().enumerate() {
                let path = out_dir.join(format!("image-{i}.png"));
                image
                    .save(&path)
                    .with_context(|| format!("writing {}", path.display()))?;
            }

            println!("prompt:          {}", output.prompt);
            println!("negative prompt: {}", output.negative_prompt);
            println!("size:            {}x{}", output.width, output.height);
            println!("seed:            {}", output.seed);
            println!("bundle:          {}", out_dir.display());
        }
    }

    Ok(())
}

fn load_rgb(path: &Path) -> Result<RgbImage> {
    open_image(path).with_context(|| format!("reading image {}", path.display()))
}
