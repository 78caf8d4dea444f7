//! Aspect-preserving resize onto the diffusion model's pixel grid.

use image::imageops::{self, FilterType};
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader, ImageResult, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_SIDE: u32 = 1024;
const DEFAULT_BASE_PIXEL_NUMBER: u32 = 64;
const PAD_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Resize parameters. No state beyond the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResizeSpec {
    pub max_side: u32,
    pub min_side: u32,
    /// Explicit output size; bypasses the aspect logic.
    pub size: Option<(u32, u32)>,
    pub pad_to_max_side: bool,
    pub base_pixel_number: u32,
}

impl Default for ResizeSpec {
    fn default() -> Self {
        Self {
            max_side: DEFAULT_SIDE,
            min_side: DEFAULT_SIDE,
            size: None,
            pad_to_max_side: false,
            base_pixel_number: DEFAULT_BASE_PIXEL_NUMBER,
        }
    }
}

impl ResizeSpec {
    /// Output dimensions for an input of `width × height`, before padding.
    ///
    /// The short side is first scaled to `min_side`, then the long side is
    /// capped at `max_side`, and both are floored to a multiple of
    /// `base_pixel_number`. Halves round to even. A side that would floor to
    /// zero keeps one base unit.
    pub fn target_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        if let Some(size) = self.size {
            return size;
        }

        let (w, h) = (width.max(1) as f64, height.max(1) as f64);
        let ratio = self.min_side as f64 / w.min(h);
        let (w, h) = ((ratio * w).round_ties_even(), (ratio * h).round_ties_even());
        let ratio = self.max_side as f64 / w.max(h);

        let base = self.base_pixel_number.max(1);
        let snap = |side: f64| {
            let side = (ratio * side).round_ties_even() as u32;
            (side / base).max(1) * base
        };
        (snap(w), snap(h))
    }
}

/// Decode an image file to RGB, upright according to its EXIF orientation.
pub fn open_image(path: impl AsRef<Path>) -> ImageResult<RgbImage> {
    let mut decoder = ImageReader::open(path)?.with_guessed_format()?.into_decoder()?;
    let orientation = decoder.orientation()?;
    let image = DynamicImage::from_decoder(decoder)?;
    Ok(upright(image, orientation))
}

fn upright(mut image: DynamicImage, orientation: Orientation) -> RgbImage {
    if orientation != Orientation::NoTransforms {
        tracing::debug!(?orientation, "applying EXIF orientation");
        image.apply_orientation(orientation);
    }
    image.to_rgb8()
}

/// Resize `image` according to `spec`, optionally centring it on a white
/// `max_side × max_side` canvas.
pub fn resize_image(image: &RgbImage, spec: &ResizeSpec) -> RgbImage {
    let (new_w, new_h) = spec.target_dimensions(image.width(), image.height());

    let resized = if (new_w, new_h) == image.dimensions() {
        image.clone()
    } else {
        imageops::resize(image, new_w, new_h, FilterType::Triangle)
    };

    tracing::debug!(
        from = ?image.dimensions(),
        to = ?(new_w, new_h),
        pad = spec.pad_to_max_side,
        "resized image"
    );

    if !spec.pad_to_max_side {
        return resized;
    }

    let side = spec.max_side;
    let mut canvas = RgbImage::from_pixel(side, side, PAD_COLOR);
    let offset_x = (side as i64 - new_w as i64).div_euclid(2);
    let offset_y = (side as i64 - new_h as i64).div_euclid(2);
    imageops::overlay(&mut canvas, &resized, offset_x, offset_y);
    canvas
}
