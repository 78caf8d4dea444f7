//! Five-point facial skeleton rendering.
//!
//! Draws the pose conditioning image: one elongated ellipse per limb joining
//! an eye or mouth corner to the nose, dimmed, with a full-intensity dot on
//! every keypoint. Coordinates follow the keypoint order of [`Keypoints`].

use crate::types::Keypoints;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_polygon_mut};
use imageproc::point::Point;

/// Half-thickness of a limb ellipse, in pixels.
const STICK_WIDTH: i32 = 4;
const KEYPOINT_RADIUS: i32 = 10;
const LIMB_DIMMING: f32 = 0.6;
/// Angular step of the ellipse polygon, in degrees.
const ARC_STEP: i32 = 1;

/// Limbs as (from, to) keypoint indices; each eye and mouth corner joins the nose.
const LIMBS: [(usize, usize); 4] = [
    (Keypoints::LEFT_EYE, Keypoints::NOSE),
    (Keypoints::RIGHT_EYE, Keypoints::NOSE),
    (Keypoints::LEFT_MOUTH, Keypoints::NOSE),
    (Keypoints::RIGHT_MOUTH, Keypoints::NOSE),
];

/// Colour per keypoint index. A limb takes the colour of its first endpoint.
pub const DEFAULT_PALETTE: [Rgb<u8>; 5] = [
    Rgb([255, 0, 0]),
    Rgb([0, 255, 0]),
    Rgb([0, 0, 255]),
    Rgb([255, 255, 0]),
    Rgb([255, 0, 255]),
];

/// Render the skeleton for `keypoints` on a black `(width, height)` canvas
/// using [`DEFAULT_PALETTE`].
pub fn draw_skeleton(size: (u32, u32), keypoints: &Keypoints) -> RgbImage {
    draw_skeleton_with_palette(size, keypoints, &DEFAULT_PALETTE)
}

pub fn draw_skeleton_with_palette(
    (width, height): (u32, u32),
    keypoints: &Keypoints,
    palette: &[Rgb<u8>; 5],
) -> RgbImage {
    let mut canvas = RgbImage::new(width, height);
    let kps = keypoints.points();
    let in_reach = |point: (f32, f32)| within_reach(point, (width, height));

    for &(from, to) in &LIMBS {
        if !in_reach(kps[from]) || !in_reach(kps[to]) {
            tracing::debug!(from, to, "skipping limb far outside the canvas");
            continue;
        }
        let (x0, y0) = kps[from];
        let (x1, y1) = kps[to];

        let dx = x0 - x1;
        let dy = y0 - y1;
        let length = (dx * dx + dy * dy).sqrt();
        let angle = dy.atan2(dx).to_degrees() as i32;
        let center = (((x0 + x1) / 2.0) as i32, ((y0 + y1) / 2.0) as i32);

        let polygon = ellipse_polygon(center, ((length / 2.0) as i32, STICK_WIDTH), angle);
        fill_polygon(&mut canvas, &polygon, palette[from]);
    }

    for channel in canvas.iter_mut() {
        *channel = (*channel as f32 * LIMB_DIMMING) as u8;
    }

    for (idx, &(x, y)) in kps.iter().enumerate() {
        if !in_reach((x, y)) {
            continue;
        }
        draw_filled_circle_mut(&mut canvas, (x as i32, y as i32), KEYPOINT_RADIUS, palette[idx]);
    }

    canvas
}

/// Whether a keypoint is finite and no more than one canvas side plus a dot
/// radius away from the canvas. Anything further cannot be drawn in `i32`
/// pixel space without overflow.
fn within_reach((x, y): (f32, f32), (width, height): (u32, u32)) -> bool {
    let reach = width.max(height) as f32 + KEYPOINT_RADIUS as f32;
    x.is_finite()
        && y.is_finite()
        && (-reach..=width as f32 + reach).contains(&x)
        && (-reach..=height as f32 + reach).contains(&y)
}

/// Approximate a rotated ellipse by integer vertices over the full 0–360° arc.
///
/// `axes` are the semi-axes along and across the rotated direction; `angle` is
/// in degrees. Consecutive duplicate vertices are dropped, as is the closing
/// vertex that repeats the first one. A collapsed ellipse yields its centre.
fn ellipse_polygon(center: (i32, i32), axes: (i32, i32), angle: i32) -> Vec<Point<i32>> {
    let angle = angle.rem_euclid(360) as f64;
    let (sin_a, cos_a) = angle.to_radians().sin_cos();
    let (cx, cy) = (center.0 as f64, center.1 as f64);
    let (ax, ay) = (axes.0 as f64, axes.1 as f64);

    let mut points: Vec<Point<i32>> = Vec::with_capacity(361);
    for step in (0..=360).step_by(ARC_STEP as usize) {
        let (sin_t, cos_t) = (step as f64).to_radians().sin_cos();
        let x = ax * cos_t;
        let y = ay * sin_t;
        let pt = Point::new(
            (cx + x * cos_a - y * sin_a).round() as i32,
            (cy + x * sin_a + y * cos_a).round() as i32,
        );
        if points.last() != Some(&pt) {
            points.push(pt);
        }
    }

    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}

/// Fill a polygon clipped to the canvas. A single vertex paints one pixel.
fn fill_polygon(canvas: &mut RgbImage, polygon: &[Point<i32>], color: Rgb<u8>) {
    match polygon {
        [] => {}
        [p] => {
            let inside_x = (0..canvas.width() as i32).contains(&p.x);
            let inside_y = (0..canvas.height() as i32).contains(&p.y);
            if inside_x && inside_y {
                canvas.put_pixel(p.x as u32, p.y as u32, color);
            }
        }
        _ => draw_polygon_mut(canvas, polygon, color),
    }
}
