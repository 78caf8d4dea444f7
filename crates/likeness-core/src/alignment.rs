//! Face alignment via 4-DOF similarity transform.
//!
//! Warps a detected face to the canonical 112×112 ArcFace position using the
//! five reference landmarks and a least-squares fit.

use crate::types::Keypoints;
use image::{Rgb, RgbImage};

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// Least-squares similarity transform from `src` to `dst`.
///
/// Returns `[a, -b, tx, b, a, ty]`, i.e. the matrix
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
fn estimate_similarity_transform(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> [f32; 6] {
    // Normal equations for A * [a, b, tx, ty]^T = B, two rows per point:
    //   [sx, -sy, 1, 0] -> dx
    //   [sy,  sx, 0, 1] -> dy
    let mut ata = [[0.0f32; 4]; 4];
    let mut atb = [0.0f32; 4];

    for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
        let r1 = [sx, -sy, 1.0, 0.0];
        let r2 = [sy, sx, 0.0, 1.0];
        for j in 0..4 {
            for k in 0..4 {
                ata[j][k] += r1[j] * r1[k] + r2[j] * r2[k];
            }
            atb[j] += r1[j] * dx + r2[j] * dy;
        }
    }

    let [a, b, tx, ty] = solve_4x4(ata, atb);
    [a, -b, tx, b, a, ty]
}

/// Gaussian elimination with partial pivoting. A singular system yields the identity scale.
#[allow(clippy::needless_range_loop)]
fn solve_4x4(a: [[f32; 4]; 4], b: [f32; 4]) -> [f32; 4] {
    let mut m = [[0.0f32; 5]; 4];
    for i in 0..4 {
        m[i][..4].copy_from_slice(&a[i]);
        m[i][4] = b[i];
    }

    for col in 0..4 {
        let pivot_row = (col..4)
            .max_by(|&r1, &r2| {
                m[r1][col]
                    .abs()
                    .partial_cmp(&m[r2][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        m.swap(col, pivot_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
            return [1.0, 0.0, 0.0, 0.0];
        }

        for row in (col + 1)..4 {
            let factor = m[row][col] / pivot;
            for j in col..5 {
                m[row][j] -= factor * m[col][j];
            }
        }
    }

    let mut x = [0.0f32; 4];
    for i in (0..4).rev() {
        let tail: f32 = ((i + 1)..4).map(|j| m[i][j] * x[j]).sum();
        x[i] = (m[i][4] - tail) / m[i][i];
    }
    x
}

/// Bilinear warp of an RGB image through the inverse of `matrix`.
/// Samples outside the source are black.
fn warp_affine(image: &RgbImage, matrix: &[f32; 6], out_size: u32) -> RgbImage {
    let (a, tx) = (matrix[0], matrix[2]);
    let (b, ty) = (matrix[3], matrix[5]);

    // M = [[a, -b], [b, a]], det = a^2 + b^2
    let det = a * a + b * b;
    if det.abs() < 1e-12 {
        return RgbImage::new(out_size, out_size);
    }
    let ia = a / det;
    let ib = b / det;

    let (w, h) = (image.width() as i32, image.height() as i32);
    let sample = |x: i32, y: i32| -> [f32; 3] {
        if x >= 0 && x < w && y >= 0 && y < h {
            image.get_pixel(x as u32, y as u32).0.map(f32::from)
        } else {
            [0.0; 3]
        }
    };

    RgbImage::from_fn(out_size, out_size, |ox, oy| {
        let dx = ox as f32 - tx;
        let dy = oy as f32 - ty;
        let sx = ia * dx + ib * dy;
        let sy = -ib * dx + ia * dy;

        let x0 = sx.floor() as i32;
        let y0 = sy.floor() as i32;
        let fx = sx - x0 as f32;
        let fy = sy - y0 as f32;

        let (tl, tr) = (sample(x0, y0), sample(x0 + 1, y0));
        let (bl, br) = (sample(x0, y0 + 1), sample(x0 + 1, y0 + 1));

        Rgb(std::array::from_fn(|c| {
            let val = tl[c] * (1.0 - fx) * (1.0 - fy)
                + tr[c] * fx * (1.0 - fy)
                + bl[c] * (1.0 - fx) * fy
                + br[c] * fx * fy;
            val.round().clamp(0.0, 255.0) as u8
        }))
    })
}

/// Align a detected face to a canonical 112×112 RGB crop for ArcFace.
pub fn align_face(image: &RgbImage, keypoints: &Keypoints) -> RgbImage {
    let matrix = estimate_similarity_transform(keypoints.points(), &REFERENCE_LANDMARKS_112);
    warp_affine(image, &matrix, ALIGNED_SIZE)
}
