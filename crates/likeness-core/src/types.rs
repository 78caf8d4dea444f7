use serde::{Deserialize, Serialize};

/// Five facial landmarks of one face, always in the order
/// [left_eye, right_eye, nose, left_mouth, right_mouth].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoints(pub [(f32, f32); 5]);

impl Keypoints {
    pub const LEFT_EYE: usize = 0;
    pub const RIGHT_EYE: usize = 1;
    pub const NOSE: usize = 2;
    pub const LEFT_MOUTH: usize = 3;
    pub const RIGHT_MOUTH: usize = 4;

    pub fn points(&self) -> &[(f32, f32); 5] {
        &self.0
    }
}

/// Bounding box for a detected face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl BoundingBox {
    /// Right edge.
    pub fn x2(&self) -> f32 {
        self.x + self.width
    }

    /// Bottom edge.
    pub fn y2(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Identity embedding vector (512-dimensional for the ArcFace models).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model that produced this embedding (e.g., "glintr100").
    pub model_version: Option<String>,
}

/// One analysed face: where it is, its landmarks, and who it is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    pub bbox: BoundingBox,
    pub keypoints: Keypoints,
    pub embedding: Embedding,
}

/// Strategy used to pick the primary face when several are detected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaceSelection {
    /// Maximise `(x2 - x0) * y2 - y0`, the historical ranking key.
    #[default]
    Literal,
    /// Maximise the bounding-box area.
    Area,
}

impl FaceSelection {
    pub fn score(&self, bbox: &BoundingBox) -> f32 {
        match self {
            FaceSelection::Literal => (bbox.x2() - bbox.x) * bbox.y2() - bbox.y,
            FaceSelection::Area => bbox.area(),
        }
    }

    /// Pick the best-scoring face. Ties go to the later entry.
    pub fn select<'a>(&self, faces: &'a [FaceDetection]) -> Option<&'a FaceDetection> {
        faces.iter().max_by(|a, b| {
            self.score(&a.bbox)
                .partial_cmp(&self.score(&b.bbox))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }
}

impl std::str::FromStr for FaceSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "literal" => Ok(FaceSelection::Literal),
            "area" => Ok(FaceSelection::Area),
            other => Err(format!("unknown face selection '{other}' (expected literal or area)")),
        }
    }
}
