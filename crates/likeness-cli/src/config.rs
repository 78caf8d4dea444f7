use likeness_core::analyzer::{DEFAULT_DETECTOR_MODEL, DEFAULT_RECOGNIZER_MODEL};
use likeness_core::{FaceSelection, ResizeSpec, StyleBook, StyleError};
use std::path::PathBuf;
use std::str::FromStr;

/// Runtime configuration, loaded from `LIKENESS_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing the face analysis ONNX models.
    pub model_dir: PathBuf,
    /// SCRFD detector file name inside `model_dir`.
    pub detector_model: String,
    /// ArcFace recogniser file name inside `model_dir`.
    pub recognizer_model: String,
    /// Style table overriding the built-in one.
    pub styles_path: Option<PathBuf>,
    pub max_side: u32,
    pub min_side: u32,
    /// How the primary face is picked when several are found.
    pub face_selection: FaceSelection,
    /// ONNX Runtime intra-op threads per session.
    pub intra_threads: usize,
}

impl Config {
    /// Load configuration from the process environment with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = ResizeSpec::default();

        Self {
            model_dir: lookup("LIKENESS_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(likeness_core::default_model_dir),
            detector_model: lookup("LIKENESS_DETECTOR_MODEL")
                .unwrap_or_else(|| DEFAULT_DETECTOR_MODEL.to_string()),
            recognizer_model: lookup("LIKENESS_RECOGNIZER_MODEL")
                .unwrap_or_else(|| DEFAULT_RECOGNIZER_MODEL.to_string()),
            styles_path: lookup("LIKENESS_STYLES_FILE").map(PathBuf::from),
            max_side: parse_or(&lookup, "LIKENESS_MAX_SIDE", defaults.max_side),
            min_side: parse_or(&lookup, "LIKENESS_MIN_SIDE", defaults.min_side),
            face_selection: parse_or(&lookup, "LIKENESS_FACE_SELECTION", FaceSelection::default()),
            intra_threads: parse_or(&lookup, "LIKENESS_INTRA_THREADS", 2),
        }
    }

    pub fn resize_spec(&self) -> ResizeSpec {
        ResizeSpec {
            max_side: self.max_side,
            min_side: self.min_side,
            ..ResizeSpec::default()
        }
    }

    /// The configured style table, or the built-in one.
    pub fn load_styles(&self) -> Result<StyleBook, StyleError> {
        match &self.styles_path {
            Some(path) => StyleBook::load(path),
            None => Ok(StyleBook::builtin()),
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.model_dir, PathBuf::from("models/antelopev2"));
        assert_eq!(config.detector_model, "scrfd_10g_bnkps.onnx");
        assert_eq!(config.recognizer_model, "glintr100.onnx");
        assert!(config.styles_path.is_none());
        assert_eq!((config.max_side, config.min_side), (1024, 1024));
        assert_eq!(config.face_selection, FaceSelection::Literal);
        assert_eq!(config.intra_threads, 2);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("LIKENESS_MODEL_DIR", "/opt/models"),
            ("LIKENESS_MAX_SIDE", "1280"),
            ("LIKENESS_MIN_SIDE", " 768 "),
            ("LIKENESS_FACE_SELECTION", "area"),
            ("LIKENESS_STYLES_FILE", "/etc/likeness/styles.toml"),
        ]);
        assert_eq!(config.model_dir, PathBuf::from("/opt/models"));
        assert_eq!((config.max_side, config.min_side), (1280, 768));
        assert_eq!(config.face_selection, FaceSelection::Area);
        assert_eq!(config.styles_path, Some(PathBuf::from("/etc/likeness/styles.toml")));

        let spec = config.resize_spec();
        assert_eq!((spec.max_side, spec.min_side, spec.base_pixel_number), (1280, 768, 64));
    }

    #[test]
    fn test_unparsable_values_fall_back() {
        let config = config_from(&[
            ("LIKENESS_MAX_SIDE", "huge"),
            ("LIKENESS_FACE_SELECTION", "biggest"),
            ("LIKENESS_INTRA_THREADS", "-1"),
        ]);
        assert_eq!(config.max_side, 1024);
        assert_eq!(config.face_selection, FaceSelection::Literal);
        assert_eq!(config.intra_threads, 2);
    }

    #[test]
    fn test_builtin_styles_without_override() {
        let styles = config_from(&[]).load_styles().unwrap();
        assert_eq!(styles.default_name(), "Watercolor");
    }

    #[test]
    fn test_missing_styles_file_is_an_error() {
        let config = config_from(&[("LIKENESS_STYLES_FILE", "/nonexistent/styles.toml")]);
        assert!(config.load_styles().is_err());
    }
}
