//! Prompt templating by named style.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

const BUILTIN_STYLES: &str = include_str!("../styles.toml");
const PROMPT_PLACEHOLDER: &str = "{prompt}";

#[derive(Error, Debug)]
pub enum StyleError {
    #[error("failed to read style table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid style table: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("style table is empty")]
    Empty,
    #[error("duplicate style name: {0}")]
    Duplicate(String),
    #[error("default style '{0}' is not defined in the table")]
    MissingDefault(String),
}

/// One named template pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleEntry {
    pub name: String,
    /// Positive template containing a `{prompt}` placeholder.
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
}

#[derive(Deserialize)]
struct StyleTable {
    default: String,
    #[serde(default, rename = "style")]
    styles: Vec<StyleEntry>,
}

/// Immutable style lookup, in table order.
#[derive(Debug, Clone)]
pub struct StyleBook {
    styles: Vec<StyleEntry>,
    default_index: usize,
}

impl StyleBook {
    /// The table shipped with the crate (default style "Watercolor").
    ///
    /// # Panics
    ///
    /// Only if the embedded `styles.toml` is invalid, which
    /// `test_builtin_table` rules out.
    pub fn builtin() -> Self {
        Self::from_toml_str(BUILTIN_STYLES).expect("built-in style table is valid")
    }

    /// Load a style table from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StyleError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| StyleError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let book = Self::from_toml_str(&text)?;
        tracing::info!(
            path = %path.display(),
            styles = book.styles.len(),
            default = book.default_name(),
            "loaded style table"
        );
        Ok(book)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, StyleError> {
        let table: StyleTable = toml::from_str(text)?;
        Self::new(table.styles, &table.default)
    }

    pub fn new(styles: Vec<StyleEntry>, default_name: &str) -> Result<Self, StyleError> {
        if styles.is_empty() {
            return Err(StyleError::Empty);
        }
        for (i, entry) in styles.iter().enumerate() {
            if styles[..i].iter().any(|prev| prev.name == entry.name) {
                return Err(StyleError::Duplicate(entry.name.clone()));
            }
        }
        let default_index = styles
            .iter()
            .position(|s| s.name == default_name)
            .ok_or_else(|| StyleError::MissingDefault(default_name.to_string()))?;

        Ok(Self { styles, default_index })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.styles.iter().map(|s| s.name.as_str())
    }

    pub fn default_name(&self) -> &str {
        &self.styles[self.default_index].name
    }

    pub fn get(&self, name: &str) -> Option<&StyleEntry> {
        self.styles.iter().find(|s| s.name == name)
    }

    /// Look up `name`, falling back to the default style.
    pub fn resolve(&self, name: &str) -> &StyleEntry {
        self.get(name).unwrap_or_else(|| {
            tracing::debug!(requested = name, fallback = self.default_name(), "unknown style");
            &self.styles[self.default_index]
        })
    }

    /// Produce `(prompt, negative_prompt)` for the given style and user text.
    ///
    /// The positive text replaces `{prompt}` in the template; the user's
    /// negative text is appended to the template's negative after a space.
    /// User text is inserted as-is.
    pub fn apply_style(&self, name: &str, positive: &str, negative: &str) -> (String, String) {
        let entry = self.resolve(name);
        let prompt = entry.prompt.replace(PROMPT_PLACEHOLDER, positive);
        let negative_prompt = format!("{} {}", entry.negative_prompt, negative);
        (prompt, negative_prompt)
    }
}

impl Default for StyleBook {
    fn default() -> Self {
        Self::builtin()
    }
}
