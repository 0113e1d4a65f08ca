//! Configuration for embed runs

use crate::error::{EmbedError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// How the cell patcher finds the target row and cell
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CellAddressing {
    /// N-th `<row>` in `<sheetData>`, N-th `<c>` in that row. Requires a dense sheet.
    #[default]
    Positional,
    /// `<row r="N+1">` and the `<c>` whose `r` names the column
    ByReference,
}

/// Main embed configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    pub addressing: CellAddressing,
    /// Parent of the per-run working directory; the input file's directory when unset
    pub work_dir: Option<PathBuf>,
    /// Leave the working directory on disk for inspection
    pub keep_work_dir: bool,
    /// Extensions declared in `[Content_Types].xml` on every run
    pub extensions: Vec<String>,
    /// Extra or overriding extension -> content type mappings
    pub content_types: BTreeMap<String, String>,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            addressing: CellAddressing::Positional,
            work_dir: None,
            keep_work_dir: false,
            extensions: vec!["jpeg".to_string(), "JPG".to_string()],
            content_types: BTreeMap::new(),
        }
    }
}

impl EmbedConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| EmbedError::io(path, e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: EmbedConfig =
            toml::from_str(content).map_err(|e| EmbedError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for ext in self.extensions.iter().chain(self.content_types.keys()) {
            if ext.is_empty() || ext.contains(['.', '/']) {
                return Err(EmbedError::Config(format!(
                    "'{}' is not a file extension (no dot, no slash)",
                    ext
                )));
            }
        }
        for (ext, content_type) in &self.content_types {
            if !content_type.contains('/') {
                return Err(EmbedError::Config(format!(
                    "content type '{}' for extension '{}' is not a MIME type",
                    content_type, ext
                )));
            }
        }
        Ok(())
    }

    /// Content type declared for `extension`
    pub fn content_type_for(&self, extension: &str) -> String {
        if let Some(content_type) = self.content_types.get(extension) {
            return content_type.clone();
        }
        let lower = extension.to_ascii_lowercase();
        let known = match lower.as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" | "jpe" => "image/jpeg",
            "gif" => "image/gif",
            "bmp" => "image/bmp",
            "tif" | "tiff" => "image/tiff",
            "webp" => "image/webp",
            "emf" => "image/x-emf",
            "wmf" => "image/x-wmf",
            _ => return format!("image/{lower}"),
        };
        known.to_string()
    }
}
