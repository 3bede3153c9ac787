//! Configuration for photometa

use crate::PhotometaError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration as TOML
pub const DEFAULT_CONFIG: &str = r#"# Photometa Configuration

[listing]
# Default number of images per page
page_size = 25

[files]
# Recognized image extensions (lower case, without dot)
extensions = ["jpg", "jpeg", "png", "tif", "tiff", "heic", "heif"]

[artifacts]
# Longest edge of generated thumbnails, in pixels
thumbnail_edge = 250
# Default longest edge of generated previews
preview_max_edge = 2048
# Preview edge cap applied to very large or HEIC/TIFF sources
capped_preview_edge = 2000
# Source files above this size (bytes) get the capped preview edge
large_file_threshold = 26214400
# JPEG quality for thumbnails / previews
thumbnail_quality = 85
preview_quality = 90
"#;

/// Photometa configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default = "default_thumbnail_edge")]
    pub thumbnail_edge: u32,
    #[serde(default = "default_preview_max_edge")]
    pub preview_max_edge: u32,
    #[serde(default = "default_capped_preview_edge")]
    pub capped_preview_edge: u32,
    #[serde(default = "default_large_file_threshold")]
    pub large_file_threshold: u64,
    #[serde(default = "default_thumbnail_quality")]
    pub thumbnail_quality: u8,
    #[serde(default = "default_preview_quality")]
    pub preview_quality: u8,
}

// Default value functions
fn default_page_size() -> usize {
    25
}
fn default_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "tif", "tiff", "heic", "heif"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_thumbnail_edge() -> u32 {
    250
}
fn default_preview_max_edge() -> u32 {
    2048
}
fn default_capped_preview_edge() -> u32 {
    2000
}
fn default_large_file_threshold() -> u64 {
    25 * 1024 * 1024
}
fn default_thumbnail_quality() -> u8 {
    85
}
fn default_preview_quality() -> u8 {
    90
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
        }
    }
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            thumbnail_edge: default_thumbnail_edge(),
            preview_max_edge: default_preview_max_edge(),
            capped_preview_edge: default_capped_preview_edge(),
            large_file_threshold: default_large_file_threshold(),
            thumbnail_quality: default_thumbnail_quality(),
            preview_quality: default_preview_quality(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse config from TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| PhotometaError::ConfigParse(e.to_string()))
    }

    /// Whether a path carries a recognized image extension.
    pub fn is_image_path(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let ext = ext.to_ascii_lowercase();
        self.files.extensions.iter().any(|e| *e == ext)
    }
}
