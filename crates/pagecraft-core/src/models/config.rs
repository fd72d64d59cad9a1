//! Configuration structures for pagecraft.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PagecraftError, Result};
use crate::plan::SplitKind;
use crate::range::{DEFAULT_END_KEYWORDS, RangeParser};
use crate::render::{ImageFormat, RenderOptions};

/// Main configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagecraftConfig {
    /// Split defaults.
    pub split: SplitConfig,

    /// Thumbnail and page image rendering.
    pub render: RenderConfig,

    /// Output file naming.
    pub output: OutputConfig,
}

/// Split configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Prefix used when the input has no usable file stem.
    pub default_prefix: String,

    /// Words that stand for the last page in a range ("3-end").
    pub end_keywords: Vec<String>,

    /// Mode a new split session starts in.
    pub default_mode: SplitKind,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            default_prefix: "split".to_string(),
            end_keywords: DEFAULT_END_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            default_mode: SplitKind::Ranges,
        }
    }
}

/// Render configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Thumbnail width in pixels.
    pub thumbnail_width: u32,

    pub thumbnail_format: ImageFormat,

    /// Thumbnail encoder quality (1-100).
    pub thumbnail_quality: u8,

    /// Width of pages exported as images.
    pub image_width: u32,

    pub image_format: ImageFormat,

    /// Exported image quality (1-100).
    pub image_quality: u8,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            thumbnail_width: 150,
            thumbnail_format: ImageFormat::Jpeg,
            thumbnail_quality: 80,
            image_width: 1200,
            image_format: ImageFormat::Png,
            image_quality: 90,
        }
    }
}

impl RenderConfig {
    pub fn thumbnail_options(&self) -> RenderOptions {
        RenderOptions::new(
            self.thumbnail_width,
            self.thumbnail_format,
            self.thumbnail_quality,
        )
    }

    pub fn image_options(&self) -> RenderOptions {
        RenderOptions::new(self.image_width, self.image_format, self.image_quality)
    }
}

/// Output naming configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// File name of a merge result.
    pub merged_name: String,

    /// Appended to the input stem when saving an organized document.
    pub organized_suffix: String,

    /// File name of an images-to-PDF result.
    pub converted_name: String,

    /// Appended to the input stem for the page image archive.
    pub images_archive_suffix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            merged_name: "merged.pdf".to_string(),
            organized_suffix: "_organized".to_string(),
            converted_name: "converted.pdf".to_string(),
            images_archive_suffix: "_images.zip".to_string(),
        }
    }
}

impl OutputConfig {
    pub fn organized_name(&self, stem: &str) -> String {
        format!("{}{}.pdf", stem, self.organized_suffix)
    }

    pub fn images_archive_name(&self, stem: &str) -> String {
        format!("{}{}", stem, self.images_archive_suffix)
    }
}

impl PagecraftConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| PagecraftError::Config(e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| PagecraftError::Config(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Range parser honoring the configured end keywords.
    pub fn range_parser(&self) -> RangeParser {
        RangeParser::new().with_end_keywords(self.split.end_keywords.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = PagecraftConfig::default();
        assert_eq!(config.split.default_prefix, "split");
        assert_eq!(config.split.end_keywords, vec!["end", "son"]);
        assert_eq!(config.render.thumbnail_width, 150);
        assert_eq!(config.output.organized_name("report"), "report_organized.pdf");
        assert_eq!(config.output.images_archive_name("report"), "report_images.zip");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{ "render": { "image_format": "webp" }, "split": { "default_mode": "burst" } }"#;
        let config: PagecraftConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.render.image_format, ImageFormat::Webp);
        assert_eq!(config.render.image_width, 1200);
        assert_eq!(config.split.default_mode, SplitKind::Burst);
        assert_eq!(config.output, OutputConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf/pagecraft.json");

        let mut config = PagecraftConfig::default();
        config.split.end_keywords = vec!["last".to_string()];
        config.save(&path).unwrap();

        let loaded = PagecraftConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.range_parser().parse("2-last", 4).to_string(), "2-4");
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = PagecraftConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, PagecraftError::Config(_)));
    }
}
