use std::path::PathBuf;

use serde::Serialize;

use crate::catalog::Catalog;
use crate::domain::MAX_COVER_FACES;
use crate::error::{Error, Result};
use crate::imaging::watermark::load_font;
use crate::selection::DEFAULT_DIVERSITY_THRESHOLD;

/// Tunables persisted in the catalog's `config` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub preview_width: u32,
    pub preview_quality: u8,
    pub publish_width: u32,
    pub publish_quality: u8,
    pub watermark_text: String,
    pub watermark_opacity: f32,
    pub watermark_font: Option<PathBuf>,
    pub max_covers: usize,
    pub diversity_threshold: f32,
    pub yield_every: usize,
    pub clustering_command: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            preview_width: 400,
            preview_quality: 80,
            publish_width: 800,
            publish_quality: 70,
            watermark_text: "PREVIEW - SAMPLE".to_string(),
            watermark_opacity: 0.5,
            watermark_font: None,
            max_covers: MAX_COVER_FACES,
            diversity_threshold: DEFAULT_DIVERSITY_THRESHOLD,
            yield_every: 100,
            clustering_command: None,
        }
    }
}

/// Every recognised key, in display order.
pub const SETTING_KEYS: &[&str] = &[
    "preview_width",
    "preview_quality",
    "publish_width",
    "publish_quality",
    "watermark_text",
    "watermark_opacity",
    "watermark_font",
    "max_covers",
    "diversity_threshold",
    "yield_every",
    "clustering_command",
];

fn invalid(key: &str, message: impl Into<String>) -> Error {
    Error::InvalidSetting {
        key: key.to_string(),
        message: message.into(),
    }
}

fn parse_in_range<T>(key: &str, value: &str, min: T, max: T) -> Result<T>
where
    T: std::str::FromStr + PartialOrd + std::fmt::Display + Copy,
{
    let parsed: T = value
        .trim()
        .parse()
        .map_err(|_| invalid(key, format!("expected a number, got {value:?}")))?;
    if !(parsed >= min && parsed <= max) {
        return Err(invalid(key, format!("must be between {min} and {max}")));
    }
    Ok(parsed)
}

fn optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl Settings {
    /// Load settings, falling back to defaults for unset keys.
    /// A stored value that no longer parses is reported rather than ignored.
    pub fn load(catalog: &Catalog) -> Result<Self> {
        let mut settings = Self::default();
        for key in SETTING_KEYS {
            if let Some(value) = catalog.get_config(key)? {
                settings.apply(key, &value)?;
            }
        }
        Ok(settings)
    }

    /// Validate and persist a single setting. An empty value clears optional keys.
    pub fn set(catalog: &Catalog, key: &str, value: &str) -> Result<Self> {
        let mut settings = Self::load(catalog)?;
        settings.apply(key, value)?;
        if let ("watermark_font", Some(path)) = (key, &settings.watermark_font) {
            load_font(path)?;
        }
        match (key, optional(value)) {
            ("watermark_font" | "clustering_command", None) => {
                catalog.remove_config(key)?;
            }
            _ => catalog.set_config(key, value.trim())?,
        }
        Ok(settings)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "preview_width" => self.preview_width = parse_in_range(key, value, 16, 10_000)?,
            "preview_quality" => self.preview_quality = parse_in_range(key, value, 1, 100)?,
            "publish_width" => self.publish_width = parse_in_range(key, value, 16, 10_000)?,
            "publish_quality" => self.publish_quality = parse_in_range(key, value, 1, 100)?,
            "watermark_text" => {
                if value.trim().is_empty() {
                    return Err(invalid(key, "must not be empty"));
                }
                self.watermark_text = value.trim().to_string();
            }
            "watermark_opacity" => self.watermark_opacity = parse_in_range(key, value, 0.0, 1.0)?,
            "watermark_font" => self.watermark_font = optional(value).map(PathBuf::from),
            "max_covers" => self.max_covers = parse_in_range(key, value, 1, MAX_COVER_FACES)?,
            "diversity_threshold" => {
                self.diversity_threshold = parse_in_range(key, value, 0.0, f32::MAX)?
            }
            "yield_every" => self.yield_every = parse_in_range(key, value, 1, usize::MAX)?,
            "clustering_command" => self.clustering_command = optional(value),
            other => return Err(Error::UnknownSetting(other.to_string())),
        }
        Ok(())
    }

    /// `(key, display value)` pairs for listing.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        let unset = || "(unset)".to_string();
        vec![
            ("preview_width", self.preview_width.to_string()),
            ("preview_quality", self.preview_quality.to_string()),
            ("publish_width", self.publish_width.to_string()),
            ("publish_quality", self.publish_quality.to_string()),
            ("watermark_text", self.watermark_text.clone()),
            ("watermark_opacity", self.watermark_opacity.to_string()),
            (
                "watermark_font",
                self.watermark_font
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(unset),
            ),
            ("max_covers", self.max_covers.to_string()),
            ("diversity_threshold", self.diversity_threshold.to_string()),
            ("yield_every", self.yield_every.to_string()),
            (
                "clustering_command",
                self.clustering_command.clone().unwrap_or_else(unset),
            ),
        ]
    }
}
