//! Data models for visual matching
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Screenshot of the viewport in device pixels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Screenshot {
    /// Unique identifier for the screenshot
    pub id: String,

    /// Encoded image data (PNG or JPEG)
    pub data: Vec<u8>,

    pub format: ImageFormat,

    pub width: u32,
    pub height: u32,

    pub timestamp: SystemTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Other,
}

impl ImageFormat {
    pub fn from_image_format(format: image::ImageFormat) -> Self {
        match format {
            image::ImageFormat::Png => Self::Png,
            image::ImageFormat::Jpeg => Self::Jpeg,
            _ => Self::Other,
        }
    }
}

/// Best template position, in screenshot pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Zero-mean normalised cross correlation in [-1, 1]
    pub score: f64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl MatchResult {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Tuning for the vision fallback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionOptions {
    pub enabled: bool,

    /// Matches scoring below this are ignored
    pub min_score: f64,

    /// Longest side of the screenshot after downscaling
    pub max_dimension: u32,

    /// How long decoded templates stay cached
    pub template_ttl_secs: u64,
}

impl Default for VisionOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            min_score: 0.4,
            max_dimension: 480,
            template_ttl_secs: 300,
        }
    }
}
