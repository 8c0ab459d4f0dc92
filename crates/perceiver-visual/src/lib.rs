//! Vision fallback for the Nexaura locator engine
//!
//! This crate provides:
//! - Template lookup from data URLs or a template directory
//! - Screenshot sources
//! - Zero-mean normalised cross correlation template matching
//! - The vision fallback that maps a match back onto a DOM element

pub mod cache;
pub mod errors;
pub mod fallback;
pub mod matcher;
pub mod models;
pub mod screenshot;
pub mod template;

pub use cache::TemplateCache;
pub use errors::VisualError;
pub use fallback::VisionFallback;
pub use matcher::{decode_gray, match_template};
pub use models::*;
pub use screenshot::{FileScreenshotSource, NoScreenshots, ScreenshotSource, StaticScreenshot};
pub use template::{
    decode_data_url, encode_data_url, FsTemplateStore, InlineTemplateStore, TemplateStore,
};
