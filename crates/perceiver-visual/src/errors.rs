//! Error types for the vision fallback
use std::fmt;

#[derive(Debug)]
pub enum VisualError {
    /// Screenshot capture failed
    CaptureFailed(String),

    /// Image decoding or processing failed
    ImageProcessing(String),

    /// Template reference could not be resolved to image bytes
    TemplateUnavailable(String),

    /// Invalid input parameters
    InvalidInput(String),

    /// IO error
    Io(std::io::Error),
}

impl fmt::Display for VisualError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CaptureFailed(msg) => write!(f, "Screenshot capture failed: {}", msg),
            Self::ImageProcessing(msg) => write!(f, "Image processing error: {}", msg),
            Self::TemplateUnavailable(msg) => write!(f, "Template unavailable: {}", msg),
            Self::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for VisualError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for VisualError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<image::ImageError> for VisualError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageProcessing(err.to_string())
    }
}

impl From<base64::DecodeError> for VisualError {
    fn from(err: base64::DecodeError) -> Self {
        Self::TemplateUnavailable(format!("invalid base64 payload: {}", err))
    }
}
