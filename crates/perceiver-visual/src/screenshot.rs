//! Screenshot sources for the vision fallback
use crate::{errors::VisualError, models::*};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::SystemTime;
use uuid::Uuid;

/// Anything able to produce a viewport screenshot on demand
#[async_trait]
pub trait ScreenshotSource: Send + Sync {
    async fn capture(&self) -> Result<Screenshot, VisualError>;
}

impl Screenshot {
    /// Wraps encoded bytes, probing format and dimensions.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, VisualError> {
        let (format, width, height) = sniff_header(&data)?;
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            data,
            format,
            width,
            height,
            timestamp: SystemTime::now(),
        })
    }
}

fn sniff_header(data: &[u8]) -> Result<(ImageFormat, u32, u32), VisualError> {
    use image::io::Reader as ImageReader;
    use std::io::Cursor;

    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| VisualError::ImageProcessing(format!("Format detection failed: {}", e)))?;
    let format = reader
        .format()
        .map(ImageFormat::from_image_format)
        .unwrap_or(ImageFormat::Other);
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| VisualError::ImageProcessing(format!("Image decode failed: {}", e)))?;
    Ok((format, width, height))
}

/// Reads a screenshot from disk on every capture.
pub struct FileScreenshotSource {
    path: PathBuf,
}

impl FileScreenshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ScreenshotSource for FileScreenshotSource {
    async fn capture(&self) -> Result<Screenshot, VisualError> {
        tracing::debug!(target: "perceiver-visual", path = %self.path.display(), "reading screenshot");
        let data = tokio::fs::read(&self.path)
            .await
            .map_err(|e| VisualError::CaptureFailed(format!("{}: {}", self.path.display(), e)))?;
        Screenshot::from_bytes(data)
    }
}

/// Serves the same in-memory screenshot; used for snapshots and tests.
pub struct StaticScreenshot {
    screenshot: Screenshot,
}

impl StaticScreenshot {
    pub fn new(screenshot: Screenshot) -> Self {
        Self { screenshot }
    }
}

#[async_trait]
impl ScreenshotSource for StaticScreenshot {
    async fn capture(&self) -> Result<Screenshot, VisualError> {
        Ok(self.screenshot.clone())
    }
}

/// Source that always fails, for pages where capture is unavailable.
pub struct NoScreenshots;

#[async_trait]
impl ScreenshotSource for NoScreenshots {
    async fn capture(&self) -> Result<Screenshot, VisualError> {
        Err(VisualError::CaptureFailed("no screenshot source configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = GrayImage::from_pixel(width, height, Luma([128]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageOutputFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn from_bytes_reads_dimensions() {
        let shot = Screenshot::from_bytes(png(32, 16)).unwrap();
        assert_eq!((shot.width, shot.height), (32, 16));
        assert_eq!(shot.format, ImageFormat::Png);
    }

    #[test]
    fn every_capture_gets_its_own_id() {
        let first = Screenshot::from_bytes(png(4, 4)).unwrap();
        let second = Screenshot::from_bytes(png(4, 4)).unwrap();
        assert!(uuid::Uuid::parse_str(&first.id).is_ok());
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(Screenshot::from_bytes(vec![0, 1, 2, 3]).is_err());
    }

    #[test]
    fn missing_source_reports_capture_failure() {
        let err = tokio_test::block_on(NoScreenshots.capture()).unwrap_err();
        assert!(matches!(err, VisualError::CaptureFailed(_)));
    }
}
