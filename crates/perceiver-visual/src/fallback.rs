//! Last-resort locator: find the recorded template on a fresh screenshot
//! and hit-test the match centre.
use crate::cache::TemplateCache;
use crate::errors::VisualError;
use crate::matcher::{decode_gray, match_template};
use crate::models::VisionOptions;
use crate::screenshot::ScreenshotSource;
use crate::template::TemplateStore;
use image::GrayImage;
use nexaura_core_types::{DebugLevel, DebugTrace, Target};
use perceiver_structural::{DomTree, NodeId};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

pub struct VisionFallback {
    templates: Arc<dyn TemplateStore>,
    screenshots: Arc<dyn ScreenshotSource>,
    cache: TemplateCache,
    options: VisionOptions,
}

impl VisionFallback {
    pub fn new(
        templates: Arc<dyn TemplateStore>,
        screenshots: Arc<dyn ScreenshotSource>,
        options: VisionOptions,
    ) -> Self {
        Self {
            cache: TemplateCache::new(options.template_ttl_secs),
            templates,
            screenshots,
            options,
        }
    }

    pub fn options(&self) -> &VisionOptions {
        &self.options
    }

    /// Never fails: every problem becomes a debug entry and `None`.
    pub async fn locate(
        &self,
        target: &Target,
        tree: &dyn DomTree,
        trace: &mut DebugTrace,
    ) -> Option<NodeId> {
        if !self.options.enabled {
            return None;
        }
        let template_id = target.vision.template_id.as_deref()?;
        match self.try_locate(template_id, tree, trace).await {
            Ok(found) => found,
            Err(err) => {
                debug!(target: "perceiver-visual", error = %err, "vision fallback failed");
                trace.error(format!("vision error: {}", err));
                None
            }
        }
    }

    async fn try_locate(
        &self,
        template_id: &str,
        tree: &dyn DomTree,
        trace: &mut DebugTrace,
    ) -> Result<Option<NodeId>, VisualError> {
        let template = self.template(template_id).await?;
        let screenshot = self.screenshots.capture().await?;
        let max_dimension = self.options.max_dimension;
        // decoding and the correlation scan are CPU bound
        let found = tokio::task::spawn_blocking(move || {
            let screen = decode_gray(&screenshot.data)?;
            Ok::<_, VisualError>(match_template(&screen, &template, max_dimension))
        })
        .await
        .map_err(|e| VisualError::ImageProcessing(format!("Task join error: {}", e)))??;
        let found = match found {
            Some(found) => found,
            None => {
                trace.info("vision template does not fit the screenshot");
                return Ok(None);
            }
        };

        if found.score < self.options.min_score {
            trace.push(
                DebugLevel::Info,
                "vision score too low",
                Some(json!({ "score": found.score })),
            );
            return Ok(None);
        }

        let dpr = tree.device_pixel_ratio();
        let dpr = if dpr > 0.0 { dpr } else { 1.0 };
        let (cx, cy) = found.center();
        let node = tree.element_from_point(cx / dpr, cy / dpr);
        match node {
            Some(node) => {
                info!(
                    target: "perceiver-visual",
                    score = found.score,
                    x = cx / dpr,
                    y = cy / dpr,
                    "vision matched"
                );
                trace.push(
                    DebugLevel::Info,
                    "vision matched",
                    Some(json!({ "score": found.score, "x": cx / dpr, "y": cy / dpr })),
                );
                Ok(Some(node))
            }
            None => {
                trace.info_with(
                    "vision match has no element under it",
                    json!({ "score": found.score }),
                );
                Ok(None)
            }
        }
    }

    async fn template(&self, template_id: &str) -> Result<Arc<GrayImage>, VisualError> {
        if let Some(cached) = self.cache.get(template_id) {
            return Ok(cached);
        }
        let bytes = self.templates.load(template_id).await?;
        let image = tokio::task::spawn_blocking(move || decode_gray(&bytes))
            .await
            .map_err(|e| VisualError::ImageProcessing(format!("Task join error: {}", e)))??;
        let image = Arc::new(image);
        self.cache.put(template_id.to_string(), Arc::clone(&image), None);
        Ok(image)
    }
}
