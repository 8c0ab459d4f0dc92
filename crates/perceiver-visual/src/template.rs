//! Template lookup: inline data URLs or image files under a root directory.
use crate::errors::VisualError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::path::{Component, Path, PathBuf};

#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Encoded image bytes for a recorded `templateId`.
    async fn load(&self, template_id: &str) -> Result<Vec<u8>, VisualError>;
}

/// Resolves data URLs inline and everything else as a path relative to
/// `root`. Paths escaping the root are refused.
pub struct FsTemplateStore {
    root: PathBuf,
}

impl FsTemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve_path(&self, template_id: &str) -> Result<PathBuf, VisualError> {
        let relative = Path::new(template_id);
        let escapes = relative.components().any(|component| {
            matches!(
                component,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(VisualError::InvalidInput(format!(
                "template path '{}' leaves the template root",
                template_id
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl TemplateStore for FsTemplateStore {
    async fn load(&self, template_id: &str) -> Result<Vec<u8>, VisualError> {
        if template_id.starts_with("data:") {
            return decode_data_url(template_id);
        }
        let path = self.resolve_path(template_id)?;
        tokio::fs::read(&path).await.map_err(|err| {
            VisualError::TemplateUnavailable(format!("{}: {}", path.display(), err))
        })
    }
}

/// Only accepts data URLs; used when no template directory is configured.
pub struct InlineTemplateStore;

#[async_trait]
impl TemplateStore for InlineTemplateStore {
    async fn load(&self, template_id: &str) -> Result<Vec<u8>, VisualError> {
        decode_data_url(template_id)
    }
}

/// Decodes `data:<mime>;base64,<payload>`.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>, VisualError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| VisualError::TemplateUnavailable("not a data url".to_string()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| VisualError::TemplateUnavailable("data url without payload".to_string()))?;
    if !meta.ends_with(";base64") {
        return Err(VisualError::TemplateUnavailable(
            "only base64 data urls are supported".to_string(),
        ));
    }
    Ok(STANDARD.decode(payload.trim())?)
}

pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}
