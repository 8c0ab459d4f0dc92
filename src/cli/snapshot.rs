//! Loading snapshots, targets and guides from disk, plus the flags shared by
//! several commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use action_locator::PageSession;
use anyhow::{bail, Context, Result};
use clap::Args;
use perceiver_structural::{DomTree, MemoryDom, NodeId};
use perceiver_visual::{
    FileScreenshotSource, FsTemplateStore, InlineTemplateStore, TemplateStore, VisionFallback,
    VisionOptions,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tracing::debug;

/// Element to operate on: a CSS selector (first match) or a raw node id.
#[derive(Args, Clone, Debug)]
pub struct NodeArgs {
    /// CSS selector; the first match is used
    #[arg(long, conflicts_with = "node")]
    pub selector: Option<String>,

    /// Node id as reported by `score`
    #[arg(long)]
    pub node: Option<usize>,
}

impl NodeArgs {
    pub fn select(&self, tree: &dyn DomTree) -> Result<NodeId> {
        if let Some(id) = self.node {
            let node = NodeId(id);
            if !tree.is_element(node) {
                bail!("node {} is not an element", id);
            }
            return Ok(node);
        }
        let Some(selector) = self.selector.as_deref() else {
            bail!("pass --selector or --node");
        };
        let matches = tree
            .query_selector_all(selector)
            .with_context(|| format!("evaluating selector '{}'", selector))?;
        match matches.first() {
            Some(node) => Ok(*node),
            None => bail!("selector '{}' matched nothing", selector),
        }
    }
}

/// Optional vision tier inputs.
#[derive(Args, Clone, Debug, Default)]
pub struct VisionArgs {
    /// Screenshot of the page (PNG/JPEG) enabling the vision fallback
    #[arg(long, value_name = "FILE")]
    pub screenshot: Option<PathBuf>,

    /// Directory holding recorded template images
    #[arg(long, value_name = "DIR")]
    pub templates: Option<PathBuf>,
}

impl VisionArgs {
    pub fn build(&self, options: &VisionOptions) -> Option<Arc<VisionFallback>> {
        if !options.enabled {
            return None;
        }
        let screenshot = self.screenshot.as_ref()?;
        let templates: Arc<dyn TemplateStore> = match &self.templates {
            Some(dir) => Arc::new(FsTemplateStore::new(dir.clone())),
            None => Arc::new(InlineTemplateStore),
        };
        debug!(screenshot = %screenshot.display(), "vision fallback enabled");
        Some(Arc::new(VisionFallback::new(
            templates,
            Arc::new(FileScreenshotSource::new(screenshot.clone())),
            options.clone(),
        )))
    }
}

pub async fn load_dom(path: &Path) -> Result<Arc<MemoryDom>> {
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let dom = MemoryDom::from_json(&raw).with_context(|| format!("parsing snapshot {}", path.display()))?;
    debug!(path = %path.display(), elements = dom.len(), "snapshot loaded");
    Ok(Arc::new(dom))
}

pub fn page_session(dom: &Arc<MemoryDom>) -> PageSession {
    PageSession::new(Arc::clone(dom) as Arc<dyn DomTree>)
}

pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let serialized = serde_json::to_string_pretty(value)?;
    fs::write(path, serialized)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
