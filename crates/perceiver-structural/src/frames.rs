//! Enumerates the searchable documents of a page.

use std::fmt;
use std::sync::Arc;

use nexaura_core_types::FrameId;
use tracing::debug;

use crate::dom::DomTree;

/// Frames nested deeper than this are not searched.
pub const MAX_FRAME_DEPTH: usize = 2;

#[derive(Clone)]
pub struct FrameHandle {
    pub document: Arc<dyn DomTree>,
    pub frame_id: FrameId,
    pub href: Option<String>,
    pub depth: usize,
}

impl fmt::Debug for FrameHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameHandle")
            .field("frame_id", &self.frame_id)
            .field("href", &self.href)
            .field("depth", &self.depth)
            .finish()
    }
}

/// Root document first, then same-origin frame documents depth-first in
/// document order. Cross-origin frames are skipped.
pub fn scan_frames(root: Arc<dyn DomTree>) -> Vec<FrameHandle> {
    scan_frames_to_depth(root, MAX_FRAME_DEPTH)
}

pub fn scan_frames_to_depth(root: Arc<dyn DomTree>, max_depth: usize) -> Vec<FrameHandle> {
    let mut out = vec![FrameHandle {
        href: root.location(),
        document: Arc::clone(&root),
        frame_id: FrameId::top(),
        depth: 0,
    }];
    walk(&root, 1, max_depth, &mut out);
    out
}

fn walk(document: &Arc<dyn DomTree>, depth: usize, max_depth: usize, out: &mut Vec<FrameHandle>) {
    if depth > max_depth {
        return;
    }
    let frames = document.query(&|node| {
        matches!(
            document.tag_name(node).as_deref(),
            Some("iframe" | "frame")
        )
    });
    for (index, frame) in frames.into_iter().enumerate() {
        match document.content_document(frame) {
            Ok(Some(child)) => {
                out.push(FrameHandle {
                    href: child.location(),
                    document: Arc::clone(&child),
                    frame_id: FrameId::nested(depth, index),
                    depth,
                });
                walk(&child, depth + 1, max_depth, out);
            }
            Ok(None) => {}
            Err(err) => {
                debug!(
                    target: "perceiver-frames",
                    frame = %FrameId::nested(depth, index),
                    error = %err,
                    "skipping inaccessible frame"
                );
            }
        }
    }
}
