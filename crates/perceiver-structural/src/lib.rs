pub mod dom;
pub mod errors;
pub mod frames;
pub mod judges;
pub mod memory;
pub mod selector;
pub mod stability;
pub mod xpath;

pub use dom::{ComputedStyle, DomTree, NodeId};
pub use errors::PerceiverError;
pub use frames::{scan_frames, scan_frames_to_depth, FrameHandle, MAX_FRAME_DEPTH};
pub use judges::{clickable, is_text_input, is_visible, visible, JudgePolicy, JudgeReport};
pub use memory::{ChildSpec, DocumentSnapshot, FrameSpec, MemoryDom, NodeSpec, StyleSpec};
pub use stability::{
    wait_for_dom_stable, MutationFeed, MutationHub, MutationKind, MutationRecord, QuietFeed,
    StabilityOptions, StabilityVerdict, UnstableReason,
};
