//! Target capture and resolution for recorded web steps.
//!
//! This crate provides:
//! - Target capture: locators, fingerprint, structural context and anchors
//! - Locator strategies per kind (id, css, role, text, xpath)
//! - Fallback tiers: structural trail, fingerprint text, relation anchor
//! - Multi-signal candidate scoring against the recorded fingerprint
//! - A retrying, deadline-bounded orchestrator gated on DOM quiescence
//! - Escalation to the vision fallback and a budgeted repair hand-off

pub mod bridge;
pub mod capture;
pub mod errors;
pub mod healer;
pub mod resolver;
pub mod scorer;
pub mod strategies;
pub mod types;

pub use bridge::*;
pub use capture::{capture_target, container_heading, is_stable_id, CaptureOptions};
pub use errors::*;
pub use healer::*;
pub use resolver::*;
pub use scorer::*;
pub use strategies::*;
pub use types::*;
