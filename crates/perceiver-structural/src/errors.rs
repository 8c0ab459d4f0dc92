use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PerceiverError {
    #[error("invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },
    #[error("invalid xpath '{0}'")]
    InvalidXPath(String),
    #[error("cross-origin frame is not accessible: {0}")]
    CrossOriginFrame(String),
    #[error("snapshot rejected: {0}")]
    Snapshot(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl PerceiverError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub(crate) fn selector(selector: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_cross_origin(&self) -> bool {
        matches!(self, Self::CrossOriginFrame(_))
    }
}
