//! Append-only diagnostic trace attached to every resolution result.
//!
//! The trace is advisory: nothing in the engine branches on its contents.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugEntry {
    #[serde(rename = "type")]
    pub level: DebugLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DebugTrace {
    entries: Vec<DebugEntry>,
}

impl DebugTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, level: DebugLevel, message: impl Into<String>, data: Option<Value>) {
        self.entries.push(DebugEntry {
            level,
            message: message.into(),
            data,
        });
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(DebugLevel::Info, message, None);
    }

    pub fn info_with(&mut self, message: impl Into<String>, data: Value) {
        self.push(DebugLevel::Info, message, Some(data));
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(DebugLevel::Warn, message, None);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(DebugLevel::Error, message, None);
    }

    pub fn extend(&mut self, other: DebugTrace) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[DebugEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, level: DebugLevel) -> usize {
        self.entries.iter().filter(|e| e.level == level).count()
    }

    pub fn contains_message(&self, needle: &str) -> bool {
        self.entries.iter().any(|e| e.message.contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trace_serialises_as_plain_list() {
        let mut trace = DebugTrace::new();
        trace.warn("ancestor search failed");
        trace.info_with("vision score too low", json!({ "score": 0.2 }));
        let value = serde_json::to_value(&trace).unwrap();
        assert_eq!(
            value,
            json!([
                { "type": "warn", "message": "ancestor search failed" },
                { "type": "info", "message": "vision score too low", "data": { "score": 0.2 } }
            ])
        );
        assert_eq!(trace.count(DebugLevel::Warn), 1);
        assert!(trace.contains_message("vision"));
    }
}
