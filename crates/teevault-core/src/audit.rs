//! Audit-sink contract.
//!
//! The core reports every state transition to a caller-supplied sink
//! but never depends on what the sink does with the record: `append` is
//! one-way and infallible from the core's point of view. Writing the
//! log lives with an external collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::EntryType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Init,
    Unlock,
    Lock,
    AddEntry,
    RetrieveEntry,
    DeleteEntry,
    RotateEntry,
    RotateMaster,
}

/// One audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_type: Option<EntryType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, success: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            entry_label: None,
            entry_type: None,
            tool: None,
            success,
            error: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.entry_label = Some(label.into());
        self
    }

    pub fn with_entry_type(mut self, entry_type: EntryType) -> Self {
        self.entry_type = Some(entry_type);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Append-only destination for audit records.
pub trait AuditSink: Send + Sync {
    fn append(&self, event: AuditEvent);
}

/// Discards every record.
pub struct NullSink;

impl AuditSink for NullSink {
    fn append(&self, _event: AuditEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_wire_shape() {
        let event = AuditEvent::new(AuditAction::AddEntry, true)
            .with_label("k1")
            .with_entry_type(EntryType::Secret);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["action"], "add_entry");
        assert_eq!(json["entryLabel"], "k1");
        assert_eq!(json["entryType"], "secret");
        assert_eq!(json["success"], true);
        assert!(json.get("error").is_none());
        assert!(json.get("tool").is_none());
    }
}
