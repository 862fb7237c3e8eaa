//! Trace context: the per-request identifier threaded through a run.
//!
//! A `TraceContext` is created once per external request or background job
//! and passed explicitly to every core operation. It is immutable; a nested
//! unit of work gets a `child()` context that links back to its parent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque trace identifier (`req_<16 hex>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceId(String);

impl TraceId {
    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(format!("req_{}", &hex[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TraceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TraceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation context for one request or job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceContext {
    id: TraceId,
    parent: Option<TraceId>,
    created_at: DateTime<Utc>,
}

impl TraceContext {
    /// Start a new root trace.
    pub fn new() -> Self {
        Self {
            id: TraceId::generate(),
            parent: None,
            created_at: Utc::now(),
        }
    }

    /// Root trace with a caller-supplied identifier (e.g. an inbound request id).
    pub fn with_id(id: impl Into<TraceId>) -> Self {
        Self {
            id: id.into(),
            parent: None,
            created_at: Utc::now(),
        }
    }

    /// A new trace linked to this one as its parent.
    pub fn child(&self) -> Self {
        Self {
            id: TraceId::generate(),
            parent: Some(self.id.clone()),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &TraceId {
        &self.id
    }

    pub fn parent(&self) -> Option<&TraceId> {
        self.parent.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_have_prefix_and_are_unique() {
        let a = TraceContext::new();
        let b = TraceContext::new();
        assert!(a.id().as_str().starts_with("req_"));
        assert_eq!(a.id().as_str().len(), 20);
        assert_ne!(a.id(), b.id());
        assert!(a.parent().is_none());
    }

    #[test]
    fn child_links_to_parent() {
        let root = TraceContext::with_id("req_external");
        let child = root.child();
        assert_eq!(child.parent(), Some(root.id()));
        assert_ne!(child.id(), root.id());
    }
}
