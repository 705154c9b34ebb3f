//! `ProcessEvent` — an in-flight notification (spec §3).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether an event may cross the enclosing process boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    /// Confined to the emitting process; never matches a parent's edges.
    Internal,
    /// Eligible to cross process boundaries (forwarded by the sub-process
    /// wrapper, or delivered to the external channel).
    Public,
}

/// An in-flight notification produced by a step, the process root, or an
/// external caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessEvent {
    /// The step name/id that produced this event, or `"external"`.
    pub source_id: String,
    /// Routing scope: `<stepName>_<runId>` for step-originated events, or
    /// the process id for root/external events.
    pub namespace: String,
    /// The source-declared local event symbol, e.g. `"OnResult"`.
    pub local_event_id: String,
    /// Arbitrary payload; absent for signal-only events.
    pub data: Option<serde_json::Value>,
    pub visibility: Visibility,
    /// Routes to the global-error target when no edge matches.
    pub is_error: bool,
    /// Opaque thread identifier, used for agent-step routing.
    pub thread_id: Option<String>,
    /// Observability aid threaded through tracing spans; not part of the
    /// routing key and not serialized onto the wire model in spec.md — an
    /// ambient addition (see SPEC_FULL.md "Correlation ids").
    #[serde(default = "Uuid::now_v7")]
    pub correlation_id: Uuid,
}

impl ProcessEvent {
    pub fn new(
        source_id: impl Into<String>,
        namespace: impl Into<String>,
        local_event_id: impl Into<String>,
        data: Option<serde_json::Value>,
        visibility: Visibility,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            namespace: namespace.into(),
            local_event_id: local_event_id.into(),
            data,
            visibility,
            is_error: false,
            thread_id: None,
            correlation_id: Uuid::now_v7(),
        }
    }

    pub fn error(
        source_id: impl Into<String>,
        namespace: impl Into<String>,
        local_event_id: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        let mut event = Self::new(source_id, namespace, local_event_id, data, Visibility::Public);
        event.is_error = true;
        event
    }

    /// The sole routing key: `<namespace>.<localEventId>`.
    pub fn qualified_id(&self) -> String {
        format!("{}.{}", self.namespace, self.local_event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_id_format() {
        let event = ProcessEvent::new("Echo", "Echo_run1", "OnResult", None, Visibility::Public);
        assert_eq!(event.qualified_id(), "Echo_run1.OnResult");
    }

    #[test]
    fn test_error_constructor_sets_flags() {
        let event = ProcessEvent::error("F", "F_run1", "OnError", None);
        assert!(event.is_error);
        assert_eq!(event.visibility, Visibility::Public);
    }
}
