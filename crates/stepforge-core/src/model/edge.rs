//! `Edge` and its output-target variants (spec §3).

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::model::message::END_STEP_ID;

/// A condition gating whether a non-default edge participates in routing.
/// Default conditions only fire when no non-default edge on the same
/// qualified event id matched (spec §4.1).
#[derive(Clone)]
pub struct EdgeCondition {
    predicate: Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>,
    pub is_default: bool,
}

impl EdgeCondition {
    pub fn new(predicate: impl Fn(&Value, &Value) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Arc::new(predicate),
            is_default: false,
        }
    }

    pub fn default_edge() -> Self {
        Self {
            predicate: Arc::new(|_, _| true),
            is_default: true,
        }
    }

    /// Evaluate against the event's payload and the current process state.
    pub fn matches(&self, event_data: &Value, process_state: &Value) -> bool {
        (self.predicate)(event_data, process_state)
    }
}

impl fmt::Debug for EdgeCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeCondition")
            .field("is_default", &self.is_default)
            .finish_non_exhaustive()
    }
}

/// How a process's JSON state is mutated by a `StateUpdate` edge. Deliberately
/// minimal: spec.md excludes a concrete expression language (§1 Non-goals),
/// so only structural set/merge at a dot-path are supported.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StateUpdateOp {
    /// Replace the value at `path` with the event's data.
    Set,
    /// Shallow-merge the event's data (must be a JSON object) into the
    /// object at `path`.
    Merge,
}

/// Tagged variant describing what an edge does once it matches.
#[derive(Debug, Clone)]
pub enum OutputTarget {
    /// Deliver to a step's entry point.
    Function {
        step_id: String,
        function_name: String,
        /// When set, the event's data is packed under this parameter name.
        parameter_name: Option<String>,
    },
    /// Mutate process-level state in place, without a dispatched message.
    StateUpdate { path: String, op: StateUpdateOp },
    /// Forward to an external topic via the `ExternalChannel`.
    Emit {
        topic: String,
        channel_key: Option<String>,
    },
    /// Route to an agent step's thread.
    AgentInvoke {
        step_id: String,
        thread_id: Option<String>,
    },
    /// Sentinel: terminates the owning process after the current superstep.
    End,
}

impl OutputTarget {
    pub fn end() -> Self {
        OutputTarget::End
    }

    pub fn destination_step_id(&self) -> Option<&str> {
        match self {
            OutputTarget::Function { step_id, .. } => Some(step_id),
            OutputTarget::AgentInvoke { step_id, .. } => Some(step_id),
            OutputTarget::End => Some(END_STEP_ID),
            OutputTarget::StateUpdate { .. } | OutputTarget::Emit { .. } => None,
        }
    }
}

/// A directed link keyed by a `(sourceStepId, eventName)` identifier.
#[derive(Debug, Clone)]
pub struct Edge {
    pub source_step_id: String,
    pub event_name: String,
    pub output_target: OutputTarget,
    pub condition: Option<EdgeCondition>,
    /// Non-empty when this edge feeds an AllOf join.
    pub group_id: Option<String>,
}

impl Edge {
    pub fn new(
        source_step_id: impl Into<String>,
        event_name: impl Into<String>,
        output_target: OutputTarget,
    ) -> Self {
        Self {
            source_step_id: source_step_id.into(),
            event_name: event_name.into(),
            output_target,
            condition: None,
            group_id: None,
        }
    }

    pub fn with_condition(mut self, condition: EdgeCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn is_default(&self) -> bool {
        self.condition.as_ref().is_some_and(|c| c.is_default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_edge_matches_anything() {
        let cond = EdgeCondition::default_edge();
        assert!(cond.matches(&Value::Null, &Value::Null));
        assert!(cond.is_default);
    }

    #[test]
    fn test_custom_condition() {
        let cond = EdgeCondition::new(|data, _state| data.as_i64().unwrap_or(0) > 0);
        assert!(cond.matches(&serde_json::json!(5), &Value::Null));
        assert!(!cond.matches(&serde_json::json!(-1), &Value::Null));
    }

    #[test]
    fn test_end_target_destination() {
        let target = OutputTarget::end();
        assert_eq!(target.destination_step_id(), Some(END_STEP_ID));
    }
}
