//! `StepInfo` / `ProcessInfo` — the declarative graph description handed to
//! the orchestrator (spec §3, §4.4 for nesting).

use std::collections::HashMap;

use serde_json::Value;

use crate::model::edge::Edge;
use crate::model::edge_group::EdgeGroupDef;

/// What kind of kernel a step is backed by. `SubProcess` is the nesting
/// mechanism from spec §4.4: the inner graph is fully materialized up
/// front rather than resolved lazily.
#[derive(Debug, Clone)]
pub enum InnerStepType {
    Function,
    Map,
    Proxy,
    Agent,
    SubProcess(Box<ProcessInfo>),
}

/// A single node in the process graph.
#[derive(Debug, Clone)]
pub struct StepInfo {
    pub step_id: String,
    pub run_id: String,
    pub version: u32,
    pub inner_step_type: InnerStepType,
    /// Outgoing edges keyed by the step-scoped qualified id
    /// (`<stepId>_<runId>.<eventName>`).
    pub edges: HashMap<String, Vec<Edge>>,
    /// AllOf joins this step's entry points participate in, keyed by
    /// `group_id`.
    pub incoming_edge_groups: HashMap<String, EdgeGroupDef>,
    pub state: Value,
}

impl StepInfo {
    pub fn new(step_id: impl Into<String>, run_id: impl Into<String>, inner_step_type: InnerStepType) -> Self {
        Self {
            step_id: step_id.into(),
            run_id: run_id.into(),
            version: 1,
            inner_step_type,
            edges: HashMap::new(),
            incoming_edge_groups: HashMap::new(),
            state: Value::Null,
        }
    }

    /// The namespace a step's self-emitted events are routed under.
    pub fn namespace(&self) -> String {
        format!("{}_{}", self.step_id, self.run_id)
    }
}

/// The top-level (or nested) process graph.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub process_id: String,
    pub run_id: String,
    pub version: u32,
    pub steps: Vec<StepInfo>,
    /// Process-level edges keyed by `<processId>.<eventName>` — disjoint
    /// from any `StepInfo::edges` key by construction, since step keys are
    /// always suffixed with `_<runId>`.
    pub edges: HashMap<String, Vec<Edge>>,
    /// Declared shape of user-defined process state; advisory only; the
    /// runtime does not validate against it (spec.md leaves validation
    /// unspecified).
    pub user_state_type: Option<String>,
    pub threads: Option<Vec<String>>,
    pub state: Value,
}

impl ProcessInfo {
    pub fn new(process_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            process_id: process_id.into(),
            run_id: run_id.into(),
            version: 1,
            steps: Vec::new(),
            edges: HashMap::new(),
            user_state_type: None,
            threads: None,
            state: Value::Null,
        }
    }

    pub fn with_step(mut self, step: StepInfo) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_edges(mut self, qualified_event_id: impl Into<String>, edges: Vec<Edge>) -> Self {
        self.edges.insert(qualified_event_id.into(), edges);
        self
    }

    pub fn step(&self, step_id: &str) -> Option<&StepInfo> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_namespace() {
        let step = StepInfo::new("A", "run1", InnerStepType::Function);
        assert_eq!(step.namespace(), "A_run1");
    }

    #[test]
    fn test_process_info_step_lookup() {
        let info = ProcessInfo::new("proc", "run1")
            .with_step(StepInfo::new("A", "run1", InnerStepType::Function));
        assert!(info.step("A").is_some());
        assert!(info.step("B").is_none());
    }
}
