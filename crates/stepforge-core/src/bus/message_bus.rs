//! Event routing (spec §4.1): evaluates edges against an emitted
//! `ProcessEvent`, mutates process state for `StateUpdate` targets, and
//! stages `StepMessage`s for the next superstep.
//!
//! AllOf join accumulation is deliberately *not* done here — spec §5
//! states edge-group processors are owned by the executing step, so the
//! bus only tags a message with its `group_id` and forwards the raw
//! per-source contribution; `crate::step::executor::StepExecutor` performs
//! the actual accumulation.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{trace, warn};

use crate::model::edge::{Edge, OutputTarget, StateUpdateOp};
use crate::model::event::{ProcessEvent, Visibility};
use crate::model::message::{StepMessage, END_STEP_ID};
use crate::model::step_info::ProcessInfo;

/// Destination used for error events that no edge claims (spec §4.1,
/// "global-error target").
pub const GLOBAL_ERROR_TARGET: &str = "__global_error__";

/// An outbound delivery to the `ExternalChannel` (spec §6), staged
/// alongside `StepMessage`s so the orchestrator can drain both after a
/// superstep.
#[derive(Debug, Clone)]
pub struct EmitRequest {
    pub topic: String,
    pub channel_key: Option<String>,
    pub data: Option<Value>,
}

fn build_routing_table(info: &ProcessInfo) -> HashMap<String, Vec<Edge>> {
    let mut table = info.edges.clone();
    for step in &info.steps {
        for (qualified_id, edges) in &step.edges {
            table.entry(qualified_id.clone()).or_default().extend(edges.clone());
        }
    }
    table
}

/// Routes events for a single process instance and accumulates the
/// messages and side effects they produce.
#[derive(Debug)]
pub struct MessageBus {
    routing: HashMap<String, Vec<Edge>>,
    pending: Vec<StepMessage>,
    emits: Vec<EmitRequest>,
    unrouted_errors: Vec<ProcessEvent>,
    /// Public events with no matching edge. The sub-process wrapper
    /// (spec §4.4) drains these from a child bus and re-emits them against
    /// the parent; ordinary root processes simply never read this list.
    unrouted_public: Vec<ProcessEvent>,
}

impl MessageBus {
    pub fn new(info: &ProcessInfo) -> Self {
        Self {
            routing: build_routing_table(info),
            pending: Vec::new(),
            emits: Vec::new(),
            unrouted_errors: Vec::new(),
            unrouted_public: Vec::new(),
        }
    }

    /// Evaluate an event's qualified id against the routing table, mutating
    /// `state` in place for any `StateUpdate` edges that fire. Unrouted
    /// error events fall back to whatever is registered under
    /// `GLOBAL_ERROR_TARGET` before being logged and dropped (spec §7).
    pub fn emit_event(&mut self, event: &ProcessEvent, state: &mut Value) {
        let qualified_id = event.qualified_id();
        let edges = match self.routing.get(&qualified_id).cloned() {
            Some(edges) => edges,
            None if event.is_error => match self.routing.get(GLOBAL_ERROR_TARGET).cloned() {
                Some(edges) => {
                    warn!(qualified_id = %qualified_id, "error event falling back to global-error target");
                    edges
                }
                None => {
                    warn!(qualified_id = %qualified_id, "unrouted error event with no global-error target configured");
                    self.unrouted_errors.push(event.clone());
                    return;
                }
            },
            None => {
                trace!(qualified_id = %qualified_id, "no edges registered for event");
                if event.visibility == Visibility::Public {
                    self.unrouted_public.push(event.clone());
                }
                return;
            }
        };

        let event_data = event.data.clone().unwrap_or(Value::Null);
        let non_default: Vec<&Edge> = edges
            .iter()
            .filter(|e| !e.is_default() && e.condition.as_ref().map_or(true, |c| c.matches(&event_data, state)))
            .collect();

        let matched: Vec<&Edge> = if !non_default.is_empty() {
            non_default
        } else {
            edges.iter().filter(|e| e.is_default()).collect()
        };

        for edge in matched {
            self.fire(edge, event, state);
        }
    }

    /// Inject an external event, routed identically to a step-emitted one
    /// (spec §4.1 `addExternalEvent`).
    pub fn add_external_event(&mut self, event: &ProcessEvent, state: &mut Value) {
        self.emit_event(event, state);
    }

    /// Append an already-constructed message directly, bypassing routing.
    /// Used by the sub-process wrapper to seed a child bus and by replay of
    /// rehydrated messages.
    pub fn enqueue(&mut self, message: StepMessage) {
        self.pending.push(message);
    }

    fn fire(&mut self, edge: &Edge, event: &ProcessEvent, state: &mut Value) {
        match &edge.output_target {
            OutputTarget::StateUpdate { path, op } => {
                apply_state_update(state, path, op, event.data.clone());
            }
            OutputTarget::Emit { topic, channel_key } => {
                self.emits.push(EmitRequest {
                    topic: topic.clone(),
                    channel_key: channel_key.clone(),
                    data: event.data.clone(),
                });
            }
            OutputTarget::Function { step_id, function_name, parameter_name } => {
                let (data, parameters) = match parameter_name {
                    Some(name) => (
                        None,
                        HashMap::from([(name.clone(), event.data.clone().unwrap_or(Value::Null))]),
                    ),
                    None => (event.data.clone(), HashMap::new()),
                };
                self.pending.push(StepMessage {
                    source_id: event.source_id.clone(),
                    destination_id: step_id.clone(),
                    function_name: function_name.clone(),
                    source_event_id: event.qualified_id(),
                    target_event_id: None,
                    data,
                    parameters,
                    group_id: edge.group_id.clone(),
                    thread_id: event.thread_id.clone(),
                });
            }
            OutputTarget::AgentInvoke { step_id, thread_id } => {
                self.pending.push(StepMessage {
                    source_id: event.source_id.clone(),
                    destination_id: step_id.clone(),
                    function_name: "invoke".to_string(),
                    source_event_id: event.qualified_id(),
                    target_event_id: None,
                    data: event.data.clone(),
                    parameters: HashMap::new(),
                    group_id: edge.group_id.clone(),
                    thread_id: thread_id.clone().or_else(|| event.thread_id.clone()),
                });
            }
            OutputTarget::End => {
                self.pending.push(StepMessage {
                    source_id: event.source_id.clone(),
                    destination_id: END_STEP_ID.to_string(),
                    function_name: String::new(),
                    source_event_id: event.qualified_id(),
                    target_event_id: None,
                    data: event.data.clone(),
                    parameters: HashMap::new(),
                    group_id: None,
                    thread_id: None,
                });
            }
        }
    }

    pub fn drain_pending(&mut self) -> Vec<StepMessage> {
        std::mem::take(&mut self.pending)
    }

    pub fn drain_emits(&mut self) -> Vec<EmitRequest> {
        std::mem::take(&mut self.emits)
    }

    pub fn take_unrouted_errors(&mut self) -> Vec<ProcessEvent> {
        std::mem::take(&mut self.unrouted_errors)
    }

    pub fn take_unrouted_public(&mut self) -> Vec<ProcessEvent> {
        std::mem::take(&mut self.unrouted_public)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn routes_for(&self, qualified_id: &str) -> Option<&[Edge]> {
        self.routing.get(qualified_id).map(Vec::as_slice)
    }
}

fn apply_state_update(state: &mut Value, path: &str, op: &StateUpdateOp, incoming: Option<Value>) {
    let incoming = incoming.unwrap_or(Value::Null);
    let target = navigate_or_create(state, path);
    match op {
        StateUpdateOp::Set => *target = incoming,
        StateUpdateOp::Merge => {
            let mergeable = matches!((&*target, &incoming), (Value::Object(_), Value::Object(_)));
            if mergeable {
                if let (Value::Object(existing), Value::Object(new_fields)) = (&mut *target, incoming) {
                    existing.extend(new_fields);
                }
            } else {
                *target = incoming;
            }
        }
    }
}

fn navigate_or_create<'a>(state: &'a mut Value, path: &str) -> &'a mut Value {
    let mut cursor = state;
    for segment in path.split('.') {
        if !cursor.is_object() {
            *cursor = Value::Object(serde_json::Map::new());
        }
        cursor = cursor
            .as_object_mut()
            .expect("just normalized to an object")
            .entry(segment.to_string())
            .or_insert(Value::Null);
    }
    cursor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::edge::EdgeCondition;
    use crate::model::event::Visibility;
    use crate::model::step_info::{InnerStepType, StepInfo};
    use serde_json::json;

    fn linear_process() -> ProcessInfo {
        let edge = Edge::new("A", "Produce", OutputTarget::Function {
            step_id: "B".to_string(),
            function_name: "run".to_string(),
            parameter_name: Some("input".to_string()),
        });
        let step_a = StepInfo::new("A", "run1", InnerStepType::Function);
        let mut info = ProcessInfo::new("proc", "run1").with_step(step_a);
        info.steps[0].edges.insert("A_run1.Produce".to_string(), vec![edge]);
        info
    }

    #[test]
    fn test_function_edge_routes_to_step() {
        let info = linear_process();
        let mut bus = MessageBus::new(&info);
        let mut state = Value::Null;
        let event = ProcessEvent::new("A", "A_run1", "Produce", Some(json!(42)), Visibility::Internal);
        bus.emit_event(&event, &mut state);

        let pending = bus.drain_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].destination_id, "B");
        assert_eq!(pending[0].parameters.get("input"), Some(&json!(42)));
    }

    #[test]
    fn test_default_edge_only_fires_when_no_other_matches() {
        let mut info = ProcessInfo::new("proc", "run1");
        let specific = Edge::new("A", "Produce", OutputTarget::Function {
            step_id: "B".to_string(),
            function_name: "run".to_string(),
            parameter_name: None,
        })
        .with_condition(EdgeCondition::new(|data, _| data.as_i64() == Some(1)));
        let default = Edge::new("A", "Produce", OutputTarget::Function {
            step_id: "C".to_string(),
            function_name: "run".to_string(),
            parameter_name: None,
        })
        .with_condition(EdgeCondition::default_edge());
        info.edges.insert("A.Produce".to_string(), vec![specific, default]);

        let mut bus = MessageBus::new(&info);
        let mut state = Value::Null;
        bus.emit_event(&ProcessEvent::new("A", "proc", "Produce", Some(json!(2)), Visibility::Public), &mut state);
        let pending = bus.drain_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].destination_id, "C");
    }

    #[test]
    fn test_state_update_merges_object() {
        let mut info = ProcessInfo::new("proc", "run1");
        info.edges.insert(
            "A.Produce".to_string(),
            vec![Edge::new("A", "Produce", OutputTarget::StateUpdate {
                path: "counters".to_string(),
                op: StateUpdateOp::Merge,
            })],
        );
        let mut bus = MessageBus::new(&info);
        let mut state = json!({"counters": {"a": 1}});
        bus.emit_event(
            &ProcessEvent::new("A", "proc", "Produce", Some(json!({"b": 2})), Visibility::Public),
            &mut state,
        );
        assert_eq!(state, json!({"counters": {"a": 1, "b": 2}}));
    }

    #[test]
    fn test_unrouted_error_is_captured() {
        let info = ProcessInfo::new("proc", "run1");
        let mut bus = MessageBus::new(&info);
        let mut state = Value::Null;
        bus.emit_event(&ProcessEvent::error("A", "A_run1", "OnError", None), &mut state);
        assert_eq!(bus.take_unrouted_errors().len(), 1);
    }

    #[test]
    fn test_unrouted_error_falls_back_to_global_error_target() {
        let mut info = ProcessInfo::new("proc", "run1");
        let to_handler = Edge::new("F", "OnError", OutputTarget::Function {
            step_id: "H".to_string(),
            function_name: "Handle".to_string(),
            parameter_name: Some("error".to_string()),
        });
        info.edges.insert(GLOBAL_ERROR_TARGET.to_string(), vec![to_handler]);

        let mut bus = MessageBus::new(&info);
        let mut state = Value::Null;
        bus.emit_event(&ProcessEvent::error("F", "F_run1", "f.OnError", Some(json!("boom"))), &mut state);

        assert!(bus.take_unrouted_errors().is_empty());
        let pending = bus.drain_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].destination_id, "H");
        assert_eq!(pending[0].parameters.get("error"), Some(&json!("boom")));
    }

    #[test]
    fn test_group_tagged_messages_stay_unmerged_at_bus_level() {
        let mut info = ProcessInfo::new("proc", "run1");
        let edge_a = Edge::new("A", "Produce", OutputTarget::Function {
            step_id: "C".to_string(),
            function_name: "run".to_string(),
            parameter_name: None,
        })
        .with_group("join");
        info.edges.insert("A.Produce".to_string(), vec![edge_a]);

        let mut bus = MessageBus::new(&info);
        let mut state = Value::Null;
        bus.emit_event(&ProcessEvent::new("A", "proc", "Produce", Some(json!(1)), Visibility::Public), &mut state);

        let pending = bus.drain_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].group_id.as_deref(), Some("join"));
        assert_eq!(pending[0].data, Some(json!(1)));
    }
}
