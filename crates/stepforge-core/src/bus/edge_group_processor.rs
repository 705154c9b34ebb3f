//! AllOf join accumulation (spec §4.2).
//!
//! Each `EdgeGroupDef` names a fixed set of `sourceKey`s (`<stepId>.<eventName>`,
//! derived from the contributing `StepMessage::source_id` rather than by
//! string-stripping a qualified event id — every message we see already
//! carries the authored step name in `source_id`). A group releases once a
//! value has been observed for every required key; a source firing twice
//! before release overwrites its previous contribution (last-wins, per
//! spec.md's own resolution of that ambiguity).

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::model::edge_group::EdgeGroupDef;

#[derive(Debug, Clone, Default)]
struct GroupState {
    required: HashSet<String>,
    data: HashMap<String, Value>,
}

impl GroupState {
    fn is_ready(&self) -> bool {
        self.required.iter().all(|k| self.data.contains_key(k))
    }
}

/// The outcome of observing one contribution to a group.
#[derive(Debug, Clone)]
pub enum JoinOutcome {
    /// Still waiting on at least one source.
    Pending,
    /// Every required source has contributed; carries the merged map keyed
    /// by `sourceKey`, already passed through the group's `input_mapping`
    /// if one was configured.
    Released(HashMap<String, Value>),
}

/// Tracks in-flight AllOf joins for a single process instance.
#[derive(Debug, Default)]
pub struct EdgeGroupProcessor {
    defs: HashMap<String, EdgeGroupDef>,
    state: HashMap<String, GroupState>,
}

impl EdgeGroupProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, def: EdgeGroupDef) {
        let required = def.required_keys();
        self.state.entry(def.group_id.clone()).or_insert_with(|| GroupState {
            required,
            data: HashMap::new(),
        });
        self.defs.insert(def.group_id.clone(), def);
    }

    /// Record a contribution and report whether the group is now complete.
    pub fn observe(&mut self, group_id: &str, source_key: &str, data: Value) -> JoinOutcome {
        let Some(state) = self.state.get_mut(group_id) else {
            return JoinOutcome::Pending;
        };
        state.data.insert(source_key.to_string(), data);
        if !state.is_ready() {
            return JoinOutcome::Pending;
        }

        let collected = state.data.clone();
        state.data.clear();

        let mapped = match self.defs.get(group_id).and_then(|d| d.input_mapping.as_ref()) {
            Some(mapping) => mapping(&collected),
            None => collected,
        };
        JoinOutcome::Released(mapped)
    }

    /// Restore accumulated-but-unreleased contributions from a durable
    /// snapshot (spec §7, partial edge-group state).
    pub fn rehydrate(&mut self, group_id: &str, data: HashMap<String, Value>) {
        if let Some(state) = self.state.get_mut(group_id) {
            state.data = data;
        }
    }

    /// Snapshot every group's unreleased contributions, for persistence.
    pub fn snapshot(&self) -> HashMap<String, HashMap<String, Value>> {
        self.state
            .iter()
            .filter(|(_, s)| !s.data.is_empty())
            .map(|(id, s)| (id.clone(), s.data.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def() -> EdgeGroupDef {
        EdgeGroupDef::new(
            "join",
            vec![("A".to_string(), "Produce".to_string()), ("B".to_string(), "Produce".to_string())],
        )
    }

    #[test]
    fn test_releases_once_all_sources_observed() {
        let mut proc = EdgeGroupProcessor::new();
        proc.register(def());

        assert!(matches!(
            proc.observe("join", "A.Produce", Value::from(1)),
            JoinOutcome::Pending
        ));
        match proc.observe("join", "B.Produce", Value::from(2)) {
            JoinOutcome::Released(data) => {
                assert_eq!(data.get("A.Produce"), Some(&Value::from(1)));
                assert_eq!(data.get("B.Produce"), Some(&Value::from(2)));
            }
            JoinOutcome::Pending => panic!("expected release"),
        }
    }

    #[test]
    fn test_second_contribution_overwrites_first() {
        let mut proc = EdgeGroupProcessor::new();
        proc.register(def());
        proc.observe("join", "A.Produce", Value::from(1));
        proc.observe("join", "A.Produce", Value::from(99));
        match proc.observe("join", "B.Produce", Value::from(2)) {
            JoinOutcome::Released(data) => assert_eq!(data.get("A.Produce"), Some(&Value::from(99))),
            JoinOutcome::Pending => panic!("expected release"),
        }
    }

    #[test]
    fn test_group_resets_after_release() {
        let mut proc = EdgeGroupProcessor::new();
        proc.register(def());
        proc.observe("join", "A.Produce", Value::from(1));
        proc.observe("join", "B.Produce", Value::from(2));
        assert!(matches!(
            proc.observe("join", "A.Produce", Value::from(3)),
            JoinOutcome::Pending
        ));
    }

    #[test]
    fn test_rehydrate_restores_partial_state() {
        let mut proc = EdgeGroupProcessor::new();
        proc.register(def());
        let mut restored = HashMap::new();
        restored.insert("A.Produce".to_string(), Value::from(7));
        proc.rehydrate("join", restored);

        match proc.observe("join", "B.Produce", Value::from(8)) {
            JoinOutcome::Released(data) => assert_eq!(data.get("A.Produce"), Some(&Value::from(7))),
            JoinOutcome::Pending => panic!("expected release"),
        }
    }
}
