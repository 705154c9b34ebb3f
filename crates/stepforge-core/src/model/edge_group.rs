//! Declarative `EdgeGroup` definitions (spec §3). The runtime accumulator
//! that consumes these lives in `crate::bus::edge_group_processor`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// A pure function over the accumulated `sourceKey -> value` map. Per spec
/// §6, implementations must tolerate a missing mapping by passing the map
/// through unchanged — callers using `EdgeGroupDef::new` without
/// `with_input_mapping` get exactly that behavior.
pub type InputMapping = Arc<dyn Fn(&HashMap<String, Value>) -> HashMap<String, Value> + Send + Sync>;

/// Declares an AllOf join on the destination step.
#[derive(Clone)]
pub struct EdgeGroupDef {
    pub group_id: String,
    /// The `(sourceStepId, eventName)` pairs that must all fire before
    /// release.
    pub message_sources: Vec<(String, String)>,
    pub input_mapping: Option<InputMapping>,
}

impl fmt::Debug for EdgeGroupDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeGroupDef")
            .field("group_id", &self.group_id)
            .field("message_sources", &self.message_sources)
            .field("input_mapping", &self.input_mapping.is_some())
            .finish()
    }
}

impl EdgeGroupDef {
    pub fn new(group_id: impl Into<String>, message_sources: Vec<(String, String)>) -> Self {
        Self {
            group_id: group_id.into(),
            message_sources,
            input_mapping: None,
        }
    }

    pub fn with_input_mapping(mut self, mapping: InputMapping) -> Self {
        self.input_mapping = Some(mapping);
        self
    }

    /// The stable `sourceKey` set this group requires before it releases.
    pub fn required_keys(&self) -> std::collections::HashSet<String> {
        self.message_sources
            .iter()
            .map(|(step, event)| format!("{step}.{event}"))
            .collect()
    }
}
