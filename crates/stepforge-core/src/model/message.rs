//! `StepMessage` — a scheduled invocation (spec §3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Reserved destination id that terminates the owning orchestrator once the
/// superstep dispatching it has completed (spec §3, "Sentinel end step").
pub const END_STEP_ID: &str = "__end__";

/// A scheduled invocation produced by routing a `ProcessEvent` through an
/// `Edge`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepMessage {
    pub source_id: String,
    pub destination_id: String,
    pub function_name: String,
    /// The qualified id of the event that produced this message — lets
    /// edge-group joins identify the contributing source.
    pub source_event_id: String,
    /// Used only when the destination is a sub-process.
    pub target_event_id: Option<String>,
    pub data: Option<serde_json::Value>,
    pub parameters: HashMap<String, serde_json::Value>,
    /// Non-empty when this message is a partial contribution to an AllOf
    /// join; cleared once the join releases.
    pub group_id: Option<String>,
    pub thread_id: Option<String>,
}

impl StepMessage {
    pub fn is_end_sentinel(&self) -> bool {
        self.destination_id == END_STEP_ID
    }
}
