//! `StorageBackend` — the abstract key/value contract the storage manager
//! drives (spec §4.6). Defining a concrete backend is explicitly out of
//! scope (spec.md §1 Non-goals); `InMemoryStorageBackend` exists only as a
//! reference implementation for tests and for hosts with no durability
//! requirement.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use stepforge_shared::ProcessResult;

/// A durable snapshot of one process instance's user-visible state. Graph
/// shape (steps, edges, conditions) is defined in code and is never
/// round-tripped through storage — only the mutable parts are.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessSnapshot {
    pub process_id: String,
    pub run_id: String,
    pub version: u32,
    pub state: Value,
}

/// The storage contract consumed by `StorageManager` (spec §4.6).
/// Implementations are pure glue: no business logic, no retries — those
/// live in `StorageManager`.
#[async_trait]
pub trait StorageBackend: Send + Sync + std::fmt::Debug {
    async fn save_process(&self, process_id: &str, run_id: &str, snapshot: ProcessSnapshot) -> ProcessResult<()>;
    async fn get_process(&self, process_id: &str, run_id: &str) -> ProcessResult<Option<ProcessSnapshot>>;

    async fn save_step_state(&self, step_id: &str, run_id: &str, metadata: Value) -> ProcessResult<()>;
    async fn get_step_state(&self, step_id: &str, run_id: &str) -> ProcessResult<Option<Value>>;

    async fn save_step_edge_data(
        &self,
        step_id: &str,
        run_id: &str,
        data: HashMap<String, HashMap<String, Value>>,
        is_group_edge: bool,
    ) -> ProcessResult<()>;
    async fn get_step_edge_data(
        &self,
        step_id: &str,
        run_id: &str,
    ) -> ProcessResult<(bool, HashMap<String, HashMap<String, Value>>)>;

    async fn close(&self) -> ProcessResult<()>;
}

type ProcessKey = (String, String);

/// A process-memory-only backend. Data does not survive the host
/// restarting; useful for tests exercising rehydration within one process
/// lifetime (scenario F only exercises "destroy and rebuild the
/// orchestrator", not the OS process).
#[derive(Debug, Default)]
pub struct InMemoryStorageBackend {
    processes: Mutex<HashMap<ProcessKey, ProcessSnapshot>>,
    step_states: Mutex<HashMap<ProcessKey, Value>>,
    edge_data: Mutex<HashMap<ProcessKey, (bool, HashMap<String, HashMap<String, Value>>)>>,
}

impl InMemoryStorageBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorageBackend {
    async fn save_process(&self, process_id: &str, run_id: &str, snapshot: ProcessSnapshot) -> ProcessResult<()> {
        self.processes
            .lock()
            .expect("storage mutex poisoned")
            .insert((process_id.to_string(), run_id.to_string()), snapshot);
        Ok(())
    }

    async fn get_process(&self, process_id: &str, run_id: &str) -> ProcessResult<Option<ProcessSnapshot>> {
        Ok(self
            .processes
            .lock()
            .expect("storage mutex poisoned")
            .get(&(process_id.to_string(), run_id.to_string()))
            .cloned())
    }

    async fn save_step_state(&self, step_id: &str, run_id: &str, metadata: Value) -> ProcessResult<()> {
        self.step_states
            .lock()
            .expect("storage mutex poisoned")
            .insert((step_id.to_string(), run_id.to_string()), metadata);
        Ok(())
    }

    async fn get_step_state(&self, step_id: &str, run_id: &str) -> ProcessResult<Option<Value>> {
        Ok(self
            .step_states
            .lock()
            .expect("storage mutex poisoned")
            .get(&(step_id.to_string(), run_id.to_string()))
            .cloned())
    }

    async fn save_step_edge_data(
        &self,
        step_id: &str,
        run_id: &str,
        data: HashMap<String, HashMap<String, Value>>,
        is_group_edge: bool,
    ) -> ProcessResult<()> {
        self.edge_data
            .lock()
            .expect("storage mutex poisoned")
            .insert((step_id.to_string(), run_id.to_string()), (is_group_edge, data));
        Ok(())
    }

    async fn get_step_edge_data(
        &self,
        step_id: &str,
        run_id: &str,
    ) -> ProcessResult<(bool, HashMap<String, HashMap<String, Value>>)> {
        Ok(self
            .edge_data
            .lock()
            .expect("storage mutex poisoned")
            .get(&(step_id.to_string(), run_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn close(&self) -> ProcessResult<()> {
        Ok(())
    }
}
