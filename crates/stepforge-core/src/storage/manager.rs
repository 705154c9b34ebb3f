//! `StorageManager` — gates `StorageBackend` calls behind a circuit
//! breaker and converts backend failures into the non-fatal read-as-
//! absent / write-as-no-op policy spec §7 requires.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::warn;

use stepforge_shared::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics};

use crate::storage::backend::{ProcessSnapshot, StorageBackend};

/// Thin resilience wrapper around a `StorageBackend`. Every call records
/// success/failure against the breaker; once open, calls are rejected
/// locally without reaching the backend at all.
#[derive(Debug)]
pub struct StorageManager {
    backend: Arc<dyn StorageBackend>,
    breaker: CircuitBreaker,
}

impl StorageManager {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self::with_config(backend, CircuitBreakerConfig::default())
    }

    pub fn with_config(backend: Arc<dyn StorageBackend>, config: CircuitBreakerConfig) -> Self {
        Self { backend, breaker: CircuitBreaker::new("storage", config) }
    }

    pub fn is_healthy(&self) -> bool {
        self.breaker.is_healthy()
    }

    /// Point-in-time circuit breaker metrics, for `ProcessOrchestrator::health`.
    pub fn health(&self) -> CircuitBreakerMetrics {
        self.breaker.metrics()
    }

    pub async fn save_process(&self, process_id: &str, run_id: &str, snapshot: ProcessSnapshot) {
        if !self.breaker.should_allow() {
            warn!(process_id, run_id, "storage circuit open; dropping process snapshot");
            return;
        }
        let started = Instant::now();
        match self.backend.save_process(process_id, run_id, snapshot).await {
            Ok(()) => self.breaker.record_success_manual(started.elapsed()),
            Err(err) => {
                warn!(process_id, run_id, error = %err, "save_process failed; continuing");
                self.breaker.record_failure_manual(started.elapsed());
            }
        }
    }

    pub async fn get_process(&self, process_id: &str, run_id: &str) -> Option<ProcessSnapshot> {
        if !self.breaker.should_allow() {
            return None;
        }
        let started = Instant::now();
        match self.backend.get_process(process_id, run_id).await {
            Ok(snapshot) => {
                self.breaker.record_success_manual(started.elapsed());
                snapshot
            }
            Err(err) => {
                warn!(process_id, run_id, error = %err, "get_process failed; treating as absent");
                self.breaker.record_failure_manual(started.elapsed());
                None
            }
        }
    }

    pub async fn save_step_state(&self, step_id: &str, run_id: &str, metadata: Value) {
        if !self.breaker.should_allow() {
            warn!(step_id, run_id, "storage circuit open; dropping step state");
            return;
        }
        let started = Instant::now();
        match self.backend.save_step_state(step_id, run_id, metadata).await {
            Ok(()) => self.breaker.record_success_manual(started.elapsed()),
            Err(err) => {
                warn!(step_id, run_id, error = %err, "save_step_state failed; continuing");
                self.breaker.record_failure_manual(started.elapsed());
            }
        }
    }

    pub async fn get_step_state(&self, step_id: &str, run_id: &str) -> Option<Value> {
        if !self.breaker.should_allow() {
            return None;
        }
        let started = Instant::now();
        match self.backend.get_step_state(step_id, run_id).await {
            Ok(state) => {
                self.breaker.record_success_manual(started.elapsed());
                state
            }
            Err(err) => {
                warn!(step_id, run_id, error = %err, "get_step_state failed; treating as absent");
                self.breaker.record_failure_manual(started.elapsed());
                None
            }
        }
    }

    pub async fn save_step_edge_data(
        &self,
        step_id: &str,
        run_id: &str,
        data: HashMap<String, HashMap<String, Value>>,
        is_group_edge: bool,
    ) {
        if !self.breaker.should_allow() {
            warn!(step_id, run_id, "storage circuit open; dropping edge-group snapshot");
            return;
        }
        let started = Instant::now();
        match self.backend.save_step_edge_data(step_id, run_id, data, is_group_edge).await {
            Ok(()) => self.breaker.record_success_manual(started.elapsed()),
            Err(err) => {
                warn!(step_id, run_id, error = %err, "save_step_edge_data failed; continuing");
                self.breaker.record_failure_manual(started.elapsed());
            }
        }
    }

    pub async fn get_step_edge_data(&self, step_id: &str, run_id: &str) -> (bool, HashMap<String, HashMap<String, Value>>) {
        if !self.breaker.should_allow() {
            return (false, HashMap::new());
        }
        let started = Instant::now();
        match self.backend.get_step_edge_data(step_id, run_id).await {
            Ok(data) => {
                self.breaker.record_success_manual(started.elapsed());
                data
            }
            Err(err) => {
                warn!(step_id, run_id, error = %err, "get_step_edge_data failed; treating as absent");
                self.breaker.record_failure_manual(started.elapsed());
                (false, HashMap::new())
            }
        }
    }

    pub async fn close(&self) {
        if let Err(err) = self.backend.close().await {
            warn!(error = %err, "storage backend close failed");
        }
    }
}
