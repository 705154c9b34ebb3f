//! `ProcessHandle` — the external facade spec §6 describes: `start`,
//! `sendEvent`, `stop`, `getState`, `getProcessId`. Grounded on the
//! teacher's `orchestration::commands` module: a dedicated task owns the
//! orchestrator exclusively, and callers interact with it only through
//! channels, never through a shared `&mut`.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use stepforge_shared::config::ExecutionConfig;
use stepforge_shared::resilience::CircuitBreakerMetrics;
use stepforge_shared::{ProcessError, ProcessResult};

use crate::context::{CancellationToken, ProcessContext};
use crate::model::event::ProcessEvent;
use crate::model::step_info::ProcessInfo;
use crate::orchestrator::{ProcessOrchestrator, RunMode, TerminationReason};
use crate::registry::StepRegistry;
use crate::statistics::OrchestrationStatistics;
use crate::storage::StorageManager;

/// A running process instance. Dropping the handle does not stop the
/// orchestrator task — call `stop()` explicitly, or `join()` to await its
/// natural termination.
#[derive(Debug)]
pub struct ProcessHandle {
    process_id: String,
    external_events: mpsc::UnboundedSender<ProcessEvent>,
    cancellation: CancellationToken,
    state_rx: watch::Receiver<ProcessInfo>,
    stats: OrchestrationStatistics,
    storage: Arc<StorageManager>,
    task: JoinHandle<ProcessResult<TerminationReason>>,
}

impl ProcessHandle {
    /// Spawn an orchestrator for `info` and run it to completion in the
    /// background (spec §6 `start`).
    pub fn start(
        info: ProcessInfo,
        initial_event: Option<ProcessEvent>,
        mode: RunMode,
        registry: Arc<StepRegistry>,
        storage: Arc<StorageManager>,
        execution: ExecutionConfig,
    ) -> Self {
        let process_id = info.process_id.clone();
        let context = ProcessContext::root(info.process_id.clone(), info.run_id.clone());
        let cancellation = context.cancellation.clone();

        let (external_tx, external_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(info.clone());

        let mut orchestrator = ProcessOrchestrator::new(info, context, registry, storage.clone(), execution)
            .with_state_publisher(state_tx);
        let stats = orchestrator.statistics();

        let task = tokio::spawn(async move { orchestrator.run(initial_event, mode, Some(external_rx)).await });

        Self {
            process_id,
            external_events: external_tx,
            cancellation,
            state_rx,
            stats,
            storage,
            task,
        }
    }

    /// Inject an external event while the process is running (spec §6
    /// `sendEvent`).
    pub fn send_event(&self, event: ProcessEvent) {
        // The receiver only disappears once the orchestrator task has
        // already exited; a dropped send is simply a no-op.
        let _ = self.external_events.send(event);
    }

    /// Request cancellation and wait for the superstep loop to drain (spec
    /// §6 `stop`, "resolves when drained").
    pub async fn stop(self) -> ProcessResult<TerminationReason> {
        self.cancellation.cancel();
        self.task
            .await
            .map_err(|err| ProcessError::configuration(format!("orchestrator task panicked: {err}")))?
    }

    /// Await natural termination without requesting cancellation.
    pub async fn join(self) -> ProcessResult<TerminationReason> {
        self.task
            .await
            .map_err(|err| ProcessError::configuration(format!("orchestrator task panicked: {err}")))?
    }

    /// The most recently published `ProcessInfo` snapshot (spec §6
    /// `getState`).
    pub fn get_state(&self) -> ProcessInfo {
        self.state_rx.borrow().clone()
    }

    /// A cloned receiver onto the state-publication channel, for callers
    /// that need to keep observing state after consuming the handle via
    /// `stop()`/`join()`.
    pub fn state_receiver(&self) -> watch::Receiver<ProcessInfo> {
        self.state_rx.clone()
    }

    pub fn get_process_id(&self) -> &str {
        &self.process_id
    }

    pub fn statistics(&self) -> OrchestrationStatistics {
        self.stats.clone()
    }

    /// Storage circuit breaker health, independent of the orchestrator task.
    pub fn health(&self) -> CircuitBreakerMetrics {
        self.storage.health()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StepContext;
    use crate::model::event::Visibility;
    use crate::model::step_info::{InnerStepType, StepInfo};
    use crate::step::kernel::{EntryPointSignature, StepKernel};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::HashMap;

    #[derive(Debug)]
    struct NoopKernel;

    #[async_trait]
    impl StepKernel for NoopKernel {
        fn entry_points(&self) -> Vec<EntryPointSignature> {
            vec![EntryPointSignature::new("Run", vec![])]
        }

        async fn invoke(
            &mut self,
            _function_name: &str,
            _params: HashMap<String, Value>,
            _ctx: &dyn StepContext,
        ) -> ProcessResult<Value> {
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn test_start_then_stop_reports_cancelled() {
        let mut registry = StepRegistry::new();
        registry.register("A", Arc::new(|| Box::new(NoopKernel) as Box<dyn StepKernel>));
        let info = ProcessInfo::new("proc", "run1").with_step(StepInfo::new("A", "run1", InnerStepType::Function));
        let storage = Arc::new(StorageManager::new(Arc::new(crate::storage::InMemoryStorageBackend::default())));

        let handle = ProcessHandle::start(
            info,
            None,
            RunMode::Continuous,
            Arc::new(registry),
            storage,
            ExecutionConfig::default(),
        );

        assert_eq!(handle.get_process_id(), "proc");
        let reason = handle.stop().await.unwrap();
        assert_eq!(reason, TerminationReason::Cancelled);
    }

    #[tokio::test]
    async fn test_get_state_reflects_published_snapshot() {
        let mut registry = StepRegistry::new();
        registry.register("A", Arc::new(|| Box::new(NoopKernel) as Box<dyn StepKernel>));
        let info = ProcessInfo::new("proc", "run1").with_step(StepInfo::new("A", "run1", InnerStepType::Function));
        let storage = Arc::new(StorageManager::new(Arc::new(crate::storage::InMemoryStorageBackend::default())));
        let start_event = ProcessEvent::new("external", "proc", "Start", None, Visibility::Public);

        let handle = ProcessHandle::start(
            info,
            Some(start_event),
            RunMode::OneShot,
            Arc::new(registry),
            storage,
            ExecutionConfig::default(),
        );
        let state_rx = handle.state_receiver();
        let reason = handle.join().await.unwrap();
        assert_eq!(reason, TerminationReason::EmptySuperstepThreshold);
        assert_eq!(state_rx.borrow().process_id, "proc");
    }
}
