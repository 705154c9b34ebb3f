//! `ProcessOrchestrator` — drives the superstep loop (spec §4.5).

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use stepforge_shared::config::ExecutionConfig;
use stepforge_shared::resilience::CircuitBreakerMetrics;
use stepforge_shared::ProcessResult;

use crate::bus::MessageBus;
use crate::context::ProcessContext;
use crate::model::edge_group::EdgeGroupDef;
use crate::model::event::{ProcessEvent, Visibility};
use crate::model::message::StepMessage;
use crate::model::step_info::{InnerStepType, ProcessInfo};
use crate::registry::StepRegistry;
use crate::statistics::OrchestrationStatistics;
use crate::step::executor::StepExecutor;
use crate::storage::{ProcessSnapshot, StorageManager};
use crate::subprocess::NestedProcessRunner;

/// How the superstep loop decides it has run to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Empty supersteps count toward the threshold; the loop exits once no
    /// progress is possible.
    OneShot,
    /// Empty supersteps never count toward the threshold; the loop idles
    /// until cancelled or the end sentinel is reached.
    Continuous,
}

/// Why `run` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    EndSentinel,
    EmptySuperstepThreshold,
    MaxSupersteps,
    Cancelled,
}

/// Owns one process instance: its graph, its bus, its materialized step
/// executors, and the superstep loop that drives them.
pub struct ProcessOrchestrator {
    info: ProcessInfo,
    state: Value,
    bus: MessageBus,
    context: ProcessContext,
    registry: Arc<StepRegistry>,
    storage: Arc<StorageManager>,
    execution: ExecutionConfig,
    stats: OrchestrationStatistics,
    executors: HashMap<String, Arc<Mutex<StepExecutor>>>,
    materialized: bool,
    /// Public events no internal edge claimed, accumulated across
    /// supersteps for the sub-process wrapper to forward upward (spec
    /// §4.4). Root-level orchestrators never read this.
    forwardable: Vec<ProcessEvent>,
    /// Publishes a fresh `ProcessInfo` after every superstep, for
    /// `ProcessHandle::getState` to read without contending for `&mut
    /// self` (spec §6).
    state_publisher: Option<watch::Sender<ProcessInfo>>,
}

impl std::fmt::Debug for ProcessOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessOrchestrator")
            .field("process_id", &self.info.process_id)
            .field("run_id", &self.info.run_id)
            .field("materialized", &self.materialized)
            .finish_non_exhaustive()
    }
}

impl ProcessOrchestrator {
    pub fn new(
        info: ProcessInfo,
        context: ProcessContext,
        registry: Arc<StepRegistry>,
        storage: Arc<StorageManager>,
        execution: ExecutionConfig,
    ) -> Self {
        let bus = MessageBus::new(&info);
        let state = info.state.clone();
        Self {
            info,
            state,
            bus,
            context,
            registry,
            storage,
            execution,
            stats: OrchestrationStatistics::new(),
            executors: HashMap::new(),
            materialized: false,
            forwardable: Vec::new(),
            state_publisher: None,
        }
    }

    /// Attach a channel that receives a `ProcessInfo` snapshot after every
    /// superstep (spec §6 `getState`, served without blocking the loop).
    pub fn with_state_publisher(mut self, publisher: watch::Sender<ProcessInfo>) -> Self {
        self.state_publisher = Some(publisher);
        self
    }

    /// Drain public events no internal edge matched, for the sub-process
    /// wrapper to re-emit against the parent bus.
    pub fn take_forwardable(&mut self) -> Vec<ProcessEvent> {
        std::mem::take(&mut self.forwardable)
    }

    pub fn process_id(&self) -> &str {
        &self.info.process_id
    }

    pub fn statistics(&self) -> OrchestrationStatistics {
        self.stats.clone()
    }

    /// The storage backend's circuit breaker metrics, for host-side health
    /// reporting (spec §7, "a production policy may upgrade storage errors
    /// to fatal" — this is that policy's observable state).
    pub fn health(&self) -> CircuitBreakerMetrics {
        self.storage.health()
    }

    /// Produce the current `ProcessInfo`, with each materialized step's
    /// live state folded back in (spec §6 `handle.getState`).
    pub fn state_snapshot(&self) -> ProcessInfo {
        let mut snapshot = self.info.clone();
        snapshot.state = self.state.clone();
        snapshot
    }

    async fn materialize(&mut self) -> ProcessResult<()> {
        if self.materialized {
            return Ok(());
        }

        if let Some(existing) = self.storage.get_process(&self.info.process_id, &self.info.run_id).await {
            self.state = existing.state;
        }

        for step in &self.info.steps {
            let groups: Vec<EdgeGroupDef> = step.incoming_edge_groups.values().cloned().collect();
            let mut executor = if let InnerStepType::SubProcess(nested) = &step.inner_step_type {
                let runner = NestedProcessRunner::new(
                    (**nested).clone(),
                    self.registry.clone(),
                    self.storage.clone(),
                    self.execution.clone(),
                    self.context.clone(),
                );
                StepExecutor::new_subprocess(step.step_id.clone(), Box::new(runner))
            } else {
                let kernel = self.registry.instantiate(&step.step_id)?;
                StepExecutor::new(step.step_id.clone(), kernel, groups)
            };

            let restored = self
                .storage
                .get_step_state(&step.step_id, &step.run_id)
                .await
                .unwrap_or_else(|| step.state.clone());
            executor.activate(restored).await?;

            let (is_group_edge, data) = self.storage.get_step_edge_data(&step.step_id, &step.run_id).await;
            if is_group_edge {
                for (group_id, partial) in data {
                    executor.rehydrate_edge_group(&group_id, partial);
                }
            }

            self.executors.insert(step.step_id.clone(), Arc::new(Mutex::new(executor)));
        }

        for step in &self.info.steps {
            let event = ProcessEvent::new(step.step_id.clone(), step.namespace(), "OnEnter", None, Visibility::Internal);
            self.bus.emit_event(&event, &mut self.state);
        }

        self.materialized = true;
        Ok(())
    }

    /// Run to quiescence or termination. `external_events` is polled
    /// (non-blocking) each iteration, so it may be left unbounded-empty for
    /// a one-shot run with no external input after the first event.
    pub async fn run(
        &mut self,
        initial_event: Option<ProcessEvent>,
        mode: RunMode,
        mut external_events: Option<mpsc::UnboundedReceiver<ProcessEvent>>,
    ) -> ProcessResult<TerminationReason> {
        self.materialize().await?;

        if let Some(event) = initial_event {
            self.bus.emit_event(&event, &mut self.state);
        }

        let mut empty_superstep_count = 0u32;

        loop {
            if self.context.cancellation.is_cancelled() {
                return Ok(TerminationReason::Cancelled);
            }

            if let Some(rx) = external_events.as_mut() {
                while let Ok(event) = rx.try_recv() {
                    self.bus.add_external_event(&event, &mut self.state);
                }
            }

            let pending = self.bus.drain_pending();
            if pending.is_empty() {
                match mode {
                    RunMode::OneShot => {
                        empty_superstep_count += 1;
                        if empty_superstep_count > self.execution.empty_superstep_threshold {
                            return Ok(TerminationReason::EmptySuperstepThreshold);
                        }
                        tokio::time::sleep(self.execution.empty_superstep_delay()).await;
                        continue;
                    }
                    RunMode::Continuous => {
                        if external_events.is_none() {
                            return Ok(TerminationReason::EmptySuperstepThreshold);
                        }
                        tokio::time::sleep(self.execution.empty_superstep_delay()).await;
                        continue;
                    }
                }
            }
            empty_superstep_count = 0;

            let terminate = pending.iter().any(StepMessage::is_end_sentinel);
            self.dispatch_batch(pending).await?;
            self.stats.record_superstep();

            for event in self.context.drain_outbox() {
                if self.context.passes_filter(&event) {
                    self.bus.emit_event(&event, &mut self.state);
                }
            }
            let unrouted = self.bus.take_unrouted_errors();
            if !unrouted.is_empty() {
                warn!(count = unrouted.len(), "errors with no matching edge; logged and dropped");
                self.stats.record_unrouted_errors(unrouted.len());
            }
            self.forwardable.extend(self.bus.take_unrouted_public());

            self.snapshot().await;
            if let Some(publisher) = &self.state_publisher {
                let _ = publisher.send(self.state_snapshot());
            }

            if terminate {
                return Ok(TerminationReason::EndSentinel);
            }
            if self.stats.supersteps_executed() >= self.execution.max_supersteps as u64 {
                return Ok(TerminationReason::MaxSupersteps);
            }
        }
    }

    async fn dispatch_batch(&mut self, pending: Vec<StepMessage>) -> ProcessResult<()> {
        let mut tasks = Vec::with_capacity(pending.len());

        for message in pending {
            if message.is_end_sentinel() {
                continue;
            }
            let Some(executor) = self.executors.get(&message.destination_id).cloned() else {
                warn!(destination_id = %message.destination_id, "dispatch error: unknown destination step");
                self.stats.record_dispatch_error();
                self.emit_dispatch_error(&message);
                continue;
            };

            let run_id = self
                .info
                .step(&message.destination_id)
                .map(|s| s.run_id.clone())
                .unwrap_or_else(|| self.info.run_id.clone());
            let ctx = self.context.invocation_context(message.destination_id.clone(), run_id);
            let stats = self.stats.clone();

            tasks.push(tokio::spawn(async move {
                let outcome = {
                    let mut guard = executor.lock().await;
                    guard.dispatch(message, &ctx).await
                };
                match &outcome {
                    Ok(o) => stats.record_dispatch_outcome(o),
                    Err(_) => stats.record_dispatch_error(),
                }
                outcome
            }));
        }

        let joined = join_all(tasks).await;
        let mut first_error = None;
        for result in joined {
            match result {
                Ok(Ok(_outcome)) => {}
                Ok(Err(err)) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
                Err(join_err) => {
                    warn!(error = %join_err, "step invocation task panicked");
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }
        Ok(())
    }

    fn emit_dispatch_error(&mut self, message: &StepMessage) {
        let namespace = message
            .source_event_id
            .rsplit_once('.')
            .map(|(ns, _)| ns.to_string())
            .unwrap_or_else(|| self.info.process_id.clone());
        let event = ProcessEvent::error(
            message.destination_id.clone(),
            namespace,
            "DispatchError",
            Some(Value::String(format!("unknown destination step '{}'", message.destination_id))),
        );
        self.bus.emit_event(&event, &mut self.state);
    }

    async fn snapshot(&mut self) {
        debug!(process_id = %self.info.process_id, "snapshotting process state");
        self.storage
            .save_process(
                &self.info.process_id,
                &self.info.run_id,
                ProcessSnapshot {
                    process_id: self.info.process_id.clone(),
                    run_id: self.info.run_id.clone(),
                    version: self.info.version,
                    state: self.state.clone(),
                },
            )
            .await;

        for step in &self.info.steps {
            if let Some(executor) = self.executors.get(&step.step_id) {
                let guard = executor.lock().await;
                self.storage.save_step_state(&step.step_id, &step.run_id, guard.state()).await;
                let partials = guard.edge_group_snapshot();
                drop(guard);
                if !partials.is_empty() {
                    self.storage
                        .save_step_edge_data(&step.step_id, &step.run_id, partials, true)
                        .await;
                }
            }
        }
        info!(process_id = %self.info.process_id, supersteps = self.stats.supersteps_executed(), "superstep complete");
    }
}
