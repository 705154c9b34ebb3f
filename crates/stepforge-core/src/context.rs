//! The per-process resource bundle (spec §2, §9). Modeled as an immutable
//! record — identity and collaborators are fixed at construction — with
//! the one field that genuinely mutates post-construction (the outbox
//! step kernels emit into) expressed as an explicit interior-mutable
//! handle, per the redesign note on "shared mutable context objects".

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::queue::SegQueue;
use serde_json::Value;

use crate::external::ExternalChannel;
use crate::model::event::{ProcessEvent, Visibility};

/// Cooperative cancellation signal shared between an orchestrator and its
/// in-flight step invocations (spec §5).
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// The capability a step kernel receives at invocation time: event
/// emission scoped to its own namespace. Never stored in an input-template
/// slot (spec §3 glossary, "context capability").
pub trait StepContext: Send + Sync + fmt::Debug {
    fn step_id(&self) -> &str;
    fn run_id(&self) -> &str;

    /// Emit a named event in this step's namespace. Per the step
    /// authoring contract, emissions from user code are always public.
    fn emit(&self, local_event_id: &str, data: Option<Value>);

    /// Emit a named event flagged as an error.
    fn emit_error(&self, local_event_id: &str, data: Option<Value>);
}

/// The `StepContext` implementation handed to a single kernel invocation.
/// Cheap to construct; the namespace and outbox handle are the only state.
pub struct StepInvocationContext {
    step_id: String,
    run_id: String,
    namespace: String,
    outbox: Arc<SegQueue<ProcessEvent>>,
}

impl fmt::Debug for StepInvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepInvocationContext")
            .field("step_id", &self.step_id)
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

impl StepContext for StepInvocationContext {
    fn step_id(&self) -> &str {
        &self.step_id
    }

    fn run_id(&self) -> &str {
        &self.run_id
    }

    fn emit(&self, local_event_id: &str, data: Option<Value>) {
        self.outbox.push(ProcessEvent::new(
            self.step_id.clone(),
            self.namespace.clone(),
            local_event_id,
            data,
            Visibility::Public,
        ));
    }

    fn emit_error(&self, local_event_id: &str, data: Option<Value>) {
        self.outbox
            .push(ProcessEvent::error(self.step_id.clone(), self.namespace.clone(), local_event_id, data));
    }
}

/// A `StepContext` that discards every emission. Used in unit tests that
/// exercise a `StepExecutor` in isolation.
#[derive(Debug)]
pub struct NullStepContext {
    step_id: String,
    run_id: String,
}

impl NullStepContext {
    pub fn new(step_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self { step_id: step_id.into(), run_id: run_id.into() }
    }
}

impl StepContext for NullStepContext {
    fn step_id(&self) -> &str {
        &self.step_id
    }

    fn run_id(&self) -> &str {
        &self.run_id
    }

    fn emit(&self, _local_event_id: &str, _data: Option<Value>) {}

    fn emit_error(&self, _local_event_id: &str, _data: Option<Value>) {}
}

/// The resource bundle threaded through an orchestrator and its steps:
/// identity, lineage, the shared outbox, and optional collaborators.
#[derive(Clone)]
pub struct ProcessContext {
    pub process_id: String,
    pub run_id: String,
    pub root_process_id: String,
    pub parent_process_id: Option<String>,
    pub cancellation: CancellationToken,
    pub external_channel: Option<Arc<dyn ExternalChannel>>,
    event_filter: Option<Arc<dyn Fn(&ProcessEvent) -> bool + Send + Sync>>,
    outbox: Arc<SegQueue<ProcessEvent>>,
}

impl fmt::Debug for ProcessContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessContext")
            .field("process_id", &self.process_id)
            .field("run_id", &self.run_id)
            .field("root_process_id", &self.root_process_id)
            .field("parent_process_id", &self.parent_process_id)
            .finish_non_exhaustive()
    }
}

impl ProcessContext {
    pub fn root(process_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        let process_id = process_id.into();
        Self {
            root_process_id: process_id.clone(),
            process_id,
            run_id: run_id.into(),
            parent_process_id: None,
            cancellation: CancellationToken::new(),
            external_channel: None,
            event_filter: None,
            outbox: Arc::new(SegQueue::new()),
        }
    }

    pub fn with_external_channel(mut self, channel: Arc<dyn ExternalChannel>) -> Self {
        self.external_channel = Some(channel);
        self
    }

    pub fn with_event_filter(mut self, filter: Arc<dyn Fn(&ProcessEvent) -> bool + Send + Sync>) -> Self {
        self.event_filter = Some(filter);
        self
    }

    /// Build the context for a nested process (spec §4.4): inherits
    /// storage-adjacent collaborators and the root id, points
    /// `parentProcessId` at this context, and gets its own outbox.
    pub fn child(&self, process_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            process_id: process_id.into(),
            run_id: run_id.into(),
            root_process_id: self.root_process_id.clone(),
            parent_process_id: Some(self.process_id.clone()),
            cancellation: self.cancellation.clone(),
            external_channel: self.external_channel.clone(),
            event_filter: self.event_filter.clone(),
            outbox: Arc::new(SegQueue::new()),
        }
    }

    pub fn invocation_context(&self, step_id: impl Into<String>, run_id: impl Into<String>) -> StepInvocationContext {
        let step_id = step_id.into();
        let run_id = run_id.into();
        let namespace = format!("{step_id}_{run_id}");
        StepInvocationContext { step_id, run_id, namespace, outbox: self.outbox.clone() }
    }

    pub fn passes_filter(&self, event: &ProcessEvent) -> bool {
        self.event_filter.as_ref().map_or(true, |f| f(event))
    }

    /// Drain every event steps have emitted since the last drain. Called
    /// by the orchestrator after the superstep barrier (spec §5: direct
    /// enqueue paths "must serialize against the drainer").
    pub fn drain_outbox(&self) -> Vec<ProcessEvent> {
        let mut drained = Vec::new();
        while let Some(event) = self.outbox.pop() {
            drained.push(event);
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_context_sets_parent_and_keeps_root() {
        let root = ProcessContext::root("outer", "run1");
        let child = root.child("inner", "run2");
        assert_eq!(child.parent_process_id.as_deref(), Some("outer"));
        assert_eq!(child.root_process_id, "outer");
    }

    #[test]
    fn test_invocation_context_emits_into_shared_outbox() {
        let ctx = ProcessContext::root("proc", "run1");
        let step_ctx = ctx.invocation_context("Echo", "run1");
        step_ctx.emit("OnResult", Some(Value::from(1)));
        let drained = ctx.drain_outbox();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].namespace, "Echo_run1");
    }

    #[test]
    fn test_cancellation_token_observed_after_cancel() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }
}
