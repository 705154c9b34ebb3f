//! Sub-process step bodies (spec §4.4): a step whose entry point is itself
//! a nested `ProcessInfo`. `StepExecutor::dispatch_subprocess` hands the raw
//! message straight to a `SubProcessRunner` rather than the slot-template
//! machinery, since the synthetic initial event is built from
//! `targetEventId`/`data`, not merged parameters.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use stepforge_shared::config::ExecutionConfig;
use stepforge_shared::ProcessResult;

use crate::context::{ProcessContext, StepContext};
use crate::model::event::{ProcessEvent, Visibility};
use crate::model::message::StepMessage;
use crate::model::step_info::ProcessInfo;
use crate::orchestrator::{ProcessOrchestrator, RunMode};
use crate::registry::StepRegistry;
use crate::storage::StorageManager;

/// Runs a message against a nested process instance. Separated from
/// `StepKernel` because a sub-process step has no fixed set of declared
/// entry points to merge parameters against — the message carries its own
/// target event directly.
#[async_trait]
pub trait SubProcessRunner: Send + Sync + fmt::Debug {
    async fn run(&mut self, message: &StepMessage, ctx: &dyn StepContext) -> ProcessResult<Value>;
}

/// The reference `SubProcessRunner`: owns the nested `ProcessInfo` and
/// drives a fresh child `ProcessOrchestrator` to quiescence per invocation.
pub struct NestedProcessRunner {
    process: ProcessInfo,
    registry: Arc<StepRegistry>,
    storage: Arc<StorageManager>,
    execution: ExecutionConfig,
    parent_context: ProcessContext,
}

impl fmt::Debug for NestedProcessRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedProcessRunner")
            .field("process_id", &self.process.process_id)
            .finish_non_exhaustive()
    }
}

impl NestedProcessRunner {
    pub fn new(
        process: ProcessInfo,
        registry: Arc<StepRegistry>,
        storage: Arc<StorageManager>,
        execution: ExecutionConfig,
        parent_context: ProcessContext,
    ) -> Self {
        Self { process, registry, storage, execution, parent_context }
    }
}

#[async_trait]
impl SubProcessRunner for NestedProcessRunner {
    async fn run(&mut self, message: &StepMessage, ctx: &dyn StepContext) -> ProcessResult<Value> {
        let child_process_id = format!("{}/{}", self.parent_context.process_id, ctx.step_id());
        let child_run_id = ctx.run_id().to_string();
        let child_context = self.parent_context.child(child_process_id.clone(), child_run_id.clone());

        let mut child = ProcessOrchestrator::new(
            self.process.clone(),
            child_context,
            self.registry.clone(),
            self.storage.clone(),
            self.execution.clone(),
        );

        let local_event_id = message.target_event_id.clone().unwrap_or_else(|| "Start".to_string());
        let initial = ProcessEvent::new(
            self.process.process_id.clone(),
            self.process.process_id.clone(),
            local_event_id,
            message.data.clone(),
            Visibility::Internal,
        );

        let reason = child.run(Some(initial), RunMode::OneShot, None).await?;
        debug!(child_process_id = %child_process_id, ?reason, "nested process settled");

        for event in child.take_forwardable() {
            if event.is_error {
                ctx.emit_error(&event.local_event_id, event.data);
            } else {
                ctx.emit(&event.local_event_id, event.data);
            }
        }

        Ok(child.state_snapshot().state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NullStepContext;
    use crate::model::step_info::{InnerStepType, StepInfo};
    use crate::step::kernel::{EntryPointSignature, StepKernel};
    use async_trait::async_trait as at;
    use serde_json::json;
    use std::collections::HashMap;

    #[derive(Debug)]
    struct EchoKernel;

    #[at]
    impl StepKernel for EchoKernel {
        fn entry_points(&self) -> Vec<EntryPointSignature> {
            vec![EntryPointSignature::new("Run", vec![])]
        }

        async fn invoke(
            &mut self,
            _function_name: &str,
            _params: HashMap<String, Value>,
            ctx: &dyn StepContext,
        ) -> ProcessResult<Value> {
            ctx.emit("Done", Some(json!("inner")));
            Ok(Value::Null)
        }
    }

    fn child_process() -> ProcessInfo {
        let step = StepInfo::new("Inner", "run1", InnerStepType::Function);
        ProcessInfo::new("child_proc", "run1").with_step(step)
    }

    #[tokio::test]
    async fn test_nested_runner_drains_forwardable_public_events() {
        let mut registry = StepRegistry::new();
        registry.register("Inner", Arc::new(|| Box::new(EchoKernel) as Box<dyn StepKernel>));

        let mut runner = NestedProcessRunner::new(
            child_process(),
            Arc::new(registry),
            Arc::new(StorageManager::new(Arc::new(crate::storage::InMemoryStorageBackend::default()))),
            ExecutionConfig::default(),
            ProcessContext::root("outer", "run1"),
        );

        let message = StepMessage {
            source_id: "external".to_string(),
            destination_id: "SubStep".to_string(),
            function_name: "Run".to_string(),
            source_event_id: "outer.Start".to_string(),
            target_event_id: Some("child_proc.Start".to_string()),
            data: None,
            parameters: HashMap::new(),
            group_id: None,
            thread_id: None,
        };
        let ctx = NullStepContext::new("SubStep", "run1");
        let result = runner.run(&message, &ctx).await;
        assert!(result.is_ok());
    }
}
