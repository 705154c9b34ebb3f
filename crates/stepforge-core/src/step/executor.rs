//! Per-step driver (spec §4.3): maintains each entry point's input
//! template, recognizes readiness, invokes the bound kernel, and turns the
//! result into an event. Also owns the step's local AllOf accumulator
//! (spec §5, "edge-group processors are owned by the executing step").

use std::collections::HashMap;

use serde_json::Value;
use tracing::{info, warn};

use crate::bus::edge_group_processor::{EdgeGroupProcessor, JoinOutcome};
use crate::context::StepContext;
use crate::model::edge_group::EdgeGroupDef;
use crate::model::message::StepMessage;
use crate::step::kernel::{EntryPointSignature, StepKernel};
use crate::subprocess::SubProcessRunner;
use stepforge_shared::ProcessResult;

type Template = HashMap<String, Option<Value>>;

/// Whether dispatching a message produced an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The target function is not yet invocable; slots were updated but no
    /// call was made.
    AwaitingInputs,
    /// An AllOf join is still missing contributions.
    AwaitingJoin,
    /// The function ran to completion (success or error both count —
    /// callers inspect the emitted event, not this enum, for the verdict).
    Invoked,
    /// `message.functionName` does not name a declared entry point.
    UnknownFunction,
}

/// What a `StepExecutor` drives. Sub-process steps (spec §4.4) bypass the
/// input-template/readiness machinery entirely — they have a single
/// implicit entry point driven by the raw message, not a slot map — so
/// they get their own variant rather than shoehorning into `StepKernel`.
enum Body {
    Kernel(Box<dyn StepKernel>),
    SubProcess(Box<dyn SubProcessRunner>),
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::Kernel(k) => f.debug_tuple("Kernel").field(k).finish(),
            Body::SubProcess(_) => f.write_str("SubProcess(..)"),
        }
    }
}

/// Drives one step kernel through its lifetime: activation, per-entry-point
/// readiness tracking, and invocation.
#[derive(Debug)]
pub struct StepExecutor {
    step_id: String,
    entry_points: HashMap<String, EntryPointSignature>,
    templates: HashMap<String, Template>,
    group_processor: EdgeGroupProcessor,
    body: Body,
    activated: bool,
}

impl StepExecutor {
    pub fn new(step_id: impl Into<String>, kernel: Box<dyn StepKernel>, edge_groups: Vec<EdgeGroupDef>) -> Self {
        let signatures = kernel.entry_points();
        let mut entry_points = HashMap::new();
        let mut templates = HashMap::new();
        for sig in signatures {
            let template: Template = sig.value_slots().map(|name| (name.to_string(), None)).collect();
            templates.insert(sig.name.clone(), template);
            entry_points.insert(sig.name.clone(), sig);
        }

        let mut group_processor = EdgeGroupProcessor::new();
        for def in edge_groups {
            group_processor.register(def);
        }

        Self {
            step_id: step_id.into(),
            entry_points,
            templates,
            group_processor,
            body: Body::Kernel(kernel),
            activated: false,
        }
    }

    pub fn new_subprocess(step_id: impl Into<String>, runner: Box<dyn SubProcessRunner>) -> Self {
        Self {
            step_id: step_id.into(),
            entry_points: HashMap::new(),
            templates: HashMap::new(),
            group_processor: EdgeGroupProcessor::new(),
            body: Body::SubProcess(runner),
            activated: false,
        }
    }

    pub async fn activate(&mut self, restored_state: Value) -> ProcessResult<()> {
        if self.activated {
            return Ok(());
        }
        if let Body::Kernel(kernel) = &mut self.body {
            kernel.activate(restored_state).await?;
        }
        self.activated = true;
        Ok(())
    }

    fn initial_template(&self, function_name: &str) -> Template {
        self.entry_points
            .get(function_name)
            .map(|sig| sig.value_slots().map(|name| (name.to_string(), None)).collect())
            .unwrap_or_default()
    }

    /// Merge `message` into the named entry point's slots (ordinary,
    /// non-group delivery), overwriting on name collision with a warning.
    fn merge_into_template(&mut self, function_name: &str, message: &StepMessage) {
        let template = self.templates.entry(function_name.to_string()).or_default();

        for (name, value) in &message.parameters {
            if let Some(slot) = template.get_mut(name) {
                if slot.is_some() {
                    warn!(step_id = %self.step_id, function_name, param = %name, "overwriting unconsumed input slot");
                }
                *slot = Some(value.clone());
            }
        }

        if let Some(data) = &message.data {
            if template.len() == 1 {
                if let Some(slot) = template.values_mut().next() {
                    *slot = Some(data.clone());
                }
            }
        }
    }

    fn is_invocable(&self, function_name: &str) -> bool {
        self.templates
            .get(function_name)
            .is_some_and(|t| t.values().all(|slot| slot.is_some()))
    }

    /// Resolve the group-scoped source key for an AllOf contribution
    /// (spec §4.2 step 1). Uses the plain authored step id rather than
    /// string-stripping a process-id prefix off `sourceEventId` — the
    /// qualifiedId shapes this runtime produces never carry one for
    /// step-originated events, so the stripping rule in spec.md does not
    /// apply here (see DESIGN.md).
    fn source_key(message: &StepMessage) -> String {
        let local_event = message.source_event_id.rsplit('.').next().unwrap_or(&message.source_event_id);
        format!("{}.{}", message.source_id, local_event)
    }

    /// Route a delivered message through readiness tracking (or the AllOf
    /// accumulator), invoking the kernel when ready and emitting the
    /// resulting event via `ctx`.
    pub async fn dispatch(&mut self, message: StepMessage, ctx: &dyn StepContext) -> ProcessResult<DispatchOutcome> {
        let Body::SubProcess(_) = &self.body else {
            return self.dispatch_kernel(message, ctx).await;
        };
        self.dispatch_subprocess(message, ctx).await
    }

    async fn dispatch_subprocess(&mut self, message: StepMessage, ctx: &dyn StepContext) -> ProcessResult<DispatchOutcome> {
        let Body::SubProcess(runner) = &mut self.body else {
            unreachable!("dispatch_subprocess called on a non-subprocess executor");
        };
        let function_name = message.function_name.clone();
        let result = runner.run(&message, ctx).await;
        match result {
            Ok(value) => {
                info!(step_id = %self.step_id, "sub-process invocation settled");
                ctx.emit(&format!("{function_name}.OnResult"), Some(value));
            }
            Err(err) => {
                warn!(step_id = %self.step_id, error = %err, "sub-process invocation failed");
                ctx.emit_error(&format!("{function_name}.OnError"), Some(Value::String(err.to_string())));
            }
        }
        Ok(DispatchOutcome::Invoked)
    }

    async fn dispatch_kernel(&mut self, message: StepMessage, ctx: &dyn StepContext) -> ProcessResult<DispatchOutcome> {
        let function_name = message.function_name.clone();
        if !self.entry_points.contains_key(&function_name) {
            warn!(step_id = %self.step_id, function_name, "dropping message for unknown entry point");
            return Ok(DispatchOutcome::UnknownFunction);
        }

        let params = if let Some(group_id) = message.group_id.clone() {
            let source_key = Self::source_key(&message);
            let contribution = message.data.clone().unwrap_or(Value::Null);
            match self.group_processor.observe(&group_id, &source_key, contribution) {
                JoinOutcome::Pending => return Ok(DispatchOutcome::AwaitingJoin),
                JoinOutcome::Released(merged) => merged,
            }
        } else {
            self.merge_into_template(&function_name, &message);
            if !self.is_invocable(&function_name) {
                return Ok(DispatchOutcome::AwaitingInputs);
            }
            let template = self.templates.get(&function_name).cloned().unwrap_or_default();
            template.into_iter().filter_map(|(k, v)| v.map(|v| (k, v))).collect()
        };

        let result = match &mut self.body {
            Body::Kernel(kernel) => kernel.invoke(&function_name, params, ctx).await,
            Body::SubProcess(_) => unreachable!("dispatch_kernel called on a subprocess executor"),
        };
        self.templates.insert(function_name.clone(), self.initial_template(&function_name));

        match result {
            Ok(value) => {
                info!(step_id = %self.step_id, function_name, "invocation succeeded");
                ctx.emit(&format!("{function_name}.OnResult"), Some(value));
            }
            Err(err) => {
                warn!(step_id = %self.step_id, function_name, error = %err, "invocation failed");
                ctx.emit_error(&format!("{function_name}.OnError"), Some(Value::String(err.to_string())));
            }
        }

        Ok(DispatchOutcome::Invoked)
    }

    pub fn state(&self) -> Value {
        match &self.body {
            Body::Kernel(kernel) => kernel.state(),
            Body::SubProcess(_) => Value::Null,
        }
    }

    pub fn edge_group_snapshot(&self) -> HashMap<String, HashMap<String, Value>> {
        self.group_processor.snapshot()
    }

    pub fn rehydrate_edge_group(&mut self, group_id: &str, data: HashMap<String, Value>) {
        self.group_processor.rehydrate(group_id, data);
    }

    pub fn dispose(&mut self) {
        if let Body::Kernel(kernel) = &mut self.body {
            kernel.dispose();
        }
    }
}
