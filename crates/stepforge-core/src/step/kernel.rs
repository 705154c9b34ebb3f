//! `StepKernel` — the capability every step variant implements (spec §9,
//! "deep inheritance of step variants" redesign note): a single tagged
//! trait rather than a class hierarchy. Function, map, proxy and agent
//! steps are ordinary implementors; sub-process nesting is handled
//! separately by `crate::subprocess` since it drives a whole child
//! orchestrator rather than a single call.

use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::StepContext;
use stepforge_shared::ProcessResult;

/// Whether an entry-point parameter is a plain value slot or the
/// auto-injected context capability (spec §3 glossary, "context
/// capability"). Context parameters are never stored in the input
/// template and must not appear on incoming edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Value,
    Context,
}

#[derive(Debug, Clone)]
pub struct ParamSignature {
    pub name: String,
    pub kind: ParamKind,
}

/// An invocable entry point exposed by a step kernel.
#[derive(Debug, Clone)]
pub struct EntryPointSignature {
    pub name: String,
    pub parameters: Vec<ParamSignature>,
}

impl EntryPointSignature {
    pub fn new(name: impl Into<String>, parameters: Vec<ParamSignature>) -> Self {
        Self { name: name.into(), parameters }
    }

    /// Parameter names that occupy an input-template slot.
    pub fn value_slots(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .filter(|p| p.kind == ParamKind::Value)
            .map(|p| p.name.as_str())
    }
}

/// A user-provided unit of work. Implementations are activated once,
/// invoked by entry-point name for the remainder of the process's life,
/// and disposed when the owning orchestrator shuts down.
#[async_trait]
pub trait StepKernel: Send + Sync + Debug {
    /// The entry points this kernel exposes, used to build the executor's
    /// input templates.
    fn entry_points(&self) -> Vec<EntryPointSignature>;

    /// Invoked once before the first dispatch, with the step's restored
    /// state (spec §3 Lifecycle). The default is a no-op for kernels with
    /// no activation behavior.
    async fn activate(&mut self, _restored_state: Value) -> ProcessResult<()> {
        Ok(())
    }

    /// Execute the named entry point with its resolved parameter map. The
    /// context capability is passed separately, never through `params`.
    async fn invoke(
        &mut self,
        function_name: &str,
        params: HashMap<String, Value>,
        ctx: &dyn StepContext,
    ) -> ProcessResult<Value>;

    /// Snapshot of whatever this kernel wants persisted between
    /// invocations (spec §3, "Step state is persisted after every
    /// successful invocation").
    fn state(&self) -> Value {
        Value::Null
    }

    fn dispose(&mut self) {}
}
