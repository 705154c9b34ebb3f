//! `StepRegistry` — maps a step id to a kernel factory (spec §2, §4.5:
//! "steps are materialized lazily on first use from the registry").

use std::collections::HashMap;
use std::sync::Arc;

use stepforge_shared::{ProcessError, ProcessResult};

use crate::step::kernel::StepKernel;

pub type KernelFactory = Arc<dyn Fn() -> Box<dyn StepKernel> + Send + Sync>;

/// Constructs fresh kernel instances by step id. Registration happens once
/// at process-definition build time (out of scope here); the orchestrator
/// only reads from it.
#[derive(Clone, Default)]
pub struct StepRegistry {
    factories: HashMap<String, KernelFactory>,
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRegistry")
            .field("registered_steps", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, step_id: impl Into<String>, factory: KernelFactory) {
        self.factories.insert(step_id.into(), factory);
    }

    pub fn instantiate(&self, step_id: &str) -> ProcessResult<Box<dyn StepKernel>> {
        let factory = self
            .factories
            .get(step_id)
            .ok_or_else(|| ProcessError::not_found("step kernel", step_id))?;
        Ok(factory())
    }

    pub fn contains(&self, step_id: &str) -> bool {
        self.factories.contains_key(step_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{NullStepContext, StepContext};
    use crate::step::kernel::EntryPointSignature;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::HashMap as Map;

    #[derive(Debug)]
    struct NoOpKernel;

    #[async_trait]
    impl StepKernel for NoOpKernel {
        fn entry_points(&self) -> Vec<EntryPointSignature> {
            vec![]
        }

        async fn invoke(&mut self, _f: &str, _p: Map<String, Value>, _ctx: &dyn StepContext) -> ProcessResult<Value> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_instantiate_unknown_step_errors() {
        let registry = StepRegistry::new();
        assert!(registry.instantiate("missing").is_err());
    }

    #[tokio::test]
    async fn test_registered_factory_produces_fresh_kernels() {
        let mut registry = StepRegistry::new();
        registry.register("A", Arc::new(|| Box::new(NoOpKernel) as Box<dyn StepKernel>));
        let mut kernel = registry.instantiate("A").unwrap();
        let ctx = NullStepContext::new("A", "run1");
        let result = kernel.invoke("noop", Map::new(), &ctx).await.unwrap();
        assert_eq!(result, Value::Null);
    }
}
