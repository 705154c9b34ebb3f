//! # stepforge-core
//!
//! A Pregel-style declarative process orchestration runtime: a graph of
//! steps connected by conditioned edges, driven to completion one
//! superstep at a time. See `model` for the graph's wire types, `bus` for
//! event routing and AllOf-join accumulation, `step` for the per-step
//! driver, `orchestrator` for the superstep loop itself, and `handle` for
//! the external facade.

pub mod bus;
pub mod context;
pub mod external;
pub mod handle;
pub mod model;
pub mod orchestrator;
pub mod registry;
pub mod statistics;
pub mod step;
pub mod storage;
pub mod subprocess;

pub use context::{CancellationToken, ProcessContext, StepContext, StepInvocationContext};
pub use external::{ExternalChannel, NullExternalChannel};
pub use handle::ProcessHandle;
pub use orchestrator::{ProcessOrchestrator, RunMode, TerminationReason};
pub use registry::{KernelFactory, StepRegistry};
pub use statistics::{OrchestrationStatistics, StatisticsSnapshot};
pub use step::{DispatchOutcome, EntryPointSignature, ParamKind, ParamSignature, StepExecutor, StepKernel};
pub use subprocess::{NestedProcessRunner, SubProcessRunner};
