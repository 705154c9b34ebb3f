//! Step kernels and the executor that drives them (spec §4.3).

pub mod executor;
pub mod kernel;

pub use executor::{DispatchOutcome, StepExecutor};
pub use kernel::{EntryPointSignature, ParamKind, ParamSignature, StepKernel};
