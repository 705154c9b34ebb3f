//! # stepforge-shared
//!
//! Cross-cutting types shared by every collaborator of the stepforge
//! process runtime: the unified error taxonomy, runtime configuration, and
//! the generic circuit breaker used to gate storage backend calls.
//!
//! This crate has no dependency on `stepforge-core` — it is the foundation
//! crate, mirroring how the teacher codebase keeps `tasker-shared`
//! independent of `tasker-orchestration`.

pub mod config;
pub mod error;
pub mod resilience;

pub use config::RuntimeConfig;
pub use error::{ProcessError, ProcessResult};
