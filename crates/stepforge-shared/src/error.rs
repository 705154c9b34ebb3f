//! # Process Runtime Error Types
//!
//! Unified error handling for the orchestrator, message bus, and their
//! collaborators. Error kinds follow the taxonomy the runtime distinguishes
//! internally: dispatch errors, user-step errors, storage errors, and
//! configuration errors (the last being the only kind fatal at construction
//! time).

use thiserror::Error;
use uuid::Uuid;

/// Process runtime result type.
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Comprehensive error types for orchestrator operations.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Destination step not found, function not found, or a message was
    /// otherwise malformed. Non-fatal: reported via an `OnError` event.
    #[error("dispatch error for step {step_id}: {reason}")]
    Dispatch { step_id: String, reason: String },

    /// A user-authored step function returned or raised an error.
    #[error("step {step_id}.{function_name} failed: {message}")]
    UserStep {
        step_id: String,
        function_name: String,
        message: String,
    },

    /// Storage backend failure. Callers treat these as non-fatal: a read
    /// failure behaves as if the key were absent, a write failure is a
    /// no-op (see `StorageManager`).
    #[error("storage error during {operation}: {reason}")]
    Storage { operation: String, reason: String },

    /// Missing required edges, unknown step types, or other malformed
    /// process definitions. Fatal at orchestrator construction.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A step, edge group, or process referenced by id could not be found.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The orchestrator was asked to do something after it had already
    /// terminated or been cancelled.
    #[error("orchestrator for process {process_id} is no longer running")]
    NotRunning { process_id: Uuid },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProcessError {
    pub fn dispatch(step_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Dispatch {
            step_id: step_id.into(),
            reason: reason.into(),
        }
    }

    pub fn user_step(
        step_id: impl Into<String>,
        function_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::UserStep {
            step_id: step_id.into(),
            function_name: function_name.into(),
            message: message.into(),
        }
    }

    pub fn storage(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Whether a caller driving a superstep loop should treat this as fatal
    /// to the whole process, versus something that can be routed to the
    /// global-error edge and swallowed.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::NotRunning { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_constructor() {
        let err = ProcessError::dispatch("echo", "function not found");
        match err {
            ProcessError::Dispatch { step_id, reason } => {
                assert_eq!(step_id, "echo");
                assert_eq!(reason, "function not found");
            }
            _ => panic!("expected Dispatch variant"),
        }
    }

    #[test]
    fn test_display_user_step() {
        let err = ProcessError::user_step("repeat", "Repeat", "boom");
        assert_eq!(format!("{err}"), "step repeat.Repeat failed: boom");
    }

    #[test]
    fn test_configuration_is_fatal() {
        let err = ProcessError::configuration("missing global error edge");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_dispatch_is_not_fatal() {
        let err = ProcessError::dispatch("echo", "unknown function");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_not_found_display() {
        let err = ProcessError::not_found("step", "Repeat");
        assert_eq!(format!("{err}"), "step not found: Repeat");
    }
}
