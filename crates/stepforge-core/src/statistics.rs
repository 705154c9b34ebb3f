//! `OrchestrationStatistics` — run counters surfaced through
//! `ProcessHandle::getState` for observability. Not named in spec.md's
//! data model; an ambient addition (see SPEC_FULL.md "Orchestration
//! statistics").

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::step::executor::DispatchOutcome;

#[derive(Debug, Default)]
struct Counters {
    supersteps_executed: AtomicU64,
    messages_dispatched: AtomicU64,
    messages_awaiting_inputs: AtomicU64,
    messages_awaiting_join: AtomicU64,
    messages_dropped_unknown_function: AtomicU64,
    dispatch_errors: AtomicU64,
    unrouted_errors: AtomicU64,
}

/// Cheaply cloneable handle onto a shared set of run counters.
#[derive(Debug, Clone, Default)]
pub struct OrchestrationStatistics {
    counters: Arc<Counters>,
}

/// Point-in-time read of every counter, for `ProcessHandle::getState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatisticsSnapshot {
    pub supersteps_executed: u64,
    pub messages_dispatched: u64,
    pub messages_awaiting_inputs: u64,
    pub messages_awaiting_join: u64,
    pub messages_dropped_unknown_function: u64,
    pub dispatch_errors: u64,
    pub unrouted_errors: u64,
}

impl OrchestrationStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_superstep(&self) {
        self.counters.supersteps_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch_outcome(&self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Invoked => {
                self.counters.messages_dispatched.fetch_add(1, Ordering::Relaxed);
            }
            DispatchOutcome::AwaitingInputs => {
                self.counters.messages_awaiting_inputs.fetch_add(1, Ordering::Relaxed);
            }
            DispatchOutcome::AwaitingJoin => {
                self.counters.messages_awaiting_join.fetch_add(1, Ordering::Relaxed);
            }
            DispatchOutcome::UnknownFunction => {
                self.counters.messages_dropped_unknown_function.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_dispatch_error(&self) {
        self.counters.dispatch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unrouted_errors(&self, count: usize) {
        self.counters.unrouted_errors.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn supersteps_executed(&self) -> u64 {
        self.counters.supersteps_executed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            supersteps_executed: self.counters.supersteps_executed.load(Ordering::Relaxed),
            messages_dispatched: self.counters.messages_dispatched.load(Ordering::Relaxed),
            messages_awaiting_inputs: self.counters.messages_awaiting_inputs.load(Ordering::Relaxed),
            messages_awaiting_join: self.counters.messages_awaiting_join.load(Ordering::Relaxed),
            messages_dropped_unknown_function: self.counters.messages_dropped_unknown_function.load(Ordering::Relaxed),
            dispatch_errors: self.counters.dispatch_errors.load(Ordering::Relaxed),
            unrouted_errors: self.counters.unrouted_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = OrchestrationStatistics::new();
        stats.record_superstep();
        stats.record_dispatch_outcome(&DispatchOutcome::Invoked);
        stats.record_dispatch_outcome(&DispatchOutcome::AwaitingInputs);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.supersteps_executed, 1);
        assert_eq!(snapshot.messages_dispatched, 1);
        assert_eq!(snapshot.messages_awaiting_inputs, 1);
    }

    #[test]
    fn test_clone_shares_counters() {
        let stats = OrchestrationStatistics::new();
        let clone = stats.clone();
        clone.record_superstep();
        assert_eq!(stats.supersteps_executed(), 1);
    }
}
