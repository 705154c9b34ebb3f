//! Event routing and AllOf-join accumulation (spec §4.1, §4.2).

pub mod edge_group_processor;
pub mod message_bus;

pub use edge_group_processor::{EdgeGroupProcessor, JoinOutcome};
pub use message_bus::{EmitRequest, MessageBus, GLOBAL_ERROR_TARGET};
