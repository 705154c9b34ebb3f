//! Wire and graph data types for the process runtime.

pub mod edge;
pub mod edge_group;
pub mod event;
pub mod message;
pub mod step_info;

pub use edge::{Edge, EdgeCondition, OutputTarget, StateUpdateOp};
pub use edge_group::{EdgeGroupDef, InputMapping};
pub use event::{ProcessEvent, Visibility};
pub use message::{StepMessage, END_STEP_ID};
pub use step_info::{InnerStepType, ProcessInfo, StepInfo};
