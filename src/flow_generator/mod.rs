pub mod error;
mod flow_map;
mod flow_node;
pub mod protocol_logs;

pub use flow_map::{FlowCounter, FlowMap};
pub use flow_node::{FlowNode, FlowState};

/// Fixed number of latency slots per sample array. Each measured latency
/// overwrites a uniformly random slot, trading fidelity for a hard memory
/// bound.
pub const TIME_BUCKETS: usize = 10_000;
