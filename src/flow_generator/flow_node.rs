use std::time::Instant;

use super::TIME_BUCKETS;

/// Pairing progress of one flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    /// Capture started mid-conversation; nothing may be emitted until a
    /// fresh request boundary is observed.
    Unsynced,
    /// Synchronized, no request in flight.
    Idle,
    /// A request was carved; the next server payload completes the pair.
    AwaitingResponse,
}

/// Per-flow state. Created on the first packet of a client connection,
/// destroyed after an emitted pair or by idle eviction.
pub struct FlowNode {
    pub client_addr: String,
    pub client_ip: String,
    pub state: FlowState,
    /// Unconsumed client-side bytes from partial frames.
    pub req_buffer: Vec<u8>,
    pub req_sent_at: Option<Instant>,
    pub pending_fingerprint: String,
    pub pending_bytes: u64,
    /// Aggregation bucket of the last rendered request; outlives the
    /// pending pair so stray response bytes still count.
    pub bucket_key: Option<String>,
    pub last_seen_at: Instant,
    pub req_times: Box<[u64]>,
}

impl FlowNode {
    pub fn new(client_addr: String, client_ip: String, now: Instant) -> Self {
        Self {
            client_addr,
            client_ip,
            state: FlowState::Unsynced,
            req_buffer: vec![],
            req_sent_at: None,
            pending_fingerprint: String::new(),
            pending_bytes: 0,
            bucket_key: None,
            last_seen_at: now,
            req_times: vec![0u64; TIME_BUCKETS].into_boxed_slice(),
        }
    }

    /// Frame boundaries are lost: drop buffered bytes and any pending pair,
    /// and require a fresh request boundary before emitting again.
    pub fn desync(&mut self) {
        self.req_buffer.clear();
        self.req_sent_at = None;
        self.pending_fingerprint.clear();
        self.pending_bytes = 0;
        self.state = FlowState::Unsynced;
    }
}
