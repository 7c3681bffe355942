use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicI64, AtomicU64, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use log::{debug, warn};
use rand::{thread_rng, Rng};

use super::flow_node::{FlowNode, FlowState};
use super::protocol_logs::sql::{
    self,
    consts::COM_QUERY,
    formatter::{Formatter, RenderContext},
    obfuscate::{self, FingerprintCache},
    Carved,
};
use super::protocol_logs::{matches_dml, operate_of, QueryObservation};
use super::TIME_BUCKETS;
use crate::common::enums::PacketDirection;
use crate::common::meta_packet::MetaPacket;
use crate::collector::QueryStatsMap;
use crate::config::Config;
use crate::utils::stats::{Countable, Counter, CounterType, CounterValue};

#[derive(Debug, Default)]
pub struct FlowCounter {
    pub rcvd: AtomicU64,
    pub rcvd_sync: AtomicU64,
    pub desyncs: AtomicU64,
    pub emitted: AtomicU64,
    pub streams: AtomicI64,
}

impl Countable for FlowCounter {
    fn get_counters(&self) -> Vec<Counter> {
        vec![
            (
                "rcvd",
                CounterType::Counted,
                CounterValue::Unsigned(self.rcvd.swap(0, Ordering::Relaxed)),
            ),
            (
                "rcvd_sync",
                CounterType::Counted,
                CounterValue::Unsigned(self.rcvd_sync.swap(0, Ordering::Relaxed)),
            ),
            (
                "desyncs",
                CounterType::Counted,
                CounterValue::Unsigned(self.desyncs.swap(0, Ordering::Relaxed)),
            ),
            (
                "emitted",
                CounterType::Counted,
                CounterValue::Unsigned(self.emitted.swap(0, Ordering::Relaxed)),
            ),
            (
                "streams",
                CounterType::Gauged,
                CounterValue::Signed(self.streams.load(Ordering::Relaxed)),
            ),
        ]
    }
}

/// Keyed store of flow state plus everything the pairing path needs.
/// Owned by a single thread; packet handling and eviction run
/// cooperatively on that owner, so no locking is involved.
pub struct FlowMap {
    nodes: Option<HashMap<String, FlowNode>>,
    formatter: Formatter,
    canonicalize: bool,
    fingerprint_cache: FingerprintCache,
    stats_map: QueryStatsMap,
    global_times: Box<[u64]>,
    service_id: String,
    tenant_id: String,
    return_to_idle: bool,
    idle_timeout: Duration,
    tick_interval: Duration,
    last_sweep: Instant,
    counter: Arc<FlowCounter>,
}

impl FlowMap {
    pub fn new(config: &Config, counter: Arc<FlowCounter>) -> Self {
        Self {
            nodes: Some(HashMap::new()),
            formatter: Formatter::compile(&config.format),
            canonicalize: config.canonicalize(),
            fingerprint_cache: obfuscate::new_cache(),
            stats_map: QueryStatsMap::new(),
            global_times: vec![0u64; TIME_BUCKETS].into_boxed_slice(),
            service_id: config.service_id.clone(),
            tenant_id: config.tenant_id.clone(),
            return_to_idle: config.return_to_idle,
            idle_timeout: config.flow_idle_timeout,
            tick_interval: config.eviction_interval,
            last_sweep: Instant::now(),
            counter,
        }
    }

    /// Runs one decoded packet through the pairing state machine. Returns
    /// an observation when this packet completes a DML pair.
    pub fn handle_packet(
        &mut self,
        packet: &MetaPacket,
        now: Instant,
    ) -> Option<QueryObservation> {
        self.counter.rcvd.fetch_add(1, Ordering::Relaxed);

        let Some(mut nodes) = self.nodes.take() else {
            warn!("flow node map unavailable");
            return None;
        };
        let key = packet.lookup_key.to_string();
        let node = nodes.entry(key.clone()).or_insert_with(|| {
            self.counter.streams.fetch_add(1, Ordering::Relaxed);
            FlowNode::new(key.clone(), packet.lookup_key.ip_string(), now)
        });
        if node.state != FlowState::Unsynced {
            self.counter.rcvd_sync.fetch_add(1, Ordering::Relaxed);
        }
        node.last_seen_at = now;

        let (observation, destroy) = match packet.direction {
            PacketDirection::ClientToServer => {
                self.handle_request(node, packet.payload, now);
                (None, false)
            }
            PacketDirection::ServerToClient => {
                self.handle_response(node, packet.payload.len(), now)
            }
        };
        if destroy {
            nodes.remove(&key);
            self.counter.streams.fetch_sub(1, Ordering::Relaxed);
        }
        self.nodes.replace(nodes);
        observation
    }

    fn handle_request(&mut self, node: &mut FlowNode, payload: &[u8], now: Instant) {
        // a request while one is in flight means the response was missed
        if node.state == FlowState::AwaitingResponse {
            self.counter.desyncs.fetch_add(1, Ordering::Relaxed);
            node.desync();
            return;
        }

        node.req_buffer.extend_from_slice(payload);
        if node.req_buffer.len() > sql::MAX_BUFFERED {
            self.counter.desyncs.fetch_add(1, Ordering::Relaxed);
            node.desync();
            return;
        }

        let (command, body, rest_start) = match sql::carve(&node.req_buffer) {
            Carved::Incomplete => {
                if node.state == FlowState::Unsynced {
                    // an unsynchronized flow only ever buffers from a
                    // request boundary
                    node.req_buffer.clear();
                }
                return;
            }
            Carved::Frame {
                command,
                body,
                rest,
            } => {
                let rest_start = node.req_buffer.len() - rest.len();
                (command, body.to_vec(), rest_start)
            }
        };

        match (node.state, command == COM_QUERY) {
            (FlowState::Unsynced, false) => {
                node.req_buffer.clear();
                return;
            }
            (FlowState::Unsynced, true) => node.state = FlowState::Idle,
            (FlowState::Idle, false) => {
                // unhandled command types leave the byte stream in an
                // unknown position
                self.counter.desyncs.fetch_add(1, Ordering::Relaxed);
                node.desync();
                return;
            }
            _ => {}
        }

        node.req_buffer.drain(..rest_start);

        let text = {
            let ctx = RenderContext {
                src: &node.client_addr,
                src_ip: &node.client_ip,
                body: &body,
            };
            let canonicalize = self.canonicalize;
            let cache = &mut self.fingerprint_cache;
            self.formatter.render(&ctx, &mut |bytes| {
                if canonicalize {
                    obfuscate::canonicalize_cached(cache, bytes)
                } else {
                    String::from_utf8_lossy(bytes).into_owned()
                }
            })
        };
        self.stats_map.on_request(&text, body.len());

        node.bucket_key = Some(text.clone());
        node.pending_fingerprint = text;
        node.pending_bytes = body.len() as u64;
        node.req_sent_at = Some(now);
        node.state = FlowState::AwaitingResponse;
    }

    fn handle_response(
        &mut self,
        node: &mut FlowNode,
        payload_len: usize,
        now: Instant,
    ) -> (Option<QueryObservation>, bool) {
        if node.state != FlowState::AwaitingResponse {
            if let Some(key) = &node.bucket_key {
                self.stats_map.on_orphan_response(key, payload_len);
            }
            return (None, false);
        }
        let Some(sent_at) = node.req_sent_at.take() else {
            return (None, false);
        };

        let latency_ns = now.saturating_duration_since(sent_at).as_nanos() as u64;
        let slot = thread_rng().gen_range(0..TIME_BUCKETS);
        node.req_times[slot] = latency_ns;
        self.global_times[slot] = latency_ns;

        let text = std::mem::take(&mut node.pending_fingerprint);
        self.stats_map.on_response(&text, payload_len, slot, latency_ns);
        let size = node.pending_bytes;
        node.pending_bytes = 0;

        let observation = if matches_dml(&text.to_lowercase()) {
            // with the default template the rendered text is
            // "<ip>:<port>:<statement>"; the statement is the third field
            let sql = text.split(':').nth(2).unwrap_or(&text).to_string();
            let operate = operate_of(&sql);
            self.counter.emitted.fetch_add(1, Ordering::Relaxed);
            Some(QueryObservation {
                service_id: self.service_id.clone(),
                tenant_id: self.tenant_id.clone(),
                sql,
                time: latency_ns as f64 / 1000.0,
                size,
                operate,
            })
        } else {
            None
        };

        if self.return_to_idle {
            node.state = FlowState::Idle;
            (observation, false)
        } else {
            (observation, true)
        }
    }

    /// Cooperative housekeeping: evicts flows idle longer than the
    /// configured timeout. Cheap to call per packet; the sweep itself runs
    /// at most once per tick interval.
    pub fn tick(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_sweep) < self.tick_interval {
            return;
        }
        self.last_sweep = now;
        let Some(nodes) = self.nodes.as_mut() else {
            return;
        };
        let before = nodes.len();
        let idle_timeout = self.idle_timeout;
        nodes.retain(|_, node| now.saturating_duration_since(node.last_seen_at) < idle_timeout);
        let evicted = before - nodes.len();
        if evicted > 0 {
            self.counter.streams.fetch_sub(evicted as i64, Ordering::Relaxed);
            debug!("evicted {} idle flows", evicted);
        }
    }

    pub fn flow_count(&self) -> usize {
        self.nodes.as_ref().map(|n| n.len()).unwrap_or(0)
    }

    pub fn report(&self) -> Vec<String> {
        let mut lines = vec![];
        if let Some(summary) = crate::collector::summarize_latency(&self.global_times) {
            lines.push(format!("overall {}", summary));
        }
        lines.extend(self.stats_map.report());
        lines
    }

    #[cfg(test)]
    fn state_of(&self, key: &str) -> Option<FlowState> {
        self.nodes.as_ref().unwrap().get(key).map(|n| n.state)
    }
}
