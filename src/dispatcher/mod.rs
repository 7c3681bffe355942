pub mod recv_engine;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{debug, info, warn};

use recv_engine::{RecvEngine, RecvError};

use crate::common::meta_packet::MetaPacket;
use crate::flow_generator::error::Error as FlowError;
use crate::flow_generator::protocol_logs::QueryObservation;
use crate::flow_generator::FlowMap;
use crate::utils::queue::Sender;
use crate::utils::stats::{Countable, Counter, CounterType, CounterValue};

#[derive(Debug, Default)]
pub struct PacketCounter {
    pub rx: AtomicU64,
    pub rx_bytes: AtomicU64,
    pub invalid_packets: AtomicU64,
    pub unexpected_ports: AtomicU64,
    pub output_dropped: AtomicU64,
}

impl Countable for PacketCounter {
    fn get_counters(&self) -> Vec<Counter> {
        vec![
            (
                "rx",
                CounterType::Counted,
                CounterValue::Unsigned(self.rx.swap(0, Ordering::Relaxed)),
            ),
            (
                "rx_bytes",
                CounterType::Counted,
                CounterValue::Unsigned(self.rx_bytes.swap(0, Ordering::Relaxed)),
            ),
            (
                "invalid_packets",
                CounterType::Counted,
                CounterValue::Unsigned(self.invalid_packets.swap(0, Ordering::Relaxed)),
            ),
            (
                "unexpected_ports",
                CounterType::Counted,
                CounterValue::Unsigned(self.unexpected_ports.swap(0, Ordering::Relaxed)),
            ),
            (
                "output_dropped",
                CounterType::Counted,
                CounterValue::Unsigned(self.output_dropped.swap(0, Ordering::Relaxed)),
            ),
        ]
    }
}

struct Pipeline {
    engine: Box<dyn RecvEngine>,
    flow_map: FlowMap,
    server_port: u16,
    output: Sender<QueryObservation>,
    counter: Arc<PacketCounter>,
    terminated: Arc<AtomicBool>,
}

impl Pipeline {
    fn run(&mut self) {
        while !self.terminated.load(Ordering::Relaxed) {
            match self.engine.recv() {
                Ok(frame) => {
                    self.counter.rx.fetch_add(1, Ordering::Relaxed);
                    self.counter
                        .rx_bytes
                        .fetch_add(frame.len() as u64, Ordering::Relaxed);
                    let now = Instant::now();
                    match MetaPacket::decode(frame, self.server_port) {
                        Ok(packet) => {
                            if let Some(observation) = self.flow_map.handle_packet(&packet, now) {
                                if self.output.send(observation).is_err() {
                                    self.counter
                                        .output_dropped
                                        .fetch_add(1, Ordering::Relaxed);
                                }
                            }
                        }
                        // empty segments (pure acks) are expected, not an error
                        Err(FlowError::ZeroPayloadLen) => {}
                        Err(FlowError::UnexpectedPorts { src, dst }) => {
                            self.counter.unexpected_ports.fetch_add(1, Ordering::Relaxed);
                            debug!("dropping packet with ports {}/{}", src, dst);
                        }
                        Err(e) => {
                            self.counter.invalid_packets.fetch_add(1, Ordering::Relaxed);
                            debug!("dropping undecodable packet: {}", e);
                        }
                    }
                }
                Err(RecvError::Timeout) => {}
                Err(RecvError::Terminated) => break,
                Err(RecvError::Io(e)) => {
                    warn!("capture receive failed: {}", e);
                    break;
                }
            }
            self.flow_map.tick(Instant::now());
        }
        self.engine.close();
    }
}

/// Owns the capture-to-observation pipeline on its own thread. Everything
/// stateful (flow table, aggregation, latency slots) lives inside and is
/// only ever touched from that thread.
pub struct Dispatcher {
    pipeline: Mutex<Option<Pipeline>>,
    terminated: Arc<AtomicBool>,
    running: AtomicBool,
    handle: Mutex<Option<JoinHandle<Pipeline>>>,
}

impl Dispatcher {
    pub fn new(
        engine: Box<dyn RecvEngine>,
        flow_map: FlowMap,
        server_port: u16,
        output: Sender<QueryObservation>,
        counter: Arc<PacketCounter>,
    ) -> Self {
        let terminated = Arc::new(AtomicBool::new(false));
        Self {
            pipeline: Mutex::new(Some(Pipeline {
                engine,
                flow_map,
                server_port,
                output,
                counter,
                terminated: terminated.clone(),
            })),
            terminated,
            running: AtomicBool::new(false),
            handle: Mutex::new(None),
        }
    }

    pub fn start(&self) {
        if self.running.swap(true, Ordering::Relaxed) {
            return;
        }
        let Some(mut pipeline) = self.pipeline.lock().unwrap().take() else {
            return;
        };
        info!("starting dispatcher");
        self.handle.lock().unwrap().replace(thread::spawn(move || {
            pipeline.run();
            pipeline
        }));
    }

    /// Stops the capture loop and logs the aggregated per-fingerprint
    /// summary collected over the run.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::Relaxed) {
            return;
        }
        self.terminated.store(true, Ordering::Relaxed);
        let Some(handle) = self.handle.lock().unwrap().take() else {
            return;
        };
        match handle.join() {
            Ok(pipeline) => {
                for line in pipeline.flow_map.report() {
                    info!("summary {}", line);
                }
                self.pipeline.lock().unwrap().replace(pipeline);
            }
            Err(_) => warn!("dispatcher thread panicked"),
        }
        info!("stopped dispatcher");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::recv_engine::VecEngine;
    use super::*;
    use crate::common::meta_packet::tests::build_frame;
    use crate::config::Config;
    use crate::flow_generator::protocol_logs::sql::consts::COM_QUERY;
    use crate::flow_generator::FlowCounter;
    use crate::utils::queue;

    const SERVER: [u8; 4] = [10, 0, 0, 1];
    const CLIENT: [u8; 4] = [10, 0, 0, 2];

    fn query_payload(sql: &str) -> Vec<u8> {
        let body_len = sql.len() + 1;
        let mut payload = vec![
            (body_len & 0xff) as u8,
            ((body_len >> 8) & 0xff) as u8,
            ((body_len >> 16) & 0xff) as u8,
            0,
            COM_QUERY,
        ];
        payload.extend_from_slice(sql.as_bytes());
        payload
    }

    #[test]
    fn replayed_conversation_reaches_the_queue() {
        let frames = vec![
            build_frame(CLIENT, 50000, SERVER, 3306, &query_payload("SELECT 1")),
            build_frame(SERVER, 3306, CLIENT, 50000, b"resultset"),
            // unrelated traffic is logged and dropped
            build_frame(CLIENT, 50000, SERVER, 8080, b"noise"),
        ];
        let config = Config::default();
        let flow_map = FlowMap::new(&config, Arc::new(FlowCounter::default()));
        let (tx, rx) = queue::bounded(16);
        let counter = Arc::new(PacketCounter::default());
        let dispatcher = Dispatcher::new(
            Box::new(VecEngine::new(frames)),
            flow_map,
            3306,
            tx,
            counter.clone(),
        );
        dispatcher.start();
        let observation = rx.recv(Some(Duration::from_secs(5))).unwrap();
        assert_eq!(observation.sql, "SELECT ?");
        assert_eq!(observation.operate, "select");
        dispatcher.stop();
        assert_eq!(counter.unexpected_ports.load(Ordering::Relaxed), 1);
        assert_eq!(counter.rx.load(Ordering::Relaxed), 3);
    }
}
