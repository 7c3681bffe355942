use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};

use super::zmtp;
use crate::config::{publisher_host_port, Config};
use crate::flow_generator::protocol_logs::QueryObservation;
use crate::utils::queue::{Error, Receiver};
use crate::utils::stats::{Countable, Counter, CounterType, CounterValue};

#[derive(Debug, Default)]
pub struct SenderCounter {
    pub tx: AtomicU64,
    pub tx_bytes: AtomicU64,
    pub dropped: AtomicU64,
}

impl Countable for SenderCounter {
    fn get_counters(&self) -> Vec<Counter> {
        vec![
            (
                "tx",
                CounterType::Counted,
                CounterValue::Unsigned(self.tx.swap(0, Ordering::Relaxed)),
            ),
            (
                "tx-bytes",
                CounterType::Counted,
                CounterValue::Unsigned(self.tx_bytes.swap(0, Ordering::Relaxed)),
            ),
            (
                "dropped",
                CounterType::Counted,
                CounterValue::Unsigned(self.dropped.swap(0, Ordering::Relaxed)),
            ),
        ]
    }
}

pub struct UniformSenderThread {
    uniform_sender: Option<UniformSender>,
    counter: Arc<SenderCounter>,
    thread_handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl UniformSenderThread {
    pub fn new(config: &Config, input: Receiver<QueryObservation>) -> Self {
        let running = Arc::new(AtomicBool::new(false));
        let counter = Arc::new(SenderCounter::default());
        Self {
            uniform_sender: Some(UniformSender::new(
                publisher_host_port(&config.publisher_addr).to_string(),
                config.topic.clone(),
                config.verbose,
                input,
                counter.clone(),
                running.clone(),
            )),
            counter,
            thread_handle: None,
            running,
        }
    }

    pub fn counter(&self) -> &Arc<SenderCounter> {
        &self.counter
    }

    pub fn start(&mut self) {
        let Some(mut uniform_sender) = self.uniform_sender.take() else {
            return;
        };
        info!("starting uniform sender to {}", uniform_sender.addr);
        self.running.store(true, Ordering::Relaxed);
        self.thread_handle = Some(thread::spawn(move || uniform_sender.process()));
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
        info!("stopped uniform sender");
    }
}

/// Publishes observation records over a single TCP connection speaking
/// ZMTP. The connection is lazy: established on the first record, dropped
/// on any failure and retried on the next. Nothing here ever pushes back
/// on the capture path.
pub struct UniformSender {
    addr: String,
    topic: String,
    verbose: bool,

    input: Receiver<QueryObservation>,
    counter: Arc<SenderCounter>,

    stream: Option<TcpStream>,
    buffer: Vec<u8>,

    running: Arc<AtomicBool>,
}

impl UniformSender {
    const QUEUE_READ_TIMEOUT: Duration = Duration::from_secs(3);
    const TCP_WRITE_TIMEOUT: Duration = Duration::from_secs(3);
    const HANDSHAKE_READ_TIMEOUT: Duration = Duration::from_secs(3);

    fn new(
        addr: String,
        topic: String,
        verbose: bool,
        input: Receiver<QueryObservation>,
        counter: Arc<SenderCounter>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            addr,
            topic,
            verbose,
            input,
            counter,
            stream: None,
            buffer: vec![],
            running,
        }
    }

    pub fn process(&mut self) {
        while self.running.load(Ordering::Relaxed) {
            match self.input.recv(Some(Self::QUEUE_READ_TIMEOUT)) {
                Ok(observation) => self.publish(&observation),
                Err(Error::Timeout) => continue,
                Err(Error::Terminated(_)) => break,
            }
        }
        // drain whatever is already queued before exiting
        while let Ok(observation) = self.input.recv(Some(Duration::ZERO)) {
            self.publish(&observation);
        }
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn publish(&mut self, observation: &QueryObservation) {
        let payload = observation.to_wire();
        if self.verbose {
            info!("{}={}", self.topic, payload);
        }
        if self.stream.is_none() {
            self.stream = self.connect();
        }
        let Some(stream) = self.stream.as_mut() else {
            self.drop_record();
            return;
        };

        self.buffer.clear();
        zmtp::encode_publish(&mut self.buffer, self.topic.as_bytes(), payload.as_bytes());
        match stream.write_all(&self.buffer) {
            Ok(()) => {
                self.counter.tx.fetch_add(1, Ordering::Relaxed);
                self.counter
                    .tx_bytes
                    .fetch_add(self.buffer.len() as u64, Ordering::Relaxed);
            }
            Err(e) => {
                debug!("publish write failed: {}", e);
                self.stream.take();
                self.drop_record();
            }
        }
    }

    fn connect(&self) -> Option<TcpStream> {
        let stream = match TcpStream::connect(self.addr.as_str()) {
            Ok(s) => s,
            Err(e) => {
                debug!("connect to {} failed: {}", self.addr, e);
                return None;
            }
        };
        if let Err(e) = self.handshake(&stream) {
            debug!("handshake with {} failed: {}", self.addr, e);
            let _ = stream.shutdown(Shutdown::Both);
            return None;
        }
        Some(stream)
    }

    fn handshake(&self, mut stream: &TcpStream) -> std::io::Result<()> {
        stream.set_write_timeout(Some(Self::TCP_WRITE_TIMEOUT))?;
        stream.set_read_timeout(Some(Self::HANDSHAKE_READ_TIMEOUT))?;
        stream.write_all(&zmtp::greeting())?;
        let mut peer_greeting = [0u8; zmtp::GREETING_LEN];
        stream.read_exact(&mut peer_greeting)?;
        stream.write_all(&zmtp::ready_command())?;
        // peer READY: flags, short length, body; content is irrelevant here
        let mut header = [0u8; 2];
        stream.read_exact(&mut header)?;
        let mut body = vec![0u8; header[1] as usize];
        stream.read_exact(&mut body)?;
        stream.set_read_timeout(None)?;
        Ok(())
    }

    fn drop_record(&self) {
        if self.counter.dropped.load(Ordering::Relaxed) == 0 {
            warn!("publisher {} unavailable, dropping records", self.addr);
        }
        self.counter.dropped.fetch_add(1, Ordering::Relaxed);
    }
}
