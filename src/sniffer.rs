use std::sync::Arc;

use log::info;

use crate::config::Config;
use crate::dispatcher::recv_engine::AfPacketEngine;
use crate::dispatcher::{Dispatcher, PacketCounter};
use crate::error::Result;
use crate::flow_generator::{FlowCounter, FlowMap};
use crate::sender::UniformSenderThread;
use crate::utils::queue;
use crate::utils::stats::{Collector, Countable};

/// The assembled agent: capture dispatcher, publisher and stats threads,
/// wired through a bounded queue. Construction opens the capture device;
/// failures there abort startup.
pub struct Sniffer {
    dispatcher: Dispatcher,
    sender: UniformSenderThread,
    stats: Collector,
    counters: Vec<Arc<dyn Countable>>,
}

impl Sniffer {
    pub fn start(config: Config) -> Result<Sniffer> {
        info!(
            "initializing capture on {} with filter '{}'",
            config.interface,
            config.capture_filter()
        );
        let engine = AfPacketEngine::new(
            &config.interface,
            config.port,
            config.capture_read_timeout,
        )?;

        let (tx, rx) = queue::bounded(config.sender_queue_size);
        let queue_counter: Arc<dyn Countable> = Arc::new(tx.counter());

        let flow_counter = Arc::new(FlowCounter::default());
        let flow_map = FlowMap::new(&config, flow_counter.clone());
        let packet_counter = Arc::new(PacketCounter::default());
        let dispatcher = Dispatcher::new(
            Box::new(engine),
            flow_map,
            config.port,
            tx,
            packet_counter.clone(),
        );

        info!(
            "publishing to {} under topic {}",
            config.publisher_addr, config.topic
        );
        let mut sender = UniformSenderThread::new(&config, rx);
        let sender_counter: Arc<dyn Countable> = sender.counter().clone();

        let stats = Collector::new(config.stats_interval);
        let flow_countable: Arc<dyn Countable> = flow_counter;
        let packet_countable: Arc<dyn Countable> = packet_counter;
        stats.register("dispatcher", &packet_countable);
        stats.register("flow_map", &flow_countable);
        stats.register("sender", &sender_counter);
        stats.register("sender_queue", &queue_counter);

        sender.start();
        dispatcher.start();
        stats.start();

        Ok(Self {
            dispatcher,
            sender,
            stats,
            counters: vec![
                packet_countable,
                flow_countable,
                sender_counter,
                queue_counter,
            ],
        })
    }

    /// Orderly shutdown: stop pulling packets first, then let the sender
    /// drain what is already queued.
    pub fn stop(mut self) {
        self.dispatcher.stop();
        self.sender.stop();
        self.stats.stop();
        info!("gracefully stopped");
    }
}
