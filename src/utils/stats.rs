use std::fmt::Write as _;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::info;

#[derive(Clone, Copy, Debug)]
pub enum CounterType {
    Counted,
    Gauged,
}

#[derive(Clone, Copy, Debug)]
pub enum CounterValue {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
}

pub type Counter = (&'static str, CounterType, CounterValue);

pub trait Countable: Send + Sync {
    fn get_counters(&self) -> Vec<Counter>;

    fn closed(&self) -> bool {
        false
    }
}

struct Source {
    module: &'static str,
    countable: Weak<dyn Countable>,
}

/// Periodically snapshots registered counters and emits them as log lines.
/// Sources are held weakly; a dropped or closed source is unregistered on
/// the next collection pass.
pub struct Collector {
    interval: Duration,
    sources: Arc<Mutex<Vec<Source>>>,
    running: Arc<(Mutex<bool>, Condvar)>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Collector {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            sources: Arc::new(Mutex::new(vec![])),
            running: Arc::new((Mutex::new(false), Condvar::new())),
            thread: Mutex::new(None),
        }
    }

    pub fn register(&self, module: &'static str, countable: &Arc<dyn Countable>) {
        self.sources.lock().unwrap().push(Source {
            module,
            countable: Arc::downgrade(countable),
        });
    }

    pub fn start(&self) {
        {
            let (started, _) = &*self.running;
            let mut started = started.lock().unwrap();
            if *started {
                return;
            }
            *started = true;
        }
        let sources = self.sources.clone();
        let running = self.running.clone();
        let interval = self.interval;
        self.thread
            .lock()
            .unwrap()
            .replace(thread::spawn(move || loop {
                {
                    let (running, stopped) = &*running;
                    let guard = running.lock().unwrap();
                    if !*guard {
                        break;
                    }
                    let (guard, _) = stopped.wait_timeout(guard, interval).unwrap();
                    if !*guard {
                        break;
                    }
                }
                let mut sources = sources.lock().unwrap();
                sources.retain(|s| match s.countable.upgrade() {
                    Some(c) => !c.closed(),
                    None => false,
                });
                for source in sources.iter() {
                    let Some(countable) = source.countable.upgrade() else {
                        continue;
                    };
                    let counters = countable.get_counters();
                    if counters.is_empty() {
                        continue;
                    }
                    let mut line = format!("stats [{}]", source.module);
                    for (name, _, value) in counters {
                        match value {
                            CounterValue::Signed(v) => write!(line, " {}={}", name, v).unwrap(),
                            CounterValue::Unsigned(v) => write!(line, " {}={}", name, v).unwrap(),
                            CounterValue::Float(v) => write!(line, " {}={:.3}", name, v).unwrap(),
                        }
                    }
                    info!("{}", line);
                }
            }));
    }

    pub fn stop(&self) {
        {
            let (running, stopped) = &*self.running;
            let mut guard = running.lock().unwrap();
            if !*guard {
                return;
            }
            *guard = false;
            stopped.notify_all();
        }
        if let Some(handle) = self.thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    struct Fixed(AtomicU64);

    impl Countable for Fixed {
        fn get_counters(&self) -> Vec<Counter> {
            vec![(
                "value",
                CounterType::Counted,
                CounterValue::Unsigned(self.0.swap(0, Ordering::Relaxed)),
            )]
        }
    }

    #[test]
    fn dropped_sources_are_unregistered() {
        let collector = Collector::new(Duration::from_millis(10));
        let countable: Arc<dyn Countable> = Arc::new(Fixed(AtomicU64::new(3)));
        collector.register("fixed", &countable);
        assert_eq!(collector.sources.lock().unwrap().len(), 1);
        drop(countable);
        collector.start();
        thread::sleep(Duration::from_millis(50));
        collector.stop();
        assert_eq!(collector.sources.lock().unwrap().len(), 0);
    }
}
