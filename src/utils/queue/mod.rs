use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Condvar, Mutex,
};
use std::time::Duration;

use crate::utils::stats::{Countable, Counter, CounterType, CounterValue};

#[derive(Debug, PartialEq)]
pub enum Error<T> {
    Timeout,
    Terminated(Option<T>),
}

struct Shared<T> {
    queue: Mutex<State<T>>,
    not_empty: Condvar,
    overwritten: AtomicU64,
    enqueued: AtomicU64,
}

struct State<T> {
    items: VecDeque<T>,
    capacity: usize,
    terminated: bool,
}

/// Bounded queue that sheds load on the producer side: when full, the
/// oldest entry is overwritten instead of blocking the sender.
pub fn bounded<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let shared = Arc::new(Shared {
        queue: Mutex::new(State {
            items: VecDeque::with_capacity(capacity),
            capacity,
            terminated: false,
        }),
        not_empty: Condvar::new(),
        overwritten: AtomicU64::new(0),
        enqueued: AtomicU64::new(0),
    });
    (Sender(shared.clone()), Receiver(shared))
}

pub struct Sender<T>(Arc<Shared<T>>);

impl<T> Sender<T> {
    pub fn send(&self, item: T) -> Result<(), Error<T>> {
        let mut state = self.0.queue.lock().unwrap();
        if state.terminated {
            return Err(Error::Terminated(Some(item)));
        }
        if state.items.len() >= state.capacity {
            state.items.pop_front();
            self.0.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        state.items.push_back(item);
        self.0.enqueued.fetch_add(1, Ordering::Relaxed);
        drop(state);
        self.0.not_empty.notify_one();
        Ok(())
    }

    pub fn terminate(&self) {
        self.0.queue.lock().unwrap().terminated = true;
        self.0.not_empty.notify_all();
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        self.terminate();
    }
}

pub struct Receiver<T>(Arc<Shared<T>>);

impl<T> Receiver<T> {
    pub fn recv(&self, timeout: Option<Duration>) -> Result<T, Error<T>> {
        let mut state = self.0.queue.lock().unwrap();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Ok(item);
            }
            if state.terminated {
                return Err(Error::Terminated(None));
            }
            match timeout {
                Some(d) => {
                    let (guard, result) = self.0.not_empty.wait_timeout(state, d).unwrap();
                    state = guard;
                    if result.timed_out() && state.items.is_empty() {
                        if state.terminated {
                            return Err(Error::Terminated(None));
                        }
                        return Err(Error::Timeout);
                    }
                }
                None => state = self.0.not_empty.wait(state).unwrap(),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.0.queue.lock().unwrap().items.len()
    }
}

pub struct QueueCounter<T>(Arc<Shared<T>>);

impl<T> Sender<T> {
    pub fn counter(&self) -> QueueCounter<T> {
        QueueCounter(self.0.clone())
    }
}

impl<T: Send> Countable for QueueCounter<T> {
    fn get_counters(&self) -> Vec<Counter> {
        vec![
            (
                "enqueued",
                CounterType::Counted,
                CounterValue::Unsigned(self.0.enqueued.swap(0, Ordering::Relaxed)),
            ),
            (
                "overwritten",
                CounterType::Counted,
                CounterValue::Unsigned(self.0.overwritten.swap(0, Ordering::Relaxed)),
            ),
        ]
    }

    fn closed(&self) -> bool {
        self.0.queue.lock().unwrap().terminated
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn send_and_recv() {
        let (tx, rx) = bounded(4);
        tx.send(1).unwrap();
        tx.send(2).unwrap();
        assert_eq!(rx.recv(None), Ok(1));
        assert_eq!(rx.recv(None), Ok(2));
        assert_eq!(rx.recv(Some(Duration::from_millis(10))), Err(Error::Timeout));
    }

    #[test]
    fn full_queue_overwrites_oldest() {
        let (tx, rx) = bounded(2);
        for i in 0..5 {
            tx.send(i).unwrap();
        }
        // receiver sees only the newest window
        assert_eq!(rx.recv(None), Ok(3));
        assert_eq!(rx.recv(None), Ok(4));
        let counter = tx.counter();
        let counters = counter.get_counters();
        assert!(matches!(counters[1].2, CounterValue::Unsigned(3)));
    }

    #[test]
    fn terminated_queue_drains_then_errors() {
        let (tx, rx) = bounded(4);
        tx.send(7).unwrap();
        drop(tx);
        assert_eq!(rx.recv(None), Ok(7));
        assert_eq!(rx.recv(None), Err(Error::Terminated(None)));
    }

    #[test]
    fn recv_wakes_on_send() {
        let (tx, rx) = bounded(4);
        let handle = thread::spawn(move || rx.recv(Some(Duration::from_secs(5))));
        tx.send(42u32).unwrap();
        assert_eq!(handle.join().unwrap(), Ok(42));
    }
}
