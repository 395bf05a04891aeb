//! The shared delayed-export scheduler.
//!
//! One background thread per [`ExportContext`](crate::ExportContext) runs
//! every delayed export. Exports are infrequent, so a single timer thread
//! is enough; ordering between delayed exports of different services is not
//! guaranteed. Dropping the scheduler disconnects the channel and joins the
//! thread — jobs still pending at shutdown are dropped.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Entry {
    at: Instant,
    seq: u64,
    job: Job,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reversed: the BinaryHeap is a max-heap, we want the earliest
        // deadline on top.
        other.at.cmp(&self.at).then(other.seq.cmp(&self.seq))
    }
}

/// Schedules jobs onto one shared background thread.
pub struct DelayScheduler {
    tx: Option<Sender<Entry>>,
    worker: Option<JoinHandle<()>>,
    seq: AtomicU64,
}

impl DelayScheduler {
    /// Spawn the scheduler thread.
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        let worker = std::thread::Builder::new()
            .name("wharf-delay-export".to_string())
            .spawn(move || run(rx))
            .expect("failed to spawn the delay-export thread");
        Self {
            tx: Some(tx),
            worker: Some(worker),
            seq: AtomicU64::new(0),
        }
    }

    /// Run `job` after `delay`.
    pub fn schedule(&self, delay: Duration, job: impl FnOnce() + Send + 'static) {
        if let Some(tx) = &self.tx {
            let entry = Entry {
                at: Instant::now() + delay,
                seq: self.seq.fetch_add(1, Ordering::Relaxed),
                job: Box::new(job),
            };
            let _ = tx.send(entry);
        }
    }
}

impl Default for DelayScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DelayScheduler {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run(rx: Receiver<Entry>) {
    let mut heap: BinaryHeap<Entry> = BinaryHeap::new();
    loop {
        let next_deadline = heap.peek().map(|e| e.at);
        let received = match next_deadline {
            Some(at) => {
                let timeout = at.saturating_duration_since(Instant::now());
                rx.recv_timeout(timeout)
            }
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(entry) => heap.push(entry),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        let now = Instant::now();
        while heap.peek().is_some_and(|e| e.at <= now) {
            if let Some(entry) = heap.pop() {
                (entry.job)();
            }
        }
    }
    debug!("Delay-export scheduler stopped");
}
