// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Delay Queue
//!
//! Time-ordered queue of deferred jobs served by one timer task. The timer
//! always sleeps until the soonest job only; scheduling an earlier job wakes it
//! up to re-arm. Jobs run on the timer task and are expected to be short (they
//! typically spawn the real work).
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Retry and back-off scheduling for coordinator operations

use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Scheduled {
    due: Instant,
    seq: u64,
    label: &'static str,
    job: Job,
}

// Min-heap on (due, seq): BinaryHeap is a max-heap, so the ordering is reversed.
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        other.due.cmp(&self.due).then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

#[derive(Default)]
struct QueueState {
    heap: Mutex<BinaryHeap<Scheduled>>,
    wake: Notify,
    seq: AtomicU64,
}

pub struct DelayQueue {
    state: Arc<QueueState>,
    timer: JoinHandle<()>,
}

impl DelayQueue {
    /// Create the queue and start its timer task.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new() -> Self {
        let state = Arc::new(QueueState::default());
        let timer = tokio::spawn(run_timer(state.clone()));
        Self { state, timer }
    }

    /// Run `job` once `delay` has elapsed.
    pub fn schedule<F>(&self, delay: Duration, label: &'static str, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let due = Instant::now() + delay;
        let seq = self.state.seq.fetch_add(1, AtomicOrdering::Relaxed);
        let is_soonest = {
            let mut heap = self.state.heap.lock();
            let is_soonest = heap.peek().is_none_or(|head| due < head.due);
            heap.push(Scheduled { due, seq, label, job: Box::new(job) });
            is_soonest
        };
        trace!(label, delay_ms = delay.as_millis() as u64, "Job scheduled");
        if is_soonest {
            self.state.wake.notify_one();
        }
    }

    /// Resolve once `delay` has elapsed on the queue's timer.
    pub async fn wait(&self, delay: Duration, label: &'static str) {
        let (tx, rx) = oneshot::channel();
        self.schedule(delay, label, move || {
            let _ = tx.send(());
        });
        // A dropped sender means the queue itself is going away.
        let _ = rx.await;
    }

    /// Number of jobs waiting to run.
    pub fn len(&self) -> usize {
        self.state.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DelayQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DelayQueue {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

async fn run_timer(state: Arc<QueueState>) {
    loop {
        let next_due = state.heap.lock().peek().map(|head| head.due);
        match next_due {
            None => state.wake.notified().await,
            Some(due) => {
                tokio::select! {
                    _ = sleep_until(due) => {}
                    _ = state.wake.notified() => continue,
                }
            }
        }

        let ready = {
            let mut heap = state.heap.lock();
            let now = Instant::now();
            let mut ready = Vec::new();
            while heap.peek().is_some_and(|head| head.due <= now) {
                if let Some(item) = heap.pop() {
                    ready.push(item);
                }
            }
            ready
        };
        for item in ready {
            debug!(label = item.label, "Running deferred job");
            (item.job)();
        }
    }
}
