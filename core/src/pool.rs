//! Worker pool that runs blocking network calls off the caller's thread.
//!
//! A fixed set of named threads pull jobs from one unbounded priority queue.
//! Higher priorities are dequeued first; jobs of equal priority run in
//! submission order. There is no backpressure: callers decide how many
//! requests they issue.
//!
//! Cancellation is cooperative. A job receives nothing but its closure, so
//! the dispatcher captures a [`CancellationToken`] and checks it before and
//! after the network call.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

const LOG_TARGET: &str = "webclient_core::pool";

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Scheduling priority of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// Shared flag that marks a dispatch as cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// The set of live dispatches issued by one builder.
///
/// Only weak references are held: once a dispatch finishes and drops its
/// token, the scope forgets it on the next registration.
#[derive(Debug, Default)]
pub struct CancelScope {
    tokens: Mutex<Vec<Weak<AtomicBool>>>,
}

impl CancelScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and track a token for a new dispatch.
    pub fn register(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut tokens = self.tokens.lock();
        tokens.retain(|weak| weak.strong_count() > 0);
        tokens.push(Arc::downgrade(&token.cancelled));
        token
    }

    /// Cancel every live dispatch and forget them. Returns how many were
    /// still live.
    pub fn cancel_all(&self) -> usize {
        let tokens = std::mem::take(&mut *self.tokens.lock());
        let mut cancelled = 0;
        for flag in tokens.iter().filter_map(Weak::upgrade) {
            flag.store(true, Ordering::Release);
            cancelled += 1;
        }
        cancelled
    }

    /// Number of dispatches that have not finished yet.
    pub fn live(&self) -> usize {
        self.tokens
            .lock()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

struct Queued {
    priority: Priority,
    seq: u64,
    task: Task,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // Max-heap: higher priority first, then lower sequence number first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<Queued>,
    next_seq: u64,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<QueueState>,
    available: Condvar,
    active: AtomicUsize,
}

/// A fixed-size pool of worker threads fed by a priority queue.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    /// Spawn `size` workers named `<thread_name>-<index>`. A size of zero
    /// is treated as one.
    pub fn new(size: usize, thread_name: &str) -> std::io::Result<Self> {
        let size = size.max(1);
        let shared = Arc::new(Shared::default());
        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("{thread_name}-{index}"))
                .spawn(move || worker_loop(shared))?;
            workers.push(handle);
        }
        tracing::debug!(target: LOG_TARGET, size, "worker pool started");
        Ok(Self {
            shared,
            workers: Mutex::new(workers),
            size,
        })
    }

    /// Queue a task. Returns `false` if the pool has been shut down.
    pub fn spawn(&self, priority: Priority, task: Task) -> bool {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return false;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Queued {
            priority,
            seq,
            task,
        });
        drop(state);
        self.shared.available.notify_one();
        true
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Tasks waiting for a worker.
    pub fn queued(&self) -> usize {
        self.shared.state.lock().heap.len()
    }

    /// Tasks currently running.
    pub fn active(&self) -> usize {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Stop accepting tasks, let the workers drain the queue, and join them.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
        }
        self.shared.available.notify_all();

        let current = thread::current().id();
        for handle in std::mem::take(&mut *self.workers.lock()) {
            // A worker can end up dropping the last handle to its own pool.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::warn!(target: LOG_TARGET, "worker thread panicked during shutdown");
            }
        }
        tracing::debug!(target: LOG_TARGET, "worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("queued", &self.queued())
            .field("active", &self.active())
            .finish()
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let task = {
            let mut state = shared.state.lock();
            loop {
                if let Some(queued) = state.heap.pop() {
                    break queued.task;
                }
                if state.shutdown {
                    return;
                }
                shared.available.wait(&mut state);
            }
        };
        shared.active.fetch_add(1, Ordering::AcqRel);
        if catch_unwind(AssertUnwindSafe(task)).is_err() {
            tracing::warn!(target: LOG_TARGET, "task panicked; worker continues");
        }
        shared.active.fetch_sub(1, Ordering::AcqRel);
    }
}
