//! Completion contexts: where classification and callbacks run.
//!
//! The worker that performed a network call never invokes callbacks
//! directly. It posts a job to the dispatcher's [`CompletionContext`], which
//! decides which thread runs it:
//!
//! - [`CompletionThread`] runs jobs one at a time on a dedicated thread.
//! - [`CompletionQueue`] holds jobs until the owner pumps it from its own
//!   loop, the way a UI main loop would.
//! - [`Inline`] runs jobs immediately on the posting worker.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

const LOG_TARGET: &str = "webclient_core::completion";

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A place that runs completion jobs.
pub trait CompletionContext: Send + Sync {
    fn post(&self, job: Job);
}

fn run_job(job: Job) {
    if catch_unwind(AssertUnwindSafe(job)).is_err() {
        tracing::warn!(target: LOG_TARGET, "completion callback panicked");
    }
}

/// Runs jobs on the thread that posts them.
///
/// Callbacks from different requests may run concurrently.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inline;

impl CompletionContext for Inline {
    fn post(&self, job: Job) {
        job();
    }
}

/// A dedicated thread that runs jobs in the order they are posted.
///
/// The thread exits once this handle is dropped and the queue is empty.
#[derive(Debug)]
pub struct CompletionThread {
    sender: Sender<Job>,
}

impl CompletionThread {
    pub fn spawn(name: &str) -> std::io::Result<Self> {
        let (sender, receiver) = unbounded::<Job>();
        thread::Builder::new().name(name.to_string()).spawn(move || {
            for job in receiver {
                run_job(job);
            }
            tracing::trace!(target: LOG_TARGET, "completion thread exiting");
        })?;
        Ok(Self { sender })
    }
}

impl CompletionContext for CompletionThread {
    fn post(&self, job: Job) {
        if self.sender.send(job).is_err() {
            tracing::warn!(target: LOG_TARGET, "completion thread is gone; dropping callback");
        }
    }
}

/// A queue of jobs that its owner runs explicitly.
#[derive(Debug)]
pub struct CompletionQueue {
    sender: Sender<Job>,
    receiver: Receiver<Job>,
}

impl CompletionQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Jobs waiting to run.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Run every job that is already queued. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.receiver.try_recv() {
            run_job(job);
            ran += 1;
        }
        ran
    }

    /// Wait up to `timeout` for one job and run it. Returns whether a job
    /// ran.
    pub fn run_one(&self, timeout: Duration) -> bool {
        match self.receiver.recv_timeout(timeout) {
            Ok(job) => {
                run_job(job);
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Run jobs as they arrive until `done` returns true or `timeout`
    /// elapses. Returns the final value of `done`.
    pub fn run_until(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while !done() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.run_one(deadline - now);
        }
        true
    }

    /// Run jobs as they arrive for the whole of `duration`. Returns how many
    /// ran.
    pub fn run_for(&self, duration: Duration) -> usize {
        let deadline = Instant::now() + duration;
        let mut ran = 0;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return ran;
            }
            if self.run_one(deadline - now) {
                ran += 1;
            }
        }
    }
}

impl Default for CompletionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionContext for CompletionQueue {
    fn post(&self, job: Job) {
        // The queue owns its receiver, so sending cannot fail.
        let _ = self.sender.send(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};

    #[test]
    fn inline_runs_immediately() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        Inline.post(Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn queue_holds_jobs_until_pumped() {
        let queue = CompletionQueue::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let h = Arc::clone(&hits);
            queue.post(Box::new(move || {
                h.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(queue.pending(), 3);
        assert_eq!(queue.run_pending(), 3);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn run_until_times_out() {
        let queue = CompletionQueue::new();
        assert!(!queue.run_until(Duration::from_millis(20), || false));
        assert!(queue.run_until(Duration::from_millis(20), || true));
    }

    #[test]
    fn run_for_counts_jobs() {
        let queue = CompletionQueue::new();
        queue.post(Box::new(|| {}));
        queue.post(Box::new(|| panic!("callback bug")));
        assert_eq!(queue.run_for(Duration::from_millis(30)), 2);
    }

    #[test]
    fn completion_thread_preserves_order() {
        let thread = CompletionThread::spawn("test-completion").unwrap();
        let (tx, rx) = mpsc::channel();
        for i in 0..5 {
            let tx = tx.clone();
            thread.post(Box::new(move || tx.send(i).unwrap()));
        }
        let got: Vec<i32> = (0..5)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
    }
}
