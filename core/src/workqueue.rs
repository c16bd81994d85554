//! # Delayed Work Queue
//!
//! A single worker thread that runs one-shot jobs after a delay. Every job
//! gets a [`WorkHandle`]; a job cancelled before its deadline never runs.
//!
//! ```text
//!   schedule(delay, job) ──▶ ┌──────────────────────────────┐
//!                            │ pending: (deadline, seq)→job │ ◀── cancel(handle)
//!                            └──────────────┬───────────────┘
//!                                           │ earliest deadline reached
//!                                           ▼
//!                                  worker thread runs job(handle)
//! ```
//!
//! A job that has already been taken off the queue cannot be cancelled.
//! Jobs must re-check their own preconditions when they run.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{ErrorKind, PmError, PmResult};

/// A job; receives its own handle when it runs
pub type Work = Box<dyn FnOnce(WorkHandle) + Send + 'static>;

/// Identifies one scheduled job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkHandle {
    seq: u64,
    deadline: Instant,
}

impl WorkHandle {
    /// When the job is due
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

// =============================================================================
// Shared State
// =============================================================================

struct Queue {
    pending: BTreeMap<(Instant, u64), Work>,
    next_seq: u64,
    running: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    wake: Condvar,
    fired: AtomicU64,
    cancelled: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Counters of queue activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkQueueStats {
    /// Jobs that ran
    pub fired: u64,
    /// Jobs removed before their deadline
    pub cancelled: u64,
    /// Jobs currently waiting
    pub pending: usize,
}

// =============================================================================
// Delayed Work Queue
// =============================================================================

/// Deadline-ordered one-shot job queue served by a dedicated thread
pub struct DelayedWorkQueue {
    shared: Arc<Shared>,
    worker: spin::Mutex<Option<JoinHandle<()>>>,
}

impl DelayedWorkQueue {
    /// Spawn the worker thread
    pub fn start(name: &str) -> PmResult<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                pending: BTreeMap::new(),
                next_seq: 0,
                running: true,
            }),
            wake: Condvar::new(),
            fired: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || worker_loop(&worker_shared))
            .map_err(|err| {
                PmError::from_kind(ErrorKind::Internal)
                    .with_details(format!("cannot spawn {}: {}", name, err))
            })?;

        Ok(Self {
            shared,
            worker: spin::Mutex::new(Some(worker)),
        })
    }

    /// Queue `work` to run once `delay` has elapsed
    pub fn schedule(&self, delay: Duration, work: Work) -> PmResult<WorkHandle> {
        let mut queue = self.shared.lock();
        if !queue.running {
            return Err(PmError::from_kind(ErrorKind::ShutDown));
        }

        let handle = WorkHandle {
            seq: queue.next_seq,
            deadline: Instant::now() + delay,
        };
        queue.next_seq += 1;
        queue.pending.insert((handle.deadline, handle.seq), work);
        drop(queue);

        self.shared.wake.notify_one();
        Ok(handle)
    }

    /// Remove a job before it runs; false if it already ran or was cancelled
    pub fn cancel(&self, handle: WorkHandle) -> bool {
        let removed = self
            .shared
            .lock()
            .pending
            .remove(&(handle.deadline, handle.seq))
            .is_some();

        if removed {
            self.shared.cancelled.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Check whether a job is still waiting
    pub fn is_pending(&self, handle: WorkHandle) -> bool {
        self.shared
            .lock()
            .pending
            .contains_key(&(handle.deadline, handle.seq))
    }

    /// Queue statistics
    pub fn stats(&self) -> WorkQueueStats {
        WorkQueueStats {
            fired: self.shared.fired.load(Ordering::Relaxed),
            cancelled: self.shared.cancelled.load(Ordering::Relaxed),
            pending: self.shared.lock().pending.len(),
        }
    }

    /// Stop the worker and drop every job that has not run
    ///
    /// Waits for a job that is currently running to finish.
    pub fn shutdown(&self) {
        let dropped = {
            let mut queue = self.shared.lock();
            queue.running = false;
            core::mem::take(&mut queue.pending)
        };
        self.shared.wake.notify_all();

        if !dropped.is_empty() {
            log::debug!("workqueue: dropping {} pending job(s)", dropped.len());
        }
        drop(dropped);

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                log::error!("workqueue: worker thread panicked");
            }
        }
    }
}

impl Drop for DelayedWorkQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl core::fmt::Debug for DelayedWorkQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DelayedWorkQueue")
            .field("stats", &self.stats())
            .finish()
    }
}

fn worker_loop(shared: &Shared) {
    let mut queue = shared.lock();
    loop {
        if !queue.running {
            break;
        }

        let now = Instant::now();
        let next = queue.pending.first_key_value().map(|(key, _)| *key);
        match next {
            Some((deadline, _)) if deadline <= now => {
                let Some(((deadline, seq), work)) = queue.pending.pop_first() else {
                    continue;
                };
                drop(queue);

                shared.fired.fetch_add(1, Ordering::Relaxed);
                work(WorkHandle { seq, deadline });

                queue = shared.lock();
            },
            Some((deadline, _)) => {
                queue = shared
                    .wake
                    .wait_timeout(queue, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            },
            None => {
                queue = shared
                    .wake
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            },
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn test_job_runs_after_delay() {
        let wq = DelayedWorkQueue::start("wq-test").unwrap();
        let (tx, rx) = mpsc::channel();
        let start = Instant::now();

        let handle = wq
            .schedule(
                Duration::from_millis(20),
                Box::new(move |h: WorkHandle| {
                    tx.send(h).unwrap();
                }),
            )
            .unwrap();

        let ran = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(ran, handle);
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(wq.stats().fired, 1);
    }

    #[test]
    fn test_jobs_run_in_deadline_order() {
        let wq = DelayedWorkQueue::start("wq-test").unwrap();
        let (tx, rx) = mpsc::channel();

        for (delay, tag) in [(60u64, 'c'), (20, 'a'), (40, 'b')] {
            let tx = tx.clone();
            wq.schedule(
                Duration::from_millis(delay),
                Box::new(move |_: WorkHandle| {
                    tx.send(tag).unwrap();
                }),
            )
            .unwrap();
        }

        let order: Vec<char> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(order, vec!['a', 'b', 'c']);
    }

    #[test]
    fn test_cancel_before_deadline() {
        let wq = DelayedWorkQueue::start("wq-test").unwrap();
        let runs = Arc::new(AtomicUsize::new(0));

        let r = Arc::clone(&runs);
        let handle = wq
            .schedule(
                Duration::from_millis(50),
                Box::new(move |_: WorkHandle| {
                    r.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        assert!(wq.is_pending(handle));
        assert!(wq.cancel(handle));
        assert!(!wq.cancel(handle));
        assert!(!wq.is_pending(handle));

        thread::sleep(Duration::from_millis(100));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(wq.stats().cancelled, 1);
    }

    #[test]
    fn test_schedule_after_shutdown() {
        let wq = DelayedWorkQueue::start("wq-test").unwrap();
        wq.shutdown();

        let err = wq
            .schedule(Duration::from_millis(1), Box::new(|_: WorkHandle| {}))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShutDown);
    }

    #[test]
    fn test_shutdown_drops_pending() {
        let wq = DelayedWorkQueue::start("wq-test").unwrap();
        let runs = Arc::new(AtomicUsize::new(0));

        let r = Arc::clone(&runs);
        wq.schedule(
            Duration::from_secs(60),
            Box::new(move |_: WorkHandle| {
                r.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

        wq.shutdown();
        assert_eq!(wq.stats().pending, 0);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
