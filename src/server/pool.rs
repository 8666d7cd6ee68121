//! Bounded worker pool with configurable overload policy.
//!
//! # Responsibilities
//! - Run submitted jobs on a fixed-shape pool (core size, max size, bounded queue)
//! - Apply the admission policy when the queue is full at max workers
//! - Drain gracefully on shutdown, escalating to job discard after the grace period
//!
//! # Design Decisions
//! - The queue is a bounded crossbeam channel; `DiscardOldest` eviction is a
//!   `try_recv` from the same channel, so it can only ever see
//!   queued-but-not-started work, never a job a worker already picked up
//! - Extra workers (beyond core, up to max) are spawned when a submission
//!   finds the queue full, mirroring elastic pool growth
//! - `Abort` hands the rejected job back to the caller instead of consuming
//!   it, so the caller can answer the peer (e.g. with a 503) before closing

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

/// What to do when a submission finds the queue full and the pool already at
/// max workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverloadPolicy {
    /// Reject the submission; the caller answers the peer and closes.
    Abort,
    /// Run the job synchronously on the submitting thread, throttling the
    /// submission rate itself (backpressure).
    CallerRuns,
    /// Evict the oldest queued (not-yet-started) job and admit the new one.
    DiscardOldest,
}

/// Shape and admission policy of a [`WorkerPool`]. Immutable once the pool
/// is constructed.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Workers spawned at pool start.
    pub core_size: usize,

    /// Upper bound on workers; extra workers are spawned when the queue is
    /// full and the pool is below this limit.
    pub max_size: usize,

    /// Bounded submission queue capacity.
    pub queue_capacity: usize,

    /// Admission policy once the queue is full at max workers.
    pub overload_policy: OverloadPolicy,
}

impl Default for PoolConfig {
    /// I/O-bound defaults: connection handlers spend most of their time
    /// blocked on socket reads, so the pool is allowed to grow well past the
    /// core count.
    fn default() -> Self {
        let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
        Self {
            core_size: cores * 2,
            max_size: cores * 20,
            queue_capacity: cores * 60,
            overload_policy: OverloadPolicy::CallerRuns,
        }
    }
}

impl PoolConfig {
    /// Fixed-size pool (core = max), Abort on overload.
    pub fn fixed(threads: usize, queue_capacity: usize) -> Self {
        Self {
            core_size: threads,
            max_size: threads,
            queue_capacity,
            overload_policy: OverloadPolicy::Abort,
        }
    }

    pub fn is_elastic(&self) -> bool {
        self.max_size > self.core_size
    }
}

/// Fixed-shape pool of worker threads consuming jobs from a bounded queue.
///
/// Generic over the job type so the bounded-pool engine can submit accepted
/// sockets and the reactor can submit framed request buffers through the
/// same machinery.
pub struct WorkerPool<T: Send + 'static> {
    /// Dropped on shutdown so workers observe disconnection once drained.
    tx: Mutex<Option<Sender<T>>>,
    rx: Receiver<T>,
    handler: Arc<dyn Fn(T) + Send + Sync>,
    config: PoolConfig,
    name: String,
    live_workers: Arc<AtomicUsize>,
    active_jobs: Arc<AtomicUsize>,
    /// Set when the shutdown grace period is exceeded; workers then discard
    /// remaining queued jobs instead of running them.
    force_discard: Arc<AtomicBool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    worker_seq: AtomicUsize,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Create the pool and spawn its core workers.
    pub fn new<F>(name: impl Into<String>, config: PoolConfig, handler: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded(config.queue_capacity);
        let pool = Self {
            tx: Mutex::new(Some(tx)),
            rx,
            handler: Arc::new(handler),
            config,
            name: name.into(),
            live_workers: Arc::new(AtomicUsize::new(0)),
            active_jobs: Arc::new(AtomicUsize::new(0)),
            force_discard: Arc::new(AtomicBool::new(false)),
            handles: Mutex::new(Vec::new()),
            worker_seq: AtomicUsize::new(0),
        };
        for _ in 0..pool.config.core_size {
            pool.live_workers.fetch_add(1, Ordering::AcqRel);
            pool.spawn_worker(None);
        }
        pool
    }

    /// Submit a job. `Err` returns the job to the caller, which only happens
    /// under the `Abort` policy (or once shutdown has begun).
    pub fn submit(&self, job: T) -> Result<(), T> {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = guard.as_ref() else {
            return Err(job);
        };

        let mut job = match tx.try_send(job) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Disconnected(job)) => return Err(job),
            Err(TrySendError::Full(job)) => job,
        };

        // Queue full: grow toward max before applying the overload policy.
        // The new worker takes the offered job directly rather than racing
        // for queue space.
        if self.try_reserve_worker_slot() {
            self.spawn_worker(Some(job));
            return Ok(());
        }

        match self.config.overload_policy {
            OverloadPolicy::Abort => Err(job),
            OverloadPolicy::CallerRuns => {
                (self.handler)(job);
                Ok(())
            }
            OverloadPolicy::DiscardOldest => {
                loop {
                    // Evict the oldest queued job, then retry. Racing
                    // workers may drain the queue first; that only makes
                    // room, so keep retrying until the send lands.
                    let evicted = self.rx.try_recv().is_ok();
                    job = match tx.try_send(job) {
                        Ok(()) => return Ok(()),
                        Err(TrySendError::Disconnected(job)) => return Err(job),
                        Err(TrySendError::Full(job)) => job,
                    };
                    if !evicted {
                        thread::yield_now();
                    }
                }
            }
        }
    }

    /// Jobs currently executing on workers.
    pub fn active_jobs(&self) -> usize {
        self.active_jobs.load(Ordering::Acquire)
    }

    /// Jobs queued but not yet picked up by a worker.
    pub fn queued_jobs(&self) -> usize {
        self.rx.len()
    }

    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Atomically claim a worker slot below `max_size`.
    fn try_reserve_worker_slot(&self) -> bool {
        let max = self.config.max_size;
        self.live_workers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                if n < max {
                    Some(n + 1)
                } else {
                    None
                }
            })
            .is_ok()
    }

    /// Spawn a worker thread. The caller has already incremented
    /// `live_workers` for this worker's slot.
    fn spawn_worker(&self, first_job: Option<T>) {
        let rx = self.rx.clone();
        let handler = Arc::clone(&self.handler);
        let live = Arc::clone(&self.live_workers);
        let active = Arc::clone(&self.active_jobs);
        let force_discard = Arc::clone(&self.force_discard);
        let idx = self.worker_seq.fetch_add(1, Ordering::Relaxed);

        let result = thread::Builder::new()
            .name(format!("{}-worker-{}", self.name, idx))
            .spawn(move || {
                let run = |job: T| {
                    active.fetch_add(1, Ordering::AcqRel);
                    handler(job);
                    active.fetch_sub(1, Ordering::AcqRel);
                };
                if let Some(job) = first_job {
                    run(job);
                }
                while let Ok(job) = rx.recv() {
                    if force_discard.load(Ordering::Acquire) {
                        break;
                    }
                    run(job);
                }
                live.fetch_sub(1, Ordering::AcqRel);
            });

        match result {
            Ok(handle) => self
                .handles
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(handle),
            Err(e) => {
                // Roll back the slot the caller reserved for this worker.
                self.live_workers.fetch_sub(1, Ordering::AcqRel);
                tracing::error!(pool = %self.name, error = %e, "failed to spawn worker thread");
            }
        }
    }

    /// Stop accepting work, drain queued jobs, and join workers. Workers
    /// still busy after the grace period are abandoned and any jobs still
    /// queued at that point are discarded.
    pub fn shutdown(&self, grace: Duration) {
        // Disconnect the queue; workers exit after draining it.
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();

        let handles: Vec<JoinHandle<()>> = self
            .handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline && handles.iter().any(|h| !h.is_finished()) {
            thread::sleep(Duration::from_millis(10));
        }

        let mut stragglers = 0;
        for handle in handles {
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                stragglers += 1;
            }
        }

        if stragglers > 0 {
            // Escalate: remaining workers drop queued jobs and exit; the
            // threads themselves are abandoned (dropping the handle detaches).
            self.force_discard.store(true, Ordering::Release);
            tracing::warn!(
                pool = %self.name,
                stragglers,
                "grace period exceeded; abandoning busy workers"
            );
        } else {
            tracing::info!(pool = %self.name, "worker pool drained");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::sync::mpsc;

    /// Pool whose handler blocks each job on a gate, so tests can hold the
    /// single worker busy and saturate the queue deterministically.
    fn gated_pool(
        config: PoolConfig,
    ) -> (WorkerPool<u32>, Sender<()>, mpsc::Receiver<u32>) {
        let (gate_tx, gate_rx) = bounded::<()>(0);
        let (done_tx, done_rx) = mpsc::channel();
        let pool = WorkerPool::new("test", config, move |job: u32| {
            // Wait for the test to open the gate.
            let _ = gate_rx.recv();
            let _ = done_tx.send(job);
        });
        (pool, gate_tx, done_rx)
    }

    fn wait_until(cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn runs_submitted_jobs() {
        let (done_tx, done_rx) = mpsc::channel();
        let pool = WorkerPool::new("test", PoolConfig::fixed(2, 4), move |job: u32| {
            done_tx.send(job).unwrap();
        });

        pool.submit(1).unwrap();
        pool.submit(2).unwrap();

        let mut got = vec![done_rx.recv().unwrap(), done_rx.recv().unwrap()];
        got.sort_unstable();
        assert_eq!(got, vec![1, 2]);
        pool.shutdown(Duration::from_secs(1));
        assert_eq!(pool.live_workers(), 0);
    }

    #[test]
    fn abort_rejects_when_saturated_and_keeps_worker_set_clean() {
        let (pool, gate, done) = gated_pool(PoolConfig::fixed(1, 1));

        pool.submit(1).unwrap(); // picked up by the worker, blocks on gate
        wait_until(|| pool.active_jobs() == 1);
        pool.submit(2).unwrap(); // sits in the queue

        // Core + queue saturated: the next submission bounces back.
        let rejected = pool.submit(3);
        assert_eq!(rejected, Err(3));
        // The rejected job never entered the active worker set.
        assert_eq!(pool.active_jobs(), 1);
        assert_eq!(pool.queued_jobs(), 1);

        gate.send(()).unwrap();
        gate.send(()).unwrap();
        assert_eq!(done.recv().unwrap(), 1);
        assert_eq!(done.recv().unwrap(), 2);
        pool.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn caller_runs_executes_on_submitting_thread() {
        let config = PoolConfig {
            core_size: 1,
            max_size: 1,
            queue_capacity: 1,
            overload_policy: OverloadPolicy::CallerRuns,
        };
        let (gate_tx, gate_rx) = bounded::<()>(0);
        let submitter = thread::current().id();
        let (ran_tx, ran_rx) = mpsc::channel();
        let pool = WorkerPool::new("test", config, move |job: u32| {
            if job == 0 {
                // Saturating jobs block on the gate; the overflow job must not.
                let _ = gate_rx.recv();
            }
            ran_tx.send((job, thread::current().id())).unwrap();
        });

        pool.submit(0).unwrap();
        wait_until(|| pool.active_jobs() == 1);
        pool.submit(0).unwrap();

        // Queue full at max workers: this one runs inline, right here.
        pool.submit(7).unwrap();
        let (job, tid) = ran_rx.recv().unwrap();
        assert_eq!(job, 7);
        assert_eq!(tid, submitter);

        gate_tx.send(()).unwrap();
        gate_tx.send(()).unwrap();
        pool.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn discard_oldest_evicts_only_queued_work() {
        let config = PoolConfig {
            core_size: 1,
            max_size: 1,
            queue_capacity: 1,
            overload_policy: OverloadPolicy::DiscardOldest,
        };
        let (pool, gate, done) = gated_pool(config);

        pool.submit(1).unwrap(); // running, blocked on gate
        wait_until(|| pool.active_jobs() == 1);
        pool.submit(2).unwrap(); // queued
        pool.submit(3).unwrap(); // evicts 2, takes its place

        assert_eq!(pool.queued_jobs(), 1);
        gate.send(()).unwrap();
        gate.send(()).unwrap();

        // The dispatched job finishes untouched; the evicted one never runs.
        assert_eq!(done.recv().unwrap(), 1);
        assert_eq!(done.recv().unwrap(), 3);
        pool.shutdown(Duration::from_secs(1));
        assert!(done.try_recv().is_err());
    }

    #[test]
    fn elastic_pool_grows_past_core_under_load() {
        let config = PoolConfig {
            core_size: 1,
            max_size: 2,
            queue_capacity: 1,
            overload_policy: OverloadPolicy::Abort,
        };
        let (pool, gate, _done) = gated_pool(config);
        assert_eq!(pool.live_workers(), 1);

        pool.submit(1).unwrap();
        wait_until(|| pool.active_jobs() == 1);
        pool.submit(2).unwrap(); // fills the queue
        pool.submit(3).unwrap(); // queue full -> spawns the second worker

        wait_until(|| pool.live_workers() == 2);
        for _ in 0..3 {
            gate.send(()).unwrap();
        }
        pool.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn shutdown_drains_queued_jobs() {
        let (done_tx, done_rx) = mpsc::channel();
        let pool = WorkerPool::new("test", PoolConfig::fixed(1, 8), move |job: u32| {
            thread::sleep(Duration::from_millis(5));
            done_tx.send(job).unwrap();
        });
        for job in 0..5 {
            pool.submit(job).unwrap();
        }
        pool.shutdown(Duration::from_secs(2));

        let drained: Vec<u32> = done_rx.try_iter().collect();
        assert_eq!(drained.len(), 5);
        // New submissions bounce once the pool is down.
        assert_eq!(pool.submit(9), Err(9));
    }
}
