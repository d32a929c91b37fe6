//! Bounded worker pool with a self-feeding job queue.
//!
//! Workers pull jobs from one shared queue. Handling a job may yield results
//! and further jobs; new jobs go to the back of the same queue, so the pool
//! expands breadth-first without any central recursion.
//!
//! ## Termination
//!
//! A pending counter covers every job that is queued or being handled. It is
//! raised before a job becomes visible in the queue and lowered only after
//! the job's results and child jobs have been published, so it never reads
//! zero while work is in flight. The supervisor still requires the
//! empty-and-idle state on `quiescence_threshold` consecutive observations
//! before stopping, and force-terminates after `max_observations`.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::join_all;
use tokio::sync::{Notify, mpsc};
use tokio::time::{MissedTickBehavior, interval, sleep};

use crate::error::Result;
use crate::models::PoolSettings;

/// What handling one job produced.
#[derive(Debug)]
pub struct JobOutput<J, R> {
    pub results: Vec<R>,
    pub jobs: Vec<J>,
}

impl<J, R> JobOutput<J, R> {
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            jobs: Vec::new(),
        }
    }

    pub fn push_result(&mut self, result: R) {
        self.results.push(result);
    }

    pub fn push_job(&mut self, job: J) {
        self.jobs.push(job);
    }
}

impl<J, R> Default for JobOutput<J, R> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Unit of work executed by the pool.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    type Job: Send + 'static;
    type Output: Send + 'static;

    /// Short label used in log lines.
    fn describe(&self, job: &Self::Job) -> String;

    /// Process one job. An error drops the job's contribution; the pool
    /// keeps running.
    async fn handle(&self, job: Self::Job) -> Result<JobOutput<Self::Job, Self::Output>>;
}

/// Pool sizing and termination parameters.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub workers: usize,
    pub quiescence_threshold: u32,
    pub poll_interval: Duration,
    pub max_observations: Option<u64>,
}

impl PoolConfig {
    pub fn new(workers: usize, settings: &PoolSettings) -> Self {
        Self {
            workers,
            quiescence_threshold: settings.quiescence_threshold,
            poll_interval: settings.poll_interval(),
            max_observations: settings.observation_limit(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(8, &PoolSettings::default())
    }
}

/// Outcome of one pool run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub observations: u64,
    /// `false` when the pool was force-terminated before quiescence
    pub completed: bool,
}

struct Shared<J> {
    queue: Mutex<VecDeque<J>>,
    /// Jobs queued or being handled.
    pending: AtomicUsize,
    /// Workers currently holding a job.
    active: AtomicUsize,
    work_ready: Notify,
    drained: Notify,
    shutdown: AtomicBool,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl<J> Shared<J> {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            pending: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            work_ready: Notify::new(),
            drained: Notify::new(),
            shutdown: AtomicBool::new(false),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<J>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enqueue(&self, jobs: Vec<J>) {
        if jobs.is_empty() {
            return;
        }
        self.pending.fetch_add(jobs.len(), Ordering::AcqRel);
        self.queue().extend(jobs);
        self.work_ready.notify_waiters();
    }

    fn dequeue(&self) -> Option<J> {
        let mut queue = self.queue();
        let job = queue.pop_front();
        if job.is_some() {
            self.active.fetch_add(1, Ordering::AcqRel);
        }
        job
    }

    fn finish_job(&self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_one();
        }
    }

    fn is_quiescent(&self) -> bool {
        self.queue().is_empty()
            && self.active.load(Ordering::Acquire) == 0
            && self.pending.load(Ordering::Acquire) == 0
    }
}

/// Runs a [`JobHandler`] over a self-feeding queue with bounded concurrency.
pub struct WorkerPool<H: JobHandler> {
    handler: Arc<H>,
    config: PoolConfig,
}

impl<H: JobHandler> WorkerPool<H> {
    pub fn new(handler: H, config: PoolConfig) -> Self {
        Self {
            handler: Arc::new(handler),
            config,
        }
    }

    /// Seed the queue and run until quiescence.
    ///
    /// Every result is passed to `sink` on the calling task, in the order it
    /// was received. A sink error stops the pool and is returned.
    pub async fn run<F>(&self, seeds: Vec<H::Job>, mut sink: F) -> Result<PoolReport>
    where
        F: FnMut(H::Output) -> Result<()>,
    {
        let shared = Arc::new(Shared::new());
        shared.enqueue(seeds);

        let (result_tx, mut result_rx) = mpsc::unbounded_channel();
        let workers: Vec<_> = (0..self.config.workers.max(1))
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    Arc::clone(&self.handler),
                    Arc::clone(&shared),
                    result_tx.clone(),
                    self.config.poll_interval,
                ))
            })
            .collect();
        drop(result_tx);

        let threshold = self.config.quiescence_threshold.max(1);
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut observations = 0u64;
        let mut stable = 0u32;
        let mut completed = false;
        let mut sink_error = None;

        loop {
            tokio::select! {
                Some(output) = result_rx.recv() => {
                    if let Err(e) = sink(output) {
                        sink_error = Some(e);
                        break;
                    }
                    continue;
                }
                _ = shared.drained.notified() => {}
                _ = ticker.tick() => {}
            }

            observations += 1;
            if shared.is_quiescent() {
                stable += 1;
            } else {
                stable = 0;
            }
            if stable >= threshold {
                completed = true;
                break;
            }
            if self
                .config
                .max_observations
                .is_some_and(|limit| observations >= limit)
            {
                log::warn!(
                    "Worker pool did not settle after {} observations; terminating with {} job(s) outstanding",
                    observations,
                    shared.pending.load(Ordering::Acquire)
                );
                break;
            }
        }

        shared.shutdown.store(true, Ordering::Release);
        shared.work_ready.notify_waiters();
        if !completed {
            for worker in &workers {
                worker.abort();
            }
        }
        for joined in join_all(workers).await {
            if let Err(e) = joined {
                if e.is_panic() {
                    log::error!("Worker task panicked: {}", e);
                }
            }
        }

        if let Some(e) = sink_error {
            return Err(e);
        }
        while let Ok(output) = result_rx.try_recv() {
            sink(output)?;
        }

        Ok(PoolReport {
            jobs_completed: shared.completed.load(Ordering::Acquire),
            jobs_failed: shared.failed.load(Ordering::Acquire),
            observations,
            completed,
        })
    }
}

async fn worker_loop<H: JobHandler>(
    id: usize,
    handler: Arc<H>,
    shared: Arc<Shared<H::Job>>,
    results: mpsc::UnboundedSender<H::Output>,
    idle_wait: Duration,
) {
    while !shared.shutdown.load(Ordering::Acquire) {
        let Some(job) = shared.dequeue() else {
            tokio::select! {
                _ = shared.work_ready.notified() => {}
                _ = sleep(idle_wait) => {}
            }
            continue;
        };

        let label = handler.describe(&job);
        match AssertUnwindSafe(handler.handle(job)).catch_unwind().await {
            Ok(Ok(output)) => {
                for result in output.results {
                    let _ = results.send(result);
                }
                shared.enqueue(output.jobs);
                shared.completed.fetch_add(1, Ordering::AcqRel);
                log::debug!("worker {}: finished {}", id, label);
            }
            Ok(Err(e)) => {
                shared.failed.fetch_add(1, Ordering::AcqRel);
                log::warn!("worker {}: {} failed: {}", id, label, e);
            }
            Err(_) => {
                shared.failed.fetch_add(1, Ordering::AcqRel);
                log::error!("worker {}: {} panicked", id, label);
            }
        }
        shared.finish_job();
    }
}
