//! Evaluation batching and caching.
//!
//! Workers hand encoded leaves to the batcher and block until the result is
//! committed. Requests are grouped into one evaluator call once
//! `eval_batch_size` positions are queued, or earlier when every registered
//! worker is already waiting. Identical positions in flight share a single
//! pending job, and committed results land in an LRU cache keyed by the
//! position key.
//!
//! Lock order is queue state first, cache second.

use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Instant;

use engine_core::EncodedPosition;
use lru::LruCache;
use tracing::{trace, warn};

use crate::config::ConfigError;
use crate::evaluator::{validate_results, EvalResult, Evaluator, EvaluatorError, InputBatch};
use crate::stats::SearchStats;

type JobResult = Result<Arc<EvalResult>, EvaluatorError>;

#[derive(Debug, Default)]
struct Job {
    result: OnceLock<JobResult>,
}

#[derive(Default)]
struct QueueState {
    pending: HashMap<u64, Arc<Job>>,
    queue: VecDeque<(u64, Arc<Job>, EncodedPosition)>,
    /// Registered workers.
    active: usize,
    /// Workers parked on the condition variable.
    blocked: usize,
}

/// Shared front end to an [`Evaluator`].
pub struct EvalBatcher {
    evaluator: Arc<dyn Evaluator>,
    batch_size: usize,
    state: Mutex<QueueState>,
    ready: Condvar,
    cache: Mutex<LruCache<u64, Arc<EvalResult>>>,
    stats: Arc<SearchStats>,
}

impl std::fmt::Debug for EvalBatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvalBatcher")
            .field("batch_size", &self.batch_size)
            .field("cached", &self.cache_len())
            .finish_non_exhaustive()
    }
}

/// Registration of one worker thread. Dropping it may release a partial
/// batch that was waiting on this worker.
#[must_use = "a worker counts as active only while its guard is alive"]
pub struct WorkerGuard<'a> {
    batcher: &'a EvalBatcher,
}

impl Drop for WorkerGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.batcher.lock_state();
        state.active = state.active.saturating_sub(1);
        drop(state);
        self.batcher.ready.notify_all();
    }
}

impl EvalBatcher {
    pub fn new(
        evaluator: Arc<dyn Evaluator>,
        batch_size: usize,
        cache_capacity: usize,
        stats: Arc<SearchStats>,
    ) -> Result<Self, ConfigError> {
        if batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        let capacity = NonZeroUsize::new(cache_capacity).ok_or(ConfigError::ZeroCacheCapacity)?;
        Ok(Self {
            evaluator,
            batch_size,
            state: Mutex::new(QueueState::default()),
            ready: Condvar::new(),
            cache: Mutex::new(LruCache::new(capacity)),
            stats,
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_cache(&self) -> MutexGuard<'_, LruCache<u64, Arc<EvalResult>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cached(&self, key: u64) -> Option<Arc<EvalResult>> {
        self.lock_cache().get(&key).cloned()
    }

    /// Count the calling thread as a worker until the guard drops.
    pub fn register_worker(&self) -> WorkerGuard<'_> {
        self.lock_state().active += 1;
        WorkerGuard { batcher: self }
    }

    pub fn active_workers(&self) -> usize {
        self.lock_state().active
    }

    pub fn cache_len(&self) -> usize {
        self.lock_cache().len()
    }

    pub fn clear_cache(&self) {
        self.lock_cache().clear();
    }

    /// Evaluate `position`, blocking until its result is committed.
    ///
    /// A failed evaluator call is reported to every job in that batch and
    /// nothing is cached for them.
    pub fn request(&self, key: u64, position: EncodedPosition) -> JobResult {
        if let Some(hit) = self.cached(key) {
            self.stats.record_cache_hit();
            return Ok(hit);
        }

        let mut state = self.lock_state();
        // Recheck: a batch may have committed between the two locks.
        if let Some(hit) = self.cached(key) {
            self.stats.record_cache_hit();
            return Ok(hit);
        }
        self.stats.record_cache_miss();

        let job = match state.pending.get(&key) {
            Some(job) => {
                self.stats.record_coalesced();
                Arc::clone(job)
            }
            None => {
                let job = Arc::new(Job::default());
                state.pending.insert(key, Arc::clone(&job));
                state.queue.push_back((key, Arc::clone(&job), position));
                job
            }
        };

        loop {
            if let Some(result) = job.result.get() {
                return result.clone();
            }

            let full = state.queue.len() >= self.batch_size;
            let everyone_waiting = state.blocked + 1 >= state.active;
            if full || (!state.queue.is_empty() && everyone_waiting) {
                state = self.dispatch(state);
                continue;
            }

            state.blocked += 1;
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            state.blocked -= 1;
        }
    }

    /// Run one evaluator call on the front of the queue. The queue lock is
    /// released for the duration of the call.
    fn dispatch<'a>(&'a self, mut state: MutexGuard<'a, QueueState>) -> MutexGuard<'a, QueueState> {
        let take = state.queue.len().min(self.batch_size);
        let jobs: Vec<_> = state.queue.drain(..take).collect();
        drop(state);

        let mut input = InputBatch::with_capacity(jobs.len());
        for (_, _, position) in &jobs {
            input.push(position);
        }

        let started = Instant::now();
        let outcome = self
            .evaluator
            .evaluate_batch(&input)
            .and_then(|results| validate_results(&input, results));
        let elapsed = started.elapsed();

        let mut state = self.lock_state();
        match outcome {
            Ok(results) => {
                self.stats.record_inference(jobs.len(), elapsed);
                trace!(
                    batch = jobs.len(),
                    elapsed_us = elapsed.as_micros() as u64,
                    "Batch evaluated"
                );
                let mut cache = self.lock_cache();
                for ((key, job, _), result) in jobs.into_iter().zip(results) {
                    let result = Arc::new(result);
                    cache.put(key, Arc::clone(&result));
                    state.pending.remove(&key);
                    let _ = job.result.set(Ok(result));
                }
            }
            Err(e) => {
                self.stats.record_failed_inference();
                warn!(batch = jobs.len(), error = %e, "Batch evaluation failed");
                for (key, job, _) in jobs {
                    state.pending.remove(&key);
                    let _ = job.result.set(Err(e.clone()));
                }
            }
        }
        self.ready.notify_all();
        state
    }
}
