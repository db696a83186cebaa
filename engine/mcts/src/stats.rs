//! Lock-free search counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Counters shared by the worker pool and the evaluation batcher.
#[derive(Debug, Default)]
pub struct SearchStats {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    coalesced: AtomicU64,
    inference_calls: AtomicU64,
    inferred_positions: AtomicU64,
    failed_inference_calls: AtomicU64,
    simulations: AtomicU64,
    abandoned: AtomicU64,
    terminal_hits: AtomicU64,
    expansions: AtomicU64,
    expansion_races_lost: AtomicU64,
    inference_time_us: AtomicU64,
}

/// Serializable point-in-time copy of [`SearchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Requests attached to an already pending evaluation.
    pub coalesced: u64,
    pub inference_calls: u64,
    pub inferred_positions: u64,
    pub failed_inference_calls: u64,
    /// Completed simulations (backed up).
    pub simulations: u64,
    /// Simulations dropped after a failed evaluation.
    pub abandoned: u64,
    pub terminal_hits: u64,
    pub expansions: u64,
    pub expansion_races_lost: u64,
    pub inference_time_us: u64,
}

impl SearchStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        Self::bump(&self.cache_hits);
    }

    pub fn record_cache_miss(&self) {
        Self::bump(&self.cache_misses);
    }

    pub fn record_coalesced(&self) {
        Self::bump(&self.coalesced);
    }

    pub fn record_inference(&self, positions: usize, elapsed: Duration) {
        Self::bump(&self.inference_calls);
        self.inferred_positions
            .fetch_add(positions as u64, Ordering::Relaxed);
        self.inference_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_failed_inference(&self) {
        Self::bump(&self.failed_inference_calls);
    }

    pub fn record_simulation(&self) {
        Self::bump(&self.simulations);
    }

    pub fn record_abandoned(&self) {
        Self::bump(&self.abandoned);
    }

    pub fn record_terminal_hit(&self) {
        Self::bump(&self.terminal_hits);
    }

    pub fn record_expansion(&self, created: bool) {
        if created {
            Self::bump(&self.expansions);
        } else {
            Self::bump(&self.expansion_races_lost);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            cache_hits: load(&self.cache_hits),
            cache_misses: load(&self.cache_misses),
            coalesced: load(&self.coalesced),
            inference_calls: load(&self.inference_calls),
            inferred_positions: load(&self.inferred_positions),
            failed_inference_calls: load(&self.failed_inference_calls),
            simulations: load(&self.simulations),
            abandoned: load(&self.abandoned),
            terminal_hits: load(&self.terminal_hits),
            expansions: load(&self.expansions),
            expansion_races_lost: load(&self.expansion_races_lost),
            inference_time_us: load(&self.inference_time_us),
        }
    }
}

impl StatsSnapshot {
    /// Counters accumulated since `earlier`.
    pub fn delta(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.cache_hits.saturating_sub(earlier.cache_hits),
            cache_misses: self.cache_misses.saturating_sub(earlier.cache_misses),
            coalesced: self.coalesced.saturating_sub(earlier.coalesced),
            inference_calls: self.inference_calls.saturating_sub(earlier.inference_calls),
            inferred_positions: self
                .inferred_positions
                .saturating_sub(earlier.inferred_positions),
            failed_inference_calls: self
                .failed_inference_calls
                .saturating_sub(earlier.failed_inference_calls),
            simulations: self.simulations.saturating_sub(earlier.simulations),
            abandoned: self.abandoned.saturating_sub(earlier.abandoned),
            terminal_hits: self.terminal_hits.saturating_sub(earlier.terminal_hits),
            expansions: self.expansions.saturating_sub(earlier.expansions),
            expansion_races_lost: self
                .expansion_races_lost
                .saturating_sub(earlier.expansion_races_lost),
            inference_time_us: self
                .inference_time_us
                .saturating_sub(earlier.inference_time_us),
        }
    }

    /// Positions per inference call.
    pub fn avg_batch_size(&self) -> f64 {
        if self.inference_calls == 0 {
            0.0
        } else {
            self.inferred_positions as f64 / self.inference_calls as f64
        }
    }

    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }
}
