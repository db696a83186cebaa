//! MCTS configuration parameters.

use std::time::Duration;

use thiserror::Error;

/// Invalid search configuration. Always fatal, never retried.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("num_threads must be greater than 0")]
    ZeroThreads,

    #[error("eval_batch_size must be greater than 0")]
    ZeroBatchSize,

    #[error("cache_capacity must be greater than 0")]
    ZeroCacheCapacity,

    #[error("search budget must be non-zero")]
    ZeroBudget,

    #[error("conflicting search budgets: set either a simulation count or a move time, not both")]
    ConflictingBudget,

    #[error("no search budget: set a simulation count or a move time")]
    MissingBudget,

    #[error("dirichlet_epsilon must be within [0, 1], got {0}")]
    InvalidEpsilon(f32),

    #[error("dirichlet_alpha must be non-negative, got {0}")]
    InvalidAlpha(f32),
}

/// How much work one search may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBudget {
    /// Fixed number of simulations, shared by all workers.
    Simulations(u32),
    /// Wall-clock deadline measured from the start of the search.
    Time(Duration),
}

impl SearchBudget {
    /// Build a budget from optional limits; exactly one must be set.
    pub fn from_limits(
        simulations: Option<u32>,
        time: Option<Duration>,
    ) -> Result<Self, ConfigError> {
        match (simulations, time) {
            (Some(_), Some(_)) => Err(ConfigError::ConflictingBudget),
            (Some(n), None) => Ok(SearchBudget::Simulations(n)),
            (None, Some(t)) => Ok(SearchBudget::Time(t)),
            (None, None) => Err(ConfigError::MissingBudget),
        }
    }

    fn is_zero(&self) -> bool {
        match self {
            SearchBudget::Simulations(n) => *n == 0,
            SearchBudget::Time(t) => t.is_zero(),
        }
    }
}

/// Configuration for Monte Carlo Tree Search.
#[derive(Debug, Clone)]
pub struct MctsConfig {
    /// Worker threads sharing one tree.
    pub num_threads: usize,

    /// Leaves are collected until this batch size is reached (or every
    /// worker is waiting), then evaluated in one inference call.
    pub eval_batch_size: usize,

    /// Simulation count or move time per search.
    pub budget: SearchBudget,

    /// Committed evaluations kept in the LRU cache.
    pub cache_capacity: usize,

    /// Dirichlet noise alpha for root node exploration.
    /// AlphaZero uses 0.3 for chess.
    pub dirichlet_alpha: f32,

    /// Fraction of prior that comes from Dirichlet noise at root.
    /// AlphaZero uses 0.25, meaning 75% prior + 25% noise.
    pub dirichlet_epsilon: f32,

    /// Seed for root noise. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for MctsConfig {
    fn default() -> Self {
        Self {
            num_threads: 4,
            eval_batch_size: 16,
            budget: SearchBudget::Simulations(800),
            cache_capacity: 1 << 16,
            dirichlet_alpha: 0.3,
            dirichlet_epsilon: 0.25,
            seed: None,
        }
    }
}

impl MctsConfig {
    /// Create config for training (with exploration noise).
    pub fn for_training() -> Self {
        Self::default()
    }

    /// Create config for evaluation/inference (no noise).
    pub fn for_evaluation() -> Self {
        Self {
            dirichlet_alpha: 0.0,
            dirichlet_epsilon: 0.0,
            ..Self::default()
        }
    }

    /// Create a fast, deterministic config for testing.
    pub fn for_testing() -> Self {
        Self {
            num_threads: 1,
            eval_batch_size: 4,
            budget: SearchBudget::Simulations(64),
            cache_capacity: 4096,
            dirichlet_alpha: 0.0,
            dirichlet_epsilon: 0.0,
            seed: Some(42),
        }
    }

    /// Builder pattern: set number of simulations.
    pub fn with_simulations(mut self, n: u32) -> Self {
        self.budget = SearchBudget::Simulations(n);
        self
    }

    /// Builder pattern: set a per-search move time.
    pub fn with_move_time(mut self, time: Duration) -> Self {
        self.budget = SearchBudget::Time(time);
        self
    }

    /// Builder pattern: set worker thread count.
    pub fn with_threads(mut self, n: usize) -> Self {
        self.num_threads = n;
        self
    }

    /// Builder pattern: set evaluation batch size.
    pub fn with_eval_batch_size(mut self, size: usize) -> Self {
        self.eval_batch_size = size;
        self
    }

    /// Builder pattern: set cache capacity.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Builder pattern: set Dirichlet noise parameters.
    pub fn with_dirichlet(mut self, alpha: f32, epsilon: f32) -> Self {
        self.dirichlet_alpha = alpha;
        self.dirichlet_epsilon = epsilon;
        self
    }

    /// Builder pattern: set the RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Reject configurations the search cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        if self.eval_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::ZeroCacheCapacity);
        }
        if self.budget.is_zero() {
            return Err(ConfigError::ZeroBudget);
        }
        if !(0.0..=1.0).contains(&self.dirichlet_epsilon) {
            return Err(ConfigError::InvalidEpsilon(self.dirichlet_epsilon));
        }
        if self.dirichlet_alpha < 0.0 || self.dirichlet_alpha.is_nan() {
            return Err(ConfigError::InvalidAlpha(self.dirichlet_alpha));
        }
        Ok(())
    }

    /// Whether root noise can be drawn at all.
    pub fn noise_enabled(&self) -> bool {
        self.dirichlet_alpha > 0.0 && self.dirichlet_epsilon > 0.0
    }
}
