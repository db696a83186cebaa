//! Multi-threaded Monte Carlo Tree Search for chess, AlphaZero style.
//!
//! # Overview
//!
//! A search session ([`MctsSearch`]) runs a pool of worker threads over one
//! shared tree. Each simulation consists of four phases:
//!
//! 1. **Selection**: descend by PUCT, adding virtual loss to every node on
//!    the path so concurrent workers spread out
//! 2. **Evaluation**: terminal leaves are scored exactly; other leaves are
//!    queued on the [`EvalBatcher`], which groups them into one
//!    [`Evaluator`] call and caches committed results
//! 3. **Expansion**: the leaf gets one child per legal move, exactly once
//! 4. **Backup**: the value is negated per ply on the way up and the
//!    virtual loss released
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use engine_core::{GameView, Position};
//! use mcts::{ExplorationHooks, MctsConfig, MctsSearch, UniformEvaluator};
//!
//! let mut search = MctsSearch::new(
//!     Arc::new(UniformEvaluator::new()),
//!     MctsConfig::for_evaluation().with_simulations(200),
//!     ExplorationHooks::default(),
//! )?;
//!
//! let report = search.run_search(&GameView::new(Position::startpos()))?;
//! println!("best move: {:?}", report.best_move);
//! println!("visits: {:?}", search.root_visit_distribution());
//! # Ok::<(), mcts::SearchError>(())
//! ```
//!
//! # Evaluators
//!
//! - [`UniformEvaluator`]: uniform policy, neutral value (for testing)
//! - [`MaterialEvaluator`]: uniform policy, material-count value
//! - anything implementing [`Evaluator`], e.g. a neural network backend

pub mod batcher;
pub mod config;
pub mod evaluator;
pub mod node;
pub mod schedule;
pub mod search;
pub mod stats;
pub mod tree;

// Re-export main types
pub use batcher::{EvalBatcher, WorkerGuard};
pub use config::{ConfigError, MctsConfig, SearchBudget};
pub use evaluator::{
    EvalResult, Evaluator, EvaluatorError, InputBatch, MaterialEvaluator, UniformEvaluator,
};
pub use node::{MctsNode, NodeId, NodeState};
pub use schedule::{
    ConstantCpuct, CpuctSchedule, DirichletSchedule, DirichletUntil, ExplorationHooks,
    ExponentialCpuct, NoDirichlet,
};
pub use search::{
    dirichlet_noise, legal_priors, mix_root_noise, sample_move, MctsSearch, SearchError,
    SearchReport,
};
pub use stats::{SearchStats, StatsSnapshot};
pub use tree::{InvariantViolation, MctsTree, Selection, TreeError, TreeStats};
