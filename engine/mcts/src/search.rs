//! MCTS search implementation.
//!
//! One search owns a fresh tree. The root is evaluated and expanded up
//! front, then `num_threads` workers each run simulations until the budget
//! is spent:
//! 1. Selection: descend by PUCT, leaving virtual loss on the path
//! 2. Evaluation: exact value at terminal leaves, otherwise a batched
//!    evaluator call
//! 3. Expansion: children created once from the evaluator's priors
//! 4. Backup: alternate the value up the path and release virtual loss

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use chess::ChessMove;
use engine_core::{encode, move_index, position_key, GameView, Outcome};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::batcher::EvalBatcher;
use crate::config::{ConfigError, MctsConfig, SearchBudget};
use crate::evaluator::{Evaluator, EvaluatorError};
use crate::node::NodeState;
use crate::schedule::ExplorationHooks;
use crate::stats::{SearchStats, StatsSnapshot};
use crate::tree::{MctsTree, TreeError};

/// Errors that can occur during MCTS search.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Root position is already decided: {0:?}")]
    TerminalRoot(Outcome),

    #[error("Evaluator error: {0}")]
    Evaluation(#[from] EvaluatorError),

    #[error("Tree error: {0}")]
    IllegalSelection(#[from] TreeError),
}

/// Result of an MCTS search.
#[derive(Debug, Clone)]
pub struct SearchReport {
    /// Most visited root move.
    pub best_move: Option<ChessMove>,

    /// Mean backed-up value at the root, for the side to move.
    pub root_value: f32,

    pub simulations_started: u64,
    pub simulations_completed: u64,
    pub simulations_abandoned: u64,

    pub tree_nodes: usize,
    pub elapsed: Duration,

    /// Counters accumulated during this search only.
    pub stats: StatsSnapshot,
}

/// A search session: evaluator front end, cache, RNG and the last tree.
///
/// The evaluation cache survives between searches; the tree does not.
pub struct MctsSearch {
    config: MctsConfig,
    hooks: ExplorationHooks,
    batcher: EvalBatcher,
    stats: Arc<SearchStats>,
    tree: MctsTree,
    stop: Arc<AtomicBool>,
    rng: ChaCha20Rng,
}

impl std::fmt::Debug for MctsSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MctsSearch")
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .field("batcher", &self.batcher)
            .field("tree_nodes", &self.tree.len())
            .finish_non_exhaustive()
    }
}

/// Shared by the worker threads of one search.
struct Workload<'a> {
    tree: &'a MctsTree,
    batcher: &'a EvalBatcher,
    stats: &'a SearchStats,
    root: &'a GameView,
    c_puct: f32,
    budget: SearchBudget,
    deadline: Option<Instant>,
    stop: &'a AtomicBool,
    halt: AtomicBool,
    started: AtomicU64,
    completed: AtomicU64,
    abandoned: AtomicU64,
    fatal: OnceLock<TreeError>,
}

impl Workload<'_> {
    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
            || self.halt.load(Ordering::Relaxed)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Claim one unit of budget.
    fn claim(&self) -> bool {
        match self.budget {
            SearchBudget::Simulations(n) => self
                .started
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                    (s < u64::from(n)).then_some(s + 1)
                })
                .is_ok(),
            SearchBudget::Time(_) => {
                self.started.fetch_add(1, Ordering::AcqRel);
                true
            }
        }
    }

    fn run_worker(&self) {
        while !self.should_stop() && self.claim() {
            match self.simulate() {
                Ok(true) => {
                    self.completed.fetch_add(1, Ordering::Relaxed);
                }
                Ok(false) => {
                    self.abandoned.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!(error = %e, "Worker hit a corrupt tree, stopping search");
                    let _ = self.fatal.set(e);
                    self.halt.store(true, Ordering::Relaxed);
                    return;
                }
            }
        }
    }

    /// One simulation. Returns false if it was abandoned.
    fn simulate(&self) -> Result<bool, TreeError> {
        let selection = self.tree.select(self.root, self.c_puct)?;
        let leaf_id = selection.leaf();
        let leaf = self.tree.get(leaf_id);

        let value = if let Some(value) = leaf.state().terminal_value() {
            self.stats.record_terminal_hit();
            value
        } else {
            let outcome = selection.view.outcome();
            match (outcome.value(), terminal_state(outcome)) {
                (Some(value), Some(state)) => {
                    self.tree.mark_terminal(leaf_id, state);
                    self.stats.record_terminal_hit();
                    value
                }
                _ => {
                    let key = position_key(&selection.view);
                    match self.batcher.request(key, encode(&selection.view)) {
                        Ok(eval) => {
                            let priors = legal_priors(&selection.view, &eval.policy);
                            let created = self.tree.expand(leaf_id, &priors);
                            self.stats.record_expansion(created);
                            eval.value
                        }
                        Err(e) => {
                            trace!(leaf = %leaf_id, error = %e, "Simulation abandoned");
                            self.tree.revert_virtual_loss(&selection.path);
                            self.stats.record_abandoned();
                            return Ok(false);
                        }
                    }
                }
            }
        };

        self.tree.backup(&selection.path, value);
        self.stats.record_simulation();
        trace!(
            leaf = %leaf_id,
            depth = selection.path.len() - 1,
            value,
            "Simulation complete"
        );
        Ok(true)
    }
}

impl MctsSearch {
    pub fn new(
        evaluator: Arc<dyn Evaluator>,
        config: MctsConfig,
        hooks: ExplorationHooks,
    ) -> Result<Self, SearchError> {
        config.validate()?;
        let stats = Arc::new(SearchStats::new());
        let batcher = EvalBatcher::new(
            evaluator,
            config.eval_batch_size,
            config.cache_capacity,
            Arc::clone(&stats),
        )?;
        let rng = match config.seed {
            Some(seed) => ChaCha20Rng::seed_from_u64(seed),
            None => ChaCha20Rng::from_entropy(),
        };

        Ok(Self {
            config,
            hooks,
            batcher,
            stats,
            tree: MctsTree::new(),
            stop: Arc::new(AtomicBool::new(false)),
            rng,
        })
    }

    pub fn config(&self) -> &MctsConfig {
        &self.config
    }

    pub fn hooks(&self) -> &ExplorationHooks {
        &self.hooks
    }

    /// Tree of the most recent search.
    pub fn tree(&self) -> &MctsTree {
        &self.tree
    }

    /// Counters accumulated over the whole session.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Raising this flag makes workers stop claiming new simulations.
    /// It stays raised until [`MctsSearch::clear_stop`].
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn clear_stop(&self) {
        self.stop.store(false, Ordering::Relaxed);
    }

    pub fn root_visit_distribution(&self) -> Vec<(ChessMove, u32)> {
        self.tree.root_visit_distribution()
    }

    pub fn root_policy(&self, temperature: f32) -> Vec<(ChessMove, f32)> {
        self.tree.root_policy(temperature)
    }

    pub fn best_move(&self) -> Option<ChessMove> {
        self.tree.best_move().map(|(mv, _)| mv)
    }

    /// Search `root` with the configured budget.
    pub fn run_search(&mut self, root: &GameView) -> Result<SearchReport, SearchError> {
        let budget = self.config.budget;
        self.run_search_with_budget(root, budget)
    }

    /// Search `root` with an explicit budget.
    pub fn run_search_with_budget(
        &mut self,
        root: &GameView,
        budget: SearchBudget,
    ) -> Result<SearchReport, SearchError> {
        match budget {
            SearchBudget::Simulations(0) => return Err(ConfigError::ZeroBudget.into()),
            SearchBudget::Time(t) if t.is_zero() => return Err(ConfigError::ZeroBudget.into()),
            _ => {}
        }

        let started_at = Instant::now();
        let before = self.stats.snapshot();
        self.tree = MctsTree::new();

        let outcome = root.outcome();
        if outcome.is_terminal() {
            return Err(SearchError::TerminalRoot(outcome));
        }

        let step = u32::from(root.ply());
        self.expand_root(root, step)?;

        let workload = Workload {
            tree: &self.tree,
            batcher: &self.batcher,
            stats: &self.stats,
            root,
            c_puct: self.hooks.cpuct.cpuct(step),
            budget,
            deadline: match budget {
                SearchBudget::Time(t) => Some(started_at + t),
                SearchBudget::Simulations(_) => None,
            },
            stop: &self.stop,
            halt: AtomicBool::new(false),
            started: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            abandoned: AtomicU64::new(0),
            fatal: OnceLock::new(),
        };

        thread::scope(|s| {
            for _ in 0..self.config.num_threads {
                // Registered before spawning so no worker can flush a
                // partial batch while others are still starting.
                let guard = self.batcher.register_worker();
                let workload = &workload;
                s.spawn(move || {
                    let _guard = guard;
                    workload.run_worker();
                });
            }
        });

        if let Some(e) = workload.fatal.into_inner() {
            return Err(SearchError::IllegalSelection(e));
        }

        let root_node = self.tree.get(self.tree.root());
        let report = SearchReport {
            best_move: self.best_move(),
            root_value: root_node.mean_value(),
            simulations_started: workload.started.load(Ordering::Relaxed),
            simulations_completed: workload.completed.load(Ordering::Relaxed),
            simulations_abandoned: workload.abandoned.load(Ordering::Relaxed),
            tree_nodes: self.tree.len(),
            elapsed: started_at.elapsed(),
            stats: self.stats.snapshot().delta(&before),
        };

        info!(
            ply = step,
            best_move = ?report.best_move.map(|mv| mv.to_string()),
            root_value = report.root_value,
            completed = report.simulations_completed,
            abandoned = report.simulations_abandoned,
            nodes = report.tree_nodes,
            avg_batch = report.stats.avg_batch_size(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Search finished"
        );
        Ok(report)
    }

    /// Evaluate and expand the root. Not counted against the budget.
    fn expand_root(&mut self, root: &GameView, step: u32) -> Result<(), SearchError> {
        let eval = {
            let _guard = self.batcher.register_worker();
            self.batcher.request(position_key(root), encode(root))?
        };

        let mut priors = legal_priors(root, &eval.policy);
        if self.config.noise_enabled() && self.hooks.dirichlet.apply(step) {
            mix_root_noise(
                &mut priors,
                self.config.dirichlet_alpha,
                self.config.dirichlet_epsilon,
                &mut self.rng,
            );
        }

        let created = self.tree.expand(self.tree.root(), &priors);
        self.stats.record_expansion(created);
        debug!(
            ply = step,
            children = priors.len(),
            value = eval.value,
            "Root expanded"
        );
        Ok(())
    }
}

fn terminal_state(outcome: Outcome) -> Option<NodeState> {
    match outcome {
        Outcome::InProgress => None,
        Outcome::Win => Some(NodeState::Win),
        Outcome::Loss => Some(NodeState::Loss),
        Outcome::Draw(_) => Some(NodeState::Draw),
    }
}

/// Priors for every legal move of `view`, read from a full move-space
/// policy and renormalised. Falls back to uniform when the policy puts no
/// usable mass on legal moves.
pub fn legal_priors(view: &GameView, policy: &[f32]) -> Vec<(ChessMove, f32)> {
    let side = view.side_to_move();
    let moves = view.position().legal_moves();
    let raw: Vec<f32> = moves
        .iter()
        .map(|&mv| {
            policy
                .get(move_index(mv, side))
                .copied()
                .unwrap_or(0.0)
                .max(0.0)
        })
        .collect();
    let total: f32 = raw.iter().sum();

    if total > 0.0 && total.is_finite() {
        moves.into_iter().zip(raw).map(|(mv, p)| (mv, p / total)).collect()
    } else {
        let uniform = 1.0 / moves.len().max(1) as f32;
        moves.into_iter().map(|mv| (mv, uniform)).collect()
    }
}

/// `prior = (1 - epsilon) * prior + epsilon * noise`, then renormalise.
pub fn mix_root_noise<R: Rng + ?Sized>(
    priors: &mut [(ChessMove, f32)],
    alpha: f32,
    epsilon: f32,
    rng: &mut R,
) {
    let noise = dirichlet_noise(priors.len(), alpha, rng);
    if noise.is_empty() {
        return;
    }
    for ((_, prior), n) in priors.iter_mut().zip(noise) {
        *prior = (1.0 - epsilon) * *prior + epsilon * n;
    }
    let total: f32 = priors.iter().map(|(_, p)| p).sum();
    if total > 0.0 {
        for (_, prior) in priors.iter_mut() {
            *prior /= total;
        }
    }
}

/// Generate Dirichlet-distributed noise using Gamma variates.
/// Empty when `alpha` is not a valid shape parameter.
pub fn dirichlet_noise<R: Rng + ?Sized>(n: usize, alpha: f32, rng: &mut R) -> Vec<f32> {
    use rand_distr::{Distribution, Gamma};

    if n == 0 || alpha <= 0.0 {
        return Vec::new();
    }
    let Ok(gamma) = Gamma::new(f64::from(alpha), 1.0) else {
        return Vec::new();
    };
    let mut samples: Vec<f32> = (0..n).map(|_| gamma.sample(rng) as f32).collect();

    // Normalize
    let sum: f32 = samples.iter().sum();
    if sum > 0.0 {
        for s in &mut samples {
            *s /= sum;
        }
    } else {
        samples.fill(1.0 / n as f32);
    }

    samples
}

/// Sample a move from a probability distribution.
pub fn sample_move<R: Rng + ?Sized>(policy: &[(ChessMove, f32)], rng: &mut R) -> Option<ChessMove> {
    let total: f32 = policy.iter().map(|(_, p)| p.max(0.0)).sum();
    if total <= 0.0 || !total.is_finite() {
        return None;
    }

    let r: f32 = rng.gen::<f32>() * total;
    let mut cumsum = 0.0;
    for &(mv, p) in policy {
        cumsum += p.max(0.0);
        if r < cumsum {
            return Some(mv);
        }
    }

    // Fallback to last non-zero move (handles floating point issues)
    policy.iter().rev().find(|(_, p)| *p > 0.0).map(|(mv, _)| *mv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::UniformEvaluator;
    use engine_core::{Position, MOVE_SPACE};

    fn search_with(config: MctsConfig) -> MctsSearch {
        MctsSearch::new(
            Arc::new(UniformEvaluator::new()),
            config,
            ExplorationHooks::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let result = MctsSearch::new(
            Arc::new(UniformEvaluator::new()),
            MctsConfig::for_testing().with_threads(0),
            ExplorationHooks::default(),
        );
        assert!(matches!(
            result,
            Err(SearchError::Config(ConfigError::ZeroThreads))
        ));
    }

    #[test]
    fn test_single_thread_search_spends_budget() {
        let mut search = search_with(MctsConfig::for_testing().with_simulations(32));
        let root = GameView::new(Position::startpos());

        let report = search.run_search(&root).unwrap();

        assert_eq!(report.simulations_started, 32);
        assert_eq!(report.simulations_completed, 32);
        assert_eq!(report.simulations_abandoned, 0);
        assert!(report.best_move.is_some());
        assert_eq!(search.tree().get(search.tree().root()).visits(), 32);
        assert!(search.tree().check_invariants().is_ok());
    }

    #[test]
    fn test_terminal_root_rejected() {
        // Fool's mate: white is checkmated.
        let root = GameView::from_moves(Position::startpos(), &["f2f3", "e7e5", "g2g4", "d8h4"])
            .unwrap();
        let mut search = search_with(MctsConfig::for_testing());

        let err = search.run_search(&root).unwrap_err();
        assert!(matches!(err, SearchError::TerminalRoot(Outcome::Loss)));
    }

    #[test]
    fn test_zero_budget_override_rejected() {
        let mut search = search_with(MctsConfig::for_testing());
        let root = GameView::new(Position::startpos());
        let err = search
            .run_search_with_budget(&root, SearchBudget::Simulations(0))
            .unwrap_err();
        assert!(matches!(err, SearchError::Config(ConfigError::ZeroBudget)));
    }

    #[test]
    fn test_raised_stop_flag_skips_simulations() {
        let mut search = search_with(MctsConfig::for_testing());
        let root = GameView::new(Position::startpos());

        search.stop_handle().store(true, Ordering::Relaxed);
        let report = search.run_search(&root).unwrap();
        assert_eq!(report.simulations_completed, 0);
        // Root is still expanded.
        assert_eq!(search.root_visit_distribution().len(), 20);

        search.clear_stop();
        let report = search.run_search(&root).unwrap();
        assert_eq!(report.simulations_completed, 64);
    }

    #[test]
    fn test_legal_priors_normalised() {
        let view = GameView::new(Position::startpos());
        let mut policy = vec![0.0; MOVE_SPACE];
        let e2e4 = view.position().parse_uci("e2e4").unwrap();
        policy[move_index(e2e4, view.side_to_move())] = 3.0;

        let priors = legal_priors(&view, &policy);
        assert_eq!(priors.len(), 20);
        let total: f32 = priors.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-5);
        let (_, p) = priors.iter().find(|(mv, _)| *mv == e2e4).unwrap();
        assert!((p - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_legal_priors_fall_back_to_uniform() {
        let view = GameView::new(Position::startpos());
        let mut policy = vec![0.0; MOVE_SPACE];
        policy[0] = f32::NAN;

        let priors = legal_priors(&view, &policy);
        for (_, p) in &priors {
            assert!((p - 0.05).abs() < 1e-6);
        }
    }

    #[test]
    fn test_dirichlet_noise_sums_to_one() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let noise = dirichlet_noise(20, 0.3, &mut rng);
        assert_eq!(noise.len(), 20);
        let total: f32 = noise.iter().sum();
        assert!((total - 1.0).abs() < 1e-4);

        assert!(dirichlet_noise(20, 0.0, &mut rng).is_empty());
    }

    #[test]
    fn test_mix_root_noise_keeps_distribution() {
        let view = GameView::new(Position::startpos());
        let mut priors = legal_priors(&view, &[]);
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        mix_root_noise(&mut priors, 0.3, 0.25, &mut rng);

        let total: f32 = priors.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-4);
        assert!(priors.iter().all(|(_, p)| *p > 0.0));
    }

    #[test]
    fn test_sample_move() {
        let view = GameView::new(Position::startpos());
        let e2e4 = view.position().parse_uci("e2e4").unwrap();
        let d2d4 = view.position().parse_uci("d2d4").unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(3);

        assert_eq!(sample_move(&[(e2e4, 0.0), (d2d4, 1.0)], &mut rng), Some(d2d4));
        assert_eq!(sample_move(&[(e2e4, 0.0)], &mut rng), None);
        assert_eq!(sample_move(&[], &mut rng), None);
    }
}
