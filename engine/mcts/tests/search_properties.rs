//! End-to-end properties of the multi-threaded search.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use engine_core::{GameView, Position};
use mcts::{
    EvalResult, Evaluator, EvaluatorError, ExplorationHooks, InputBatch, MctsConfig, MctsSearch,
    NodeState, SearchBudget, SearchError, UniformEvaluator,
};

fn uniform_search(config: MctsConfig) -> MctsSearch {
    MctsSearch::new(
        Arc::new(UniformEvaluator::new()),
        config,
        ExplorationHooks::default(),
    )
    .unwrap()
}

fn view_of(fen: &str) -> GameView {
    GameView::new(Position::from_fen(fen).unwrap())
}

/// Succeeds on the first call, then fails every other call.
#[derive(Default)]
struct FlakyEvaluator {
    calls: AtomicUsize,
}

impl Evaluator for FlakyEvaluator {
    fn evaluate_batch(&self, batch: &InputBatch) -> Result<Vec<EvalResult>, EvaluatorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call % 2 == 1 {
            return Err(EvaluatorError::EvaluationFailed(format!("call {call} dropped")));
        }
        UniformEvaluator.evaluate_batch(batch)
    }
}

struct BrokenEvaluator;

impl Evaluator for BrokenEvaluator {
    fn evaluate_batch(&self, _batch: &InputBatch) -> Result<Vec<EvalResult>, EvaluatorError> {
        Err(EvaluatorError::EvaluationFailed("no backend".into()))
    }
}

#[test]
fn root_visits_match_budget_for_any_thread_count() {
    let root = GameView::new(Position::startpos());

    for threads in [1usize, 2, 4, 8, 16] {
        let mut search = uniform_search(
            MctsConfig::for_testing()
                .with_threads(threads)
                .with_eval_batch_size(4)
                .with_simulations(96),
        );
        let report = search.run_search(&root).unwrap();

        let tree = search.tree();
        let root_node = tree.get(tree.root());
        assert_eq!(report.simulations_completed, 96, "threads={threads}");
        assert_eq!(u64::from(root_node.visits()), report.simulations_completed);
        assert_eq!(root_node.leaf_visits(), 0);
        assert_eq!(tree.stats().total_virtual_loss, 0, "threads={threads}");
        if let Err(violation) = tree.check_invariants() {
            panic!("threads={threads}: {violation}");
        }
    }
}

#[test]
fn twenty_simulations_from_the_opening() {
    let mut search = uniform_search(MctsConfig::for_testing().with_simulations(20));
    let report = search.run_search(&GameView::new(Position::startpos())).unwrap();

    let distribution = search.root_visit_distribution();
    assert_eq!(distribution.len(), 20);
    let total: u32 = distribution.iter().map(|(_, v)| v).sum();
    assert_eq!(total, 20);
    assert_eq!(report.simulations_completed, 20);

    let policy = search.root_policy(1.0);
    let mass: f32 = policy.iter().map(|(_, p)| p).sum();
    assert!((mass - 1.0).abs() < 1e-5);
}

#[test]
fn finds_mate_in_one() {
    let root = view_of("6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1");
    let mut search = uniform_search(MctsConfig::for_testing().with_simulations(400));

    let report = search.run_search(&root).unwrap();

    let mate = root.position().parse_uci("a1a8").unwrap();
    assert_eq!(report.best_move, Some(mate));
    assert!(report.root_value > 0.5, "root value {}", report.root_value);

    let tree = search.tree();
    let root_node = tree.get(tree.root());
    let mate_child = root_node
        .children()
        .unwrap()
        .iter()
        .map(|&id| tree.get(id))
        .find(|child| child.mv == Some(mate))
        .unwrap();
    assert_eq!(mate_child.state(), NodeState::Loss);
    assert!(report.stats.terminal_hits > 0);
}

#[test]
fn finds_the_only_defence_against_mate() {
    // Ra8 mates unless black opens h7 for the king.
    let root = view_of("7k/6pp/6P1/8/8/8/8/R5K1 b - - 0 1");
    let defence = root.position().parse_uci("h7g6").unwrap();

    for threads in [1, 4] {
        let mut search = uniform_search(
            MctsConfig::for_testing()
                .with_threads(threads)
                .with_simulations(2000),
        );
        let report = search.run_search(&root).unwrap();

        assert_eq!(search.root_visit_distribution().len(), 4);
        assert_eq!(report.best_move, Some(defence), "{threads} threads");
        assert!(search.tree().check_invariants().is_ok());

        // Every other reply has a line where black is mated within two plies.
        let tree = search.tree();
        let root_node = tree.get(tree.root());
        for &id in root_node.children().unwrap().iter() {
            let reply = tree.get(id);
            if reply.mv == Some(defence) {
                continue;
            }
            let mated = reply.children().map_or(false, |grandchildren| {
                grandchildren
                    .iter()
                    .any(|&g| tree.get(g).state() == NodeState::Loss)
            });
            assert!(
                reply.state() == NodeState::Loss || mated,
                "{:?} has no losing line with {threads} threads",
                reply.mv
            );
        }
    }
}

#[test]
fn batch_accounting_is_consistent() {
    let mut search = uniform_search(
        MctsConfig::for_testing()
            .with_threads(4)
            .with_eval_batch_size(4)
            .with_simulations(128),
    );
    let report = search.run_search(&GameView::new(Position::startpos())).unwrap();
    let stats = report.stats;

    // Every miss either joined a pending job or became a queued position.
    assert_eq!(stats.inferred_positions, stats.cache_misses - stats.coalesced);
    assert!(stats.inference_calls >= 1);
    assert!(stats.avg_batch_size() >= 1.0);
    assert!(stats.avg_batch_size() <= 4.0);
    assert_eq!(stats.failed_inference_calls, 0);
}

#[test]
fn cache_survives_between_searches() {
    let root = GameView::new(Position::startpos());
    let mut search = uniform_search(MctsConfig::for_testing().with_simulations(16));

    search.run_search(&root).unwrap();
    let second = search.run_search(&root).unwrap();

    // Same root, same leaves: nothing new reaches the evaluator.
    assert_eq!(second.stats.inference_calls, 0);
    assert!(second.stats.cache_hits >= 17);
    assert_eq!(second.simulations_completed, 16);
}

#[test]
fn failed_evaluations_abandon_simulations() {
    let mut search = MctsSearch::new(
        Arc::new(FlakyEvaluator::default()),
        MctsConfig::for_testing().with_simulations(32),
        ExplorationHooks::default(),
    )
    .unwrap();

    let report = search.run_search(&GameView::new(Position::startpos())).unwrap();

    assert!(report.simulations_abandoned > 0);
    assert!(report.simulations_completed > 0);
    assert_eq!(
        report.simulations_completed + report.simulations_abandoned,
        report.simulations_started
    );
    assert_eq!(report.stats.abandoned, report.simulations_abandoned);
    assert!(report.stats.failed_inference_calls > 0);
    assert!(search.tree().check_invariants().is_ok());
    assert_eq!(search.tree().stats().total_virtual_loss, 0);
}

#[test]
fn root_evaluation_failure_is_an_error() {
    let mut search = MctsSearch::new(
        Arc::new(BrokenEvaluator),
        MctsConfig::for_testing(),
        ExplorationHooks::default(),
    )
    .unwrap();

    let err = search
        .run_search(&GameView::new(Position::startpos()))
        .unwrap_err();
    assert!(matches!(err, SearchError::Evaluation(_)));
}

#[test]
fn time_budget_stops_workers() {
    let mut search = uniform_search(MctsConfig::for_testing().with_threads(2));
    let report = search
        .run_search_with_budget(
            &GameView::new(Position::startpos()),
            SearchBudget::Time(Duration::from_millis(50)),
        )
        .unwrap();

    assert!(report.simulations_completed > 0);
    assert!(report.elapsed >= Duration::from_millis(50));
    assert!(search.tree().check_invariants().is_ok());
}

#[test]
fn seeded_noise_is_reproducible() {
    let root = GameView::new(Position::startpos());
    let config = MctsConfig::for_testing()
        .with_simulations(48)
        .with_dirichlet(0.3, 0.25)
        .with_seed(1234);
    let hooks = ExplorationHooks::for_training(1.25, 1.0, 1.0, 30);

    let run = || {
        let mut search = MctsSearch::new(
            Arc::new(UniformEvaluator::new()),
            config.clone(),
            hooks.clone(),
        )
        .unwrap();
        search.run_search(&root).unwrap();
        search.root_visit_distribution()
    };

    assert_eq!(run(), run());
}
