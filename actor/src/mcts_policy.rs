//! MCTS-based move selection
//!
//! Runs a full parallel search for every move. Early in the game the move
//! is sampled from the visit distribution so self-play games diverge; later
//! the most visited move is played.

use anyhow::{anyhow, Result};
use chess::ChessMove;
use engine_core::GameView;
use mcts::{sample_move, MctsSearch, StatsSnapshot};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::debug;

use crate::policy::{MovePolicy, Proposal};

pub struct MctsPolicy {
    search: MctsSearch,
    temp_threshold: u32,
    rng: ChaCha20Rng,
}

impl MctsPolicy {
    pub fn new(search: MctsSearch, temp_threshold: u32, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => ChaCha20Rng::seed_from_u64(s.wrapping_add(1)),
            None => ChaCha20Rng::from_entropy(),
        };
        Self {
            search,
            temp_threshold,
            rng,
        }
    }
}

impl MovePolicy for MctsPolicy {
    fn name(&self) -> &'static str {
        "mcts"
    }

    fn propose(
        &mut self,
        game: &GameView,
        _last_opponent_move: Option<ChessMove>,
        legal_moves: &[ChessMove],
    ) -> Result<Proposal> {
        let report = self.search.run_search(game)?;
        if report.simulations_completed == 0 {
            return Err(anyhow!(
                "search completed no simulations ({} abandoned)",
                report.simulations_abandoned
            ));
        }

        let target = self.search.root_policy(1.0);
        let mv = if u32::from(game.ply()) < self.temp_threshold {
            sample_move(&target, &mut self.rng)
        } else {
            report.best_move
        }
        .ok_or_else(|| anyhow!("search produced no move"))?;

        if !legal_moves.contains(&mv) {
            return Err(anyhow!("search chose illegal move {}", mv));
        }

        debug!(
            ply = game.ply(),
            mv = %mv,
            value = report.root_value,
            sims = report.simulations_completed,
            "Searched move"
        );

        Ok(Proposal {
            mv,
            policy_target: Some(target),
            root_value: Some(report.root_value),
        })
    }

    fn search_stats(&self) -> Option<StatsSnapshot> {
        Some(self.search.stats())
    }

    fn stop_handle(&self) -> Option<Arc<AtomicBool>> {
        Some(self.search.stop_handle())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::Position;
    use mcts::{ExplorationHooks, MctsConfig, SearchBudget, UniformEvaluator};
    use std::sync::atomic::Ordering;

    fn policy(sims: u32, temp_threshold: u32) -> MctsPolicy {
        let config = MctsConfig {
            num_threads: 1,
            eval_batch_size: 2,
            budget: SearchBudget::Simulations(sims),
            cache_capacity: 256,
            seed: Some(5),
            ..MctsConfig::default()
        };
        let search = MctsSearch::new(
            Arc::new(UniformEvaluator::new()),
            config,
            ExplorationHooks::for_evaluation(1.25),
        )
        .unwrap();
        MctsPolicy::new(search, temp_threshold, Some(5))
    }

    #[test]
    fn test_proposal_carries_policy_target() {
        let mut policy = policy(16, 0);
        let game = GameView::new(Position::startpos());
        let legal = game.position().legal_moves();

        let proposal = policy.propose(&game, None, &legal).unwrap();
        assert!(legal.contains(&proposal.mv));

        let target = proposal.policy_target.unwrap();
        assert_eq!(target.len(), 20);
        let total: f32 = target.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-4);
        assert!(proposal.root_value.is_some());

        // Past the threshold the most visited move is played.
        let most_visited = target
            .iter()
            .fold(0.0f32, |best, (_, p)| best.max(*p));
        let played = target.iter().find(|(mv, _)| *mv == proposal.mv).unwrap().1;
        assert_eq!(played, most_visited);
        assert_eq!(policy.search_stats().unwrap().simulations, 16);
    }

    #[test]
    fn test_sampled_move_is_visited() {
        let mut policy = policy(32, 100);
        let game = GameView::new(Position::startpos());
        let legal = game.position().legal_moves();

        let proposal = policy.propose(&game, None, &legal).unwrap();
        let target = proposal.policy_target.unwrap();
        let prob = target
            .iter()
            .find(|(mv, _)| *mv == proposal.mv)
            .map(|(_, p)| *p)
            .unwrap();
        assert!(prob > 0.0);
    }

    #[test]
    fn test_stopped_search_is_an_error() {
        let mut policy = policy(16, 0);
        let stop = policy.stop_handle().unwrap();
        stop.store(true, Ordering::SeqCst);

        let game = GameView::new(Position::startpos());
        let legal = game.position().legal_moves();
        assert!(policy.propose(&game, None, &legal).is_err());
    }

    #[test]
    fn test_search_stats_accumulate() {
        let mut policy = policy(8, 0);
        let mut game = GameView::new(Position::startpos());

        let legal = game.position().legal_moves();
        let first = policy.propose(&game, None, &legal).unwrap();
        game.push(first.mv);
        let legal = game.position().legal_moves();
        policy.propose(&game, Some(first.mv), &legal).unwrap();

        let stats = policy.search_stats().unwrap();
        assert_eq!(stats.simulations, 16);
    }
}
