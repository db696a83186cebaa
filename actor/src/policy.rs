//! Move selection policies for the actor

use anyhow::{anyhow, Result};
use chess::{ChessMove, Piece};
use engine_core::{piece_value, GameView};
use mcts::StatsSnapshot;
use rand::prelude::*;
use rand_chacha::ChaCha20Rng;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// A chosen move plus what the learner wants recorded about it.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub mv: ChessMove,
    /// Visit distribution over the legal moves, present for searched moves.
    pub policy_target: Option<Vec<(ChessMove, f32)>>,
    /// Search value for the side to move.
    pub root_value: Option<f32>,
}

impl Proposal {
    pub fn plain(mv: ChessMove) -> Self {
        Self {
            mv,
            policy_target: None,
            root_value: None,
        }
    }
}

/// Something that picks moves during a game.
pub trait MovePolicy: Send {
    fn name(&self) -> &'static str;

    fn propose(
        &mut self,
        game: &GameView,
        last_opponent_move: Option<ChessMove>,
        legal_moves: &[ChessMove],
    ) -> Result<Proposal>;

    /// Cumulative search counters, for policies that search.
    fn search_stats(&self) -> Option<StatsSnapshot> {
        None
    }

    /// Flag that interrupts a running search.
    fn stop_handle(&self) -> Option<Arc<AtomicBool>> {
        None
    }
}

fn require_moves(legal_moves: &[ChessMove]) -> Result<()> {
    if legal_moves.is_empty() {
        return Err(anyhow!("no legal moves to choose from"));
    }
    Ok(())
}

/// Plays a scripted line of UCI moves, then the first legal move.
#[derive(Debug, Clone)]
pub struct FixedPolicy {
    moves: Vec<String>,
    cursor: usize,
}

impl FixedPolicy {
    pub fn new<S: Into<String>>(moves: impl IntoIterator<Item = S>) -> Self {
        Self {
            moves: moves.into_iter().map(Into::into).collect(),
            cursor: 0,
        }
    }
}

impl MovePolicy for FixedPolicy {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn propose(
        &mut self,
        game: &GameView,
        _last_opponent_move: Option<ChessMove>,
        legal_moves: &[ChessMove],
    ) -> Result<Proposal> {
        require_moves(legal_moves)?;

        if let Some(uci) = self.moves.get(self.cursor) {
            self.cursor += 1;
            let mv = game.position().parse_uci(uci)?;
            return Ok(Proposal::plain(mv));
        }
        Ok(Proposal::plain(legal_moves[0]))
    }
}

/// Uniformly random legal moves.
#[derive(Debug)]
pub struct RandomPolicy {
    rng: ChaCha20Rng,
}

impl RandomPolicy {
    pub fn new() -> Self {
        Self {
            rng: ChaCha20Rng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl MovePolicy for RandomPolicy {
    fn name(&self) -> &'static str {
        "random"
    }

    fn propose(
        &mut self,
        _game: &GameView,
        _last_opponent_move: Option<ChessMove>,
        legal_moves: &[ChessMove],
    ) -> Result<Proposal> {
        let mv = legal_moves
            .choose(&mut self.rng)
            .copied()
            .ok_or_else(|| anyhow!("no legal moves to choose from"))?;
        Ok(Proposal::plain(mv))
    }
}

/// One-ply material greed: takes the biggest capture or promotion,
/// random among equals.
#[derive(Debug)]
pub struct MaterialGreedyPolicy {
    rng: ChaCha20Rng,
}

impl MaterialGreedyPolicy {
    pub fn new() -> Self {
        Self {
            rng: ChaCha20Rng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    fn gain(game: &GameView, mv: ChessMove) -> i32 {
        let captured = game
            .position()
            .captured_piece(mv)
            .map(piece_value)
            .unwrap_or(0);
        let promoted = mv
            .get_promotion()
            .map(|p| piece_value(p) - piece_value(Piece::Pawn))
            .unwrap_or(0);
        captured + promoted
    }
}

impl Default for MaterialGreedyPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl MovePolicy for MaterialGreedyPolicy {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn propose(
        &mut self,
        game: &GameView,
        _last_opponent_move: Option<ChessMove>,
        legal_moves: &[ChessMove],
    ) -> Result<Proposal> {
        require_moves(legal_moves)?;

        let gains: Vec<i32> = legal_moves.iter().map(|&mv| Self::gain(game, mv)).collect();
        let best = gains.iter().copied().max().unwrap_or(0);
        let candidates: Vec<ChessMove> = legal_moves
            .iter()
            .zip(&gains)
            .filter(|(_, &g)| g == best)
            .map(|(&mv, _)| mv)
            .collect();

        let mv = candidates
            .choose(&mut self.rng)
            .copied()
            .ok_or_else(|| anyhow!("no legal moves to choose from"))?;
        Ok(Proposal::plain(mv))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::Position;

    fn view(fen: &str) -> GameView {
        GameView::new(Position::from_fen(fen).unwrap())
    }

    #[test]
    fn test_fixed_policy_follows_script_then_falls_back() {
        let game = GameView::new(Position::startpos());
        let legal = game.position().legal_moves();
        let mut policy = FixedPolicy::new(["e2e4"]);

        let first = policy.propose(&game, None, &legal).unwrap();
        assert_eq!(first.mv.to_string(), "e2e4");
        assert!(first.policy_target.is_none());

        let second = policy.propose(&game, None, &legal).unwrap();
        assert_eq!(second.mv, legal[0]);
    }

    #[test]
    fn test_fixed_policy_rejects_illegal_script() {
        let game = GameView::new(Position::startpos());
        let legal = game.position().legal_moves();
        let mut policy = FixedPolicy::new(["e2e5"]);
        assert!(policy.propose(&game, None, &legal).is_err());
    }

    #[test]
    fn test_random_policy_is_legal_and_seeded() {
        let game = GameView::new(Position::startpos());
        let legal = game.position().legal_moves();

        let mut a = RandomPolicy::with_seed(42);
        let mut b = RandomPolicy::with_seed(42);
        for _ in 0..10 {
            let pa = a.propose(&game, None, &legal).unwrap();
            let pb = b.propose(&game, None, &legal).unwrap();
            assert_eq!(pa.mv, pb.mv);
            assert!(legal.contains(&pa.mv));
        }
    }

    #[test]
    fn test_policies_reject_empty_move_list() {
        let game = GameView::new(Position::startpos());
        assert!(RandomPolicy::with_seed(1).propose(&game, None, &[]).is_err());
        assert!(MaterialGreedyPolicy::with_seed(1)
            .propose(&game, None, &[])
            .is_err());
        assert!(FixedPolicy::new(Vec::<String>::new())
            .propose(&game, None, &[])
            .is_err());
    }

    #[test]
    fn test_greedy_takes_the_queen() {
        // Rook takes the queen rather than shuffling.
        let game = view("q3k3/8/8/8/8/8/1p6/R3K3 w - - 0 1");
        let legal = game.position().legal_moves();
        let mut policy = MaterialGreedyPolicy::with_seed(3);
        let proposal = policy.propose(&game, None, &legal).unwrap();
        assert_eq!(proposal.mv.to_string(), "a1a8");
    }

    #[test]
    fn test_greedy_prefers_queen_promotion() {
        let game = view("7k/P7/8/8/8/8/8/K7 w - - 0 1");
        let legal = game.position().legal_moves();
        let mut policy = MaterialGreedyPolicy::with_seed(3);
        let proposal = policy.propose(&game, None, &legal).unwrap();
        assert_eq!(proposal.mv.to_string(), "a7a8q");
    }
}
