//! 64-bit position keys for the evaluation cache.
//!
//! The key starts from the board's Zobrist hash and folds in every other
//! input the encoder reads: the boards in the history window (repetition
//! context), the half-move clock, the game ply and the colour to move.

use chess::Color;

use crate::game_view::GameView;

const STEP_SALT: u64 = 0x9E37_79B9_7F4A_7C15;
const CLOCK_SALT: u64 = 0xD6E8_FEB8_6659_FD93;
const PLY_SALT: u64 = 0xA076_1D64_78BD_642F;
const BLACK_SALT: u64 = 0xE703_7ED1_A0B4_28DB;

/// SplitMix64 finaliser.
#[inline]
pub fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Cache key for the position at the head of `view`.
pub fn position_key(view: &GameView) -> u64 {
    let position = view.position();
    let mut key = mix64(position.zobrist());

    for (step, entry) in view.history().enumerate().skip(1) {
        let salted = entry.board.get_hash() ^ STEP_SALT.wrapping_mul(step as u64);
        key = mix64(key ^ salted);
    }

    key = mix64(key ^ CLOCK_SALT.wrapping_mul(u64::from(position.halfmove_clock()) + 1));
    key = mix64(key ^ PLY_SALT.wrapping_mul(u64::from(position.ply()) + 1));
    if view.side_to_move() == Color::Black {
        key = mix64(key ^ BLACK_SALT);
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Position;

    #[test]
    fn test_same_line_same_key() {
        let a = GameView::from_moves(Position::startpos(), &["e2e4", "e7e5"]).unwrap();
        let b = GameView::from_moves(Position::startpos(), &["e2e4", "e7e5"]).unwrap();
        assert_eq!(position_key(&a), position_key(&b));
    }

    #[test]
    fn test_transposition_with_different_history_differs() {
        let a = GameView::from_moves(Position::startpos(), &["g1f3", "g8f6", "b1c3"]).unwrap();
        let b = GameView::from_moves(Position::startpos(), &["b1c3", "g8f6", "g1f3"]).unwrap();
        assert_eq!(a.position().board(), b.position().board());
        assert_ne!(position_key(&a), position_key(&b));
    }

    #[test]
    fn test_repeated_board_differs_from_first_occurrence() {
        let start = GameView::new(Position::startpos());
        let back = GameView::from_moves(Position::startpos(), &["g1f3", "g8f6", "f3g1", "f6g8"])
            .unwrap();
        assert_eq!(start.position().board(), back.position().board());
        assert_ne!(position_key(&start), position_key(&back));
    }

    #[test]
    fn test_halfmove_clock_changes_key() {
        let a = GameView::new(Position::from_fen("4k3/8/8/8/8/8/8/R3K3 w - - 0 40").unwrap());
        let b = GameView::new(Position::from_fen("4k3/8/8/8/8/8/8/R3K3 w - - 7 40").unwrap());
        assert_ne!(position_key(&a), position_key(&b));
    }

    #[test]
    fn test_mix64_spreads_bits() {
        assert_ne!(mix64(1), mix64(2));
        assert_ne!(mix64(1), 1);
    }
}
