//! Game state with a bounded history window.

use std::collections::VecDeque;

use chess::{Board, ChessMove, Color};

use crate::position::{DrawReason, Outcome, Position};

/// Number of (move, resulting position) entries kept for encoding.
pub const HISTORY_WINDOW: usize = 8;

/// One entry of the history window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Move that produced `board`; `None` for the position the view started from.
    pub mv: Option<ChessMove>,
    pub board: Board,
}

/// A position together with the recent history needed to encode it and to
/// detect repetitions.
///
/// The newest window entry is always the current position. Entries beyond
/// [`HISTORY_WINDOW`] fall off silently. Repetition detection additionally
/// keeps the Zobrist hashes of every position since the last capture or pawn
/// move, since a threefold repetition spans more plies than the window holds.
#[derive(Debug, Clone)]
pub struct GameView {
    position: Position,
    window: VecDeque<HistoryEntry>,
    reversible_hashes: Vec<u64>,
}

impl GameView {
    pub fn new(position: Position) -> Self {
        let mut window = VecDeque::with_capacity(HISTORY_WINDOW);
        window.push_back(HistoryEntry {
            mv: None,
            board: *position.board(),
        });
        Self {
            reversible_hashes: vec![position.zobrist()],
            position,
            window,
        }
    }

    /// Rebuild a view by replaying UCI moves from a starting position.
    pub fn from_moves(start: Position, moves: &[&str]) -> Result<Self, crate::RulesError> {
        let mut view = Self::new(start);
        for uci in moves {
            let mv = view.position.parse_uci(uci)?;
            view.push(mv);
        }
        Ok(view)
    }

    /// Play `mv` in place. The move must be legal.
    pub fn push(&mut self, mv: ChessMove) {
        let next = self.position.apply_move(mv);

        if next.halfmove_clock() == 0 {
            self.reversible_hashes.clear();
        }
        self.reversible_hashes.push(next.zobrist());

        if self.window.len() == HISTORY_WINDOW {
            self.window.pop_front();
        }
        self.window.push_back(HistoryEntry {
            mv: Some(mv),
            board: *next.board(),
        });
        self.position = next;
    }

    /// Copy of this view with `mv` played.
    pub fn play(&self, mv: ChessMove) -> GameView {
        let mut next = self.clone();
        next.push(mv);
        next
    }

    #[inline]
    pub fn position(&self) -> &Position {
        &self.position
    }

    #[inline]
    pub fn side_to_move(&self) -> Color {
        self.position.side_to_move()
    }

    #[inline]
    pub fn ply(&self) -> u16 {
        self.position.ply()
    }

    pub fn last_move(&self) -> Option<ChessMove> {
        self.window.back().and_then(|entry| entry.mv)
    }

    /// Window entries, newest (current position) first.
    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> + '_ {
        self.window.iter().rev()
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Earlier occurrences of the current position since the last
    /// irreversible move.
    pub fn repetitions(&self) -> u8 {
        let Some((current, earlier)) = self.reversible_hashes.split_last() else {
            return 0;
        };
        let count = earlier.iter().filter(|&&h| h == *current).count();
        count.min(u8::MAX as usize) as u8
    }

    /// Earlier occurrences of the board at history step `step` (0 = current)
    /// among the older entries of the window.
    pub fn window_repetitions(&self, step: usize) -> u8 {
        let mut newest_first = self.window.iter().rev();
        let Some(target) = newest_first.nth(step) else {
            return 0;
        };
        newest_first.filter(|entry| entry.board == target.board).count() as u8
    }

    /// Full rules outcome for the side to move, repetition included.
    pub fn outcome(&self) -> Outcome {
        match self.position.board_outcome() {
            Outcome::InProgress if self.repetitions() >= 2 => {
                Outcome::Draw(DrawReason::Repetition)
            }
            outcome => outcome,
        }
    }
}
