//! Rules-engine adapter over the `chess` crate.
//!
//! [`Position`] wraps an immutable [`chess::Board`] and adds the two counters
//! the board does not track: the half-move clock (fifty-move rule) and the
//! game ply. Applying a move never mutates the source position.

use std::fmt;
use std::str::FromStr;

use chess::{BitBoard, Board, BoardStatus, ChessMove, Color, MoveGen, Piece, Square};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Half-move clock value at which the fifty-move rule applies.
pub const FIFTY_MOVE_PLIES: u16 = 100;

/// Errors produced by the rules adapter.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RulesError {
    #[error("invalid FEN '{fen}': {reason}")]
    InvalidFen { fen: String, reason: String },

    #[error("move '{0}' is not legal in this position")]
    IllegalMove(String),
}

/// Why a game ended in a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawReason {
    Stalemate,
    InsufficientMaterial,
    Repetition,
    FiftyMoveRule,
    MaxPlies,
}

/// Game outcome from the perspective of the side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    InProgress,
    Win,
    Loss,
    Draw(DrawReason),
}

impl Outcome {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Outcome::InProgress)
    }

    /// Exact value for the side to move, `None` while the game is running.
    pub fn value(self) -> Option<f32> {
        match self {
            Outcome::InProgress => None,
            Outcome::Win => Some(1.0),
            Outcome::Loss => Some(-1.0),
            Outcome::Draw(_) => Some(0.0),
        }
    }
}

/// A chess position plus the counters needed for draw detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    board: Board,
    halfmove_clock: u16,
    ply: u16,
}

impl Default for Position {
    fn default() -> Self {
        Self::startpos()
    }
}

impl Position {
    /// The standard initial position.
    pub fn startpos() -> Self {
        Self {
            board: Board::default(),
            halfmove_clock: 0,
            ply: 0,
        }
    }

    /// Parse a FEN string. Missing move counters default to `0 1`.
    pub fn from_fen(fen: &str) -> Result<Self, RulesError> {
        let invalid = |reason: String| RulesError::InvalidFen {
            fen: fen.to_string(),
            reason,
        };

        let board = Board::from_str(fen).map_err(|e| invalid(e.to_string()))?;

        let mut fields = fen.split_whitespace().skip(4);
        let halfmove_clock = match fields.next() {
            Some(s) => s
                .parse::<u16>()
                .map_err(|_| invalid(format!("bad half-move clock '{s}'")))?,
            None => 0,
        };
        let fullmove = match fields.next() {
            Some(s) => s
                .parse::<u16>()
                .map_err(|_| invalid(format!("bad full-move number '{s}'")))?,
            None => 1,
        };

        let black_to_move = board.side_to_move() == Color::Black;
        let ply = (u32::from(fullmove.max(1)) - 1) * 2 + u32::from(black_to_move);
        let ply = u16::try_from(ply)
            .map_err(|_| invalid(format!("full-move number {fullmove} is out of range")))?;

        Ok(Self {
            board,
            halfmove_clock,
            ply,
        })
    }

    /// FEN of this position including move counters.
    pub fn to_fen(&self) -> String {
        let board_fen = self.board.to_string();
        let placement: Vec<&str> = board_fen.split_whitespace().take(4).collect();
        format!(
            "{} {} {}",
            placement.join(" "),
            self.halfmove_clock,
            self.ply / 2 + 1
        )
    }

    #[inline]
    pub fn board(&self) -> &Board {
        &self.board
    }

    #[inline]
    pub fn side_to_move(&self) -> Color {
        self.board.side_to_move()
    }

    #[inline]
    pub fn halfmove_clock(&self) -> u16 {
        self.halfmove_clock
    }

    /// Plies played since the start of the game.
    #[inline]
    pub fn ply(&self) -> u16 {
        self.ply
    }

    /// Zobrist hash of the board (pieces, castling, en passant, side to move).
    #[inline]
    pub fn zobrist(&self) -> u64 {
        self.board.get_hash()
    }

    pub fn legal_moves(&self) -> Vec<ChessMove> {
        MoveGen::new_legal(&self.board).collect()
    }

    pub fn is_legal(&self, mv: ChessMove) -> bool {
        self.board.legal(mv)
    }

    /// Find the legal move with the given UCI spelling (e.g. `e2e4`, `e7e8q`).
    pub fn parse_uci(&self, uci: &str) -> Result<ChessMove, RulesError> {
        MoveGen::new_legal(&self.board)
            .find(|mv| mv.to_string() == uci)
            .ok_or_else(|| RulesError::IllegalMove(uci.to_string()))
    }

    /// Apply a legal move, returning the resulting position.
    pub fn apply_move(&self, mv: ChessMove) -> Position {
        let irreversible = self.is_capture(mv)
            || self.board.piece_on(mv.get_source()) == Some(Piece::Pawn);

        Position {
            board: self.board.make_move_new(mv),
            halfmove_clock: if irreversible {
                0
            } else {
                self.halfmove_clock.saturating_add(1)
            },
            ply: self.ply.saturating_add(1),
        }
    }

    /// Whether `mv` captures a piece, en passant included.
    pub fn is_capture(&self, mv: ChessMove) -> bool {
        self.captured_piece(mv).is_some()
    }

    /// The piece taken by `mv`, if any.
    pub fn captured_piece(&self, mv: ChessMove) -> Option<Piece> {
        if let Some(piece) = self.board.piece_on(mv.get_dest()) {
            return Some(piece);
        }
        let is_pawn = self.board.piece_on(mv.get_source()) == Some(Piece::Pawn);
        let changes_file = mv.get_source().get_file() != mv.get_dest().get_file();
        (is_pawn && changes_file).then_some(Piece::Pawn)
    }

    /// Outcome decided by the board alone (no repetition context).
    ///
    /// Checkmate takes precedence over the fifty-move rule.
    pub fn board_outcome(&self) -> Outcome {
        match self.board.status() {
            BoardStatus::Checkmate => return Outcome::Loss,
            BoardStatus::Stalemate => return Outcome::Draw(DrawReason::Stalemate),
            BoardStatus::Ongoing => {}
        }
        if self.insufficient_material() {
            return Outcome::Draw(DrawReason::InsufficientMaterial);
        }
        if self.halfmove_clock >= FIFTY_MOVE_PLIES {
            return Outcome::Draw(DrawReason::FiftyMoveRule);
        }
        Outcome::InProgress
    }

    /// K v K, K+minor v K, and K+B v K+B with bishops on the same colour.
    pub fn insufficient_material(&self) -> bool {
        let board = &self.board;
        let heavy = *board.pieces(Piece::Pawn) | *board.pieces(Piece::Rook) | *board.pieces(Piece::Queen);
        if heavy.popcnt() > 0 {
            return false;
        }

        let knights = *board.pieces(Piece::Knight);
        let bishops = *board.pieces(Piece::Bishop);
        match (knights | bishops).popcnt() {
            0 | 1 => true,
            2 if knights.popcnt() == 0 => {
                let white = bishops & *board.color_combined(Color::White);
                let black = bishops & *board.color_combined(Color::Black);
                white.popcnt() == 1
                    && black.popcnt() == 1
                    && square_shade(white) == square_shade(black)
            }
            _ => false,
        }
    }

    /// Material balance in pawns from the side to move's perspective.
    pub fn material_balance(&self) -> i32 {
        let us = self.side_to_move();
        let count = |color: Color| -> i32 {
            chess::ALL_PIECES
                .iter()
                .map(|&piece| {
                    let bb = *self.board.pieces(piece) & *self.board.color_combined(color);
                    bb.popcnt() as i32 * piece_value(piece)
                })
                .sum()
        };
        count(us) - count(!us)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_fen())
    }
}

/// Conventional material value of a piece in pawns (king counts zero).
pub fn piece_value(piece: Piece) -> i32 {
    match piece {
        Piece::Pawn => 1,
        Piece::Knight | Piece::Bishop => 3,
        Piece::Rook => 5,
        Piece::Queen => 9,
        Piece::King => 0,
    }
}

/// 0 for dark squares, 1 for light squares. Expects a single-square bitboard.
fn square_shade(bb: BitBoard) -> usize {
    let sq: Square = bb.to_square();
    (sq.get_file().to_index() + sq.get_rank().to_index()) % 2
}
