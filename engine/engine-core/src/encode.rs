//! Position encoder and move-space indexing.
//!
//! Input layout is `[PLANES][8][8]` in row-major order, oriented so the side
//! to move always plays "up the board". For each of [`HISTORY_STEPS`] history
//! steps (newest first, missing steps left zero):
//!
//! | Plane offset | Content |
//! |---|---|
//! | 0..6   | side-to-move pieces (P, N, B, R, Q, K) |
//! | 6..12  | opponent pieces |
//! | 12     | position seen at least once before in the window |
//! | 13     | position seen at least twice before in the window |
//!
//! followed by seven constant planes: colour, game ply, own castling
//! (king side, queen side), opponent castling, half-move clock.

use chess::{ChessMove, Color, Piece, Square};

use crate::game_view::{GameView, HISTORY_WINDOW};

pub const HISTORY_STEPS: usize = HISTORY_WINDOW;
pub const PLANES_PER_STEP: usize = 14;
pub const AUX_PLANES: usize = 7;
pub const PLANES: usize = HISTORY_STEPS * PLANES_PER_STEP + AUX_PLANES;
pub const BOARD_SQUARES: usize = 64;
pub const INPUT_SIZE: usize = PLANES * BOARD_SQUARES;

/// Queen moves and promotions use `from * 64 + to`.
pub const QUEEN_MOVE_SLOTS: usize = 64 * 64;
/// Under-promotions: 8 from-files x 3 directions x 3 pieces.
pub const UNDERPROMOTION_SLOTS: usize = 8 * 3 * 3;
pub const MOVE_SPACE: usize = QUEEN_MOVE_SLOTS + UNDERPROMOTION_SLOTS;

const AUX_BASE: usize = HISTORY_STEPS * PLANES_PER_STEP;
const PLY_SCALE: f32 = 512.0;
const HALFMOVE_SCALE: f32 = 100.0;

/// Linear square index (`a1 = 0`, `h8 = 63`) to `(file, rank)`.
#[inline]
pub fn square_to_coords(index: usize) -> (usize, usize) {
    (index % 8, index / 8)
}

/// `(file, rank)` back to the linear square index.
#[inline]
pub fn coords_to_square(file: usize, rank: usize) -> usize {
    rank * 8 + file
}

/// Square index as seen by `perspective` (ranks mirrored for black).
#[inline]
pub fn oriented_index(square: Square, perspective: Color) -> usize {
    let index = square.to_index();
    match perspective {
        Color::White => index,
        Color::Black => index ^ 56,
    }
}

/// Policy index of `mv` when played by `side`.
pub fn move_index(mv: ChessMove, side: Color) -> usize {
    let from = oriented_index(mv.get_source(), side);
    let to = oriented_index(mv.get_dest(), side);

    let under = match mv.get_promotion() {
        Some(Piece::Knight) => Some(0),
        Some(Piece::Bishop) => Some(1),
        Some(Piece::Rook) => Some(2),
        _ => None,
    };

    match under {
        None => from * 64 + to,
        Some(piece) => {
            let (from_file, _) = square_to_coords(from);
            let (to_file, _) = square_to_coords(to);
            let direction = (to_file + 1).saturating_sub(from_file).min(2);
            QUEEN_MOVE_SLOTS + (from_file * 3 + direction) * 3 + piece
        }
    }
}

/// Encoded network input for one position.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedPosition {
    planes: Box<[f32]>,
}

impl EncodedPosition {
    pub fn zeros() -> Self {
        Self {
            planes: vec![0.0; INPUT_SIZE].into_boxed_slice(),
        }
    }

    /// Tensor shape of one row: `[planes, rank, file]`.
    pub fn shape(&self) -> [usize; 3] {
        [PLANES, 8, 8]
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.planes
    }

    #[inline]
    pub fn plane(&self, plane: usize) -> &[f32] {
        &self.planes[plane * BOARD_SQUARES..(plane + 1) * BOARD_SQUARES]
    }

    fn set(&mut self, plane: usize, square: usize, value: f32) {
        self.planes[plane * BOARD_SQUARES + square] = value;
    }

    fn fill(&mut self, plane: usize, value: f32) {
        self.planes[plane * BOARD_SQUARES..(plane + 1) * BOARD_SQUARES].fill(value);
    }
}

/// Encode a game view into network input planes.
pub fn encode(view: &GameView) -> EncodedPosition {
    let mut out = EncodedPosition::zeros();
    let us = view.side_to_move();

    for (step, entry) in view.history().take(HISTORY_STEPS).enumerate() {
        let base = step * PLANES_PER_STEP;
        let board = &entry.board;

        for (piece_index, &piece) in chess::ALL_PIECES.iter().enumerate() {
            for (offset, color) in [(0, us), (6, !us)] {
                let bb = *board.pieces(piece) & *board.color_combined(color);
                for square in bb {
                    out.set(base + offset + piece_index, oriented_index(square, us), 1.0);
                }
            }
        }

        let reps = view.window_repetitions(step);
        if reps >= 1 {
            out.fill(base + 12, 1.0);
        }
        if reps >= 2 {
            out.fill(base + 13, 1.0);
        }
    }

    let position = view.position();
    let board = position.board();
    let ours = board.castle_rights(us);
    let theirs = board.castle_rights(!us);
    let flag = |b: bool| if b { 1.0 } else { 0.0 };

    out.fill(AUX_BASE, flag(us == Color::White));
    out.fill(AUX_BASE + 1, f32::from(position.ply()) / PLY_SCALE);
    out.fill(AUX_BASE + 2, flag(ours.has_kingside()));
    out.fill(AUX_BASE + 3, flag(ours.has_queenside()));
    out.fill(AUX_BASE + 4, flag(theirs.has_kingside()));
    out.fill(AUX_BASE + 5, flag(theirs.has_queenside()));
    out.fill(
        AUX_BASE + 6,
        f32::from(position.halfmove_clock()) / HALFMOVE_SCALE,
    );

    out
}

/// Material balance (in pawns, side to move positive) read back from the
/// newest history step of an encoded input row.
pub fn material_from_planes(row: &[f32]) -> f32 {
    const VALUES: [f32; 6] = [1.0, 3.0, 3.0, 5.0, 9.0, 0.0];
    let plane_sum = |plane: usize| -> f32 {
        row.get(plane * BOARD_SQUARES..(plane + 1) * BOARD_SQUARES)
            .map(|squares| squares.iter().sum())
            .unwrap_or(0.0)
    };
    VALUES
        .iter()
        .enumerate()
        .map(|(i, value)| value * (plane_sum(i) - plane_sum(6 + i)))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Position;
    use chess::{File, Rank};

    #[test]
    fn test_coordinate_round_trip() {
        let a8 = Square::make_square(Rank::Eighth, File::A).to_index();
        let c7 = Square::make_square(Rank::Seventh, File::C).to_index();

        assert_eq!(square_to_coords(a8), (0, 7));
        assert_eq!(square_to_coords(c7), (2, 6));
        assert_eq!(coords_to_square(0, 7), a8);
        assert_eq!(coords_to_square(2, 6), c7);

        for index in 0..64 {
            let (file, rank) = square_to_coords(index);
            assert_eq!(coords_to_square(file, rank), index);
        }
    }

    #[test]
    fn test_startpos_planes() {
        let view = GameView::new(Position::startpos());
        let enc = encode(&view);

        assert_eq!(enc.shape(), [PLANES, 8, 8]);
        assert_eq!(enc.as_slice().len(), INPUT_SIZE);

        // Own pawns on rank 2, opponent pawns on rank 7.
        assert_eq!(enc.plane(0).iter().sum::<f32>(), 8.0);
        assert_eq!(enc.plane(0)[coords_to_square(4, 1)], 1.0);
        assert_eq!(enc.plane(6)[coords_to_square(4, 6)], 1.0);

        // No history beyond the first step.
        assert!(enc.plane(PLANES_PER_STEP).iter().all(|&v| v == 0.0));

        assert!(enc.plane(AUX_BASE).iter().all(|&v| v == 1.0));
        assert!(enc.plane(AUX_BASE + 2).iter().all(|&v| v == 1.0));
        assert!(enc.plane(AUX_BASE + 6).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_black_to_move_is_mirrored() {
        let view = GameView::from_moves(Position::startpos(), &["e2e4"]).unwrap();
        let enc = encode(&view);

        // Black's own pawns appear on the second rank from its perspective.
        assert_eq!(enc.plane(0)[coords_to_square(4, 1)], 1.0);
        // White's e-pawn on e4 is seen on e5 after mirroring.
        assert_eq!(enc.plane(6)[coords_to_square(4, 4)], 1.0);
        assert!(enc.plane(AUX_BASE).iter().all(|&v| v == 0.0));
        // Previous step is the start position, also seen by black.
        assert_eq!(enc.plane(PLANES_PER_STEP)[coords_to_square(4, 1)], 1.0);
    }

    #[test]
    fn test_repetition_planes() {
        let view =
            GameView::from_moves(Position::startpos(), &["g1f3", "g8f6", "f3g1", "f6g8"]).unwrap();
        let enc = encode(&view);
        assert!(enc.plane(12).iter().all(|&v| v == 1.0));
        assert!(enc.plane(13).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_move_index_is_in_range_and_unique() {
        let pos = Position::startpos();
        let mut seen = std::collections::HashSet::new();
        for mv in pos.legal_moves() {
            let idx = move_index(mv, pos.side_to_move());
            assert!(idx < MOVE_SPACE);
            assert!(seen.insert(idx));
        }
    }

    #[test]
    fn test_mirrored_moves_share_index() {
        let white = Position::startpos();
        let black = white.apply_move(white.parse_uci("g1f3").unwrap());

        let e2e4 = white.parse_uci("e2e4").unwrap();
        let e7e5 = black.parse_uci("e7e5").unwrap();
        assert_eq!(
            move_index(e2e4, Color::White),
            move_index(e7e5, Color::Black)
        );
    }

    #[test]
    fn test_underpromotions_use_extra_slots() {
        let pos = Position::from_fen("1r5k/P7/8/8/8/8/8/7K w - - 0 1").unwrap();
        let side = pos.side_to_move();
        let mut indices: Vec<usize> = pos
            .legal_moves()
            .into_iter()
            .filter(|mv| mv.get_promotion().is_some())
            .map(|mv| move_index(mv, side))
            .collect();
        indices.sort_unstable();
        indices.dedup();

        // a7a8 and a7xb8, each with four promotion pieces.
        assert_eq!(indices.len(), 8);
        let under = indices.iter().filter(|&&i| i >= QUEEN_MOVE_SLOTS).count();
        assert_eq!(under, 6);
        assert!(indices.iter().all(|&i| i < MOVE_SPACE));
    }

    #[test]
    fn test_material_from_planes() {
        let view =
            GameView::new(Position::from_fen("4k3/8/8/8/8/8/8/Q3K3 w - - 0 1").unwrap());
        let enc = encode(&view);
        assert_eq!(material_from_planes(enc.as_slice()), 9.0);
    }
}
