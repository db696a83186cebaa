//! Chess-facing core types for the Caissa search engine.
//!
//! This crate provides everything the search needs from the game side:
//! - `Position`: rules adapter over the `chess` crate (legal moves, pure
//!   move application, outcome detection)
//! - `GameView`: position plus a bounded history window for encoding and
//!   repetition detection
//! - `encode`: network input planes and move-space indexing
//! - `hash`: 64-bit position keys for the evaluation cache

pub mod encode;
pub mod game_view;
pub mod hash;
pub mod position;

// Re-export main types for convenience
pub use encode::{
    coords_to_square, encode, move_index, square_to_coords, EncodedPosition, INPUT_SIZE,
    MOVE_SPACE, PLANES,
};
pub use game_view::{GameView, HistoryEntry, HISTORY_WINDOW};
pub use hash::position_key;
pub use position::{piece_value, DrawReason, Outcome, Position, RulesError};

pub use chess::{ChessMove, Color};
