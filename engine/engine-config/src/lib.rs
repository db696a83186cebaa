//! Centralized configuration loading from config.toml.
//!
//! This crate provides configuration structs and loading logic shared
//! across the search engine and the self-play actor.
//!
//! # Configuration Priority
//!
//! Settings are loaded with the following priority (highest to lowest):
//! 1. Environment variables (`CAISSA_<SECTION>_<KEY>`)
//! 2. config.toml file
//! 3. Built-in defaults
//!
//! Command-line flags, where a binary offers them, sit above all three.
//!
//! # Environment Variable Override Pattern
//!
//! ```text
//! CAISSA_<SECTION>_<KEY>=value
//!
//! Examples:
//!     CAISSA_COMMON_DATA_DIR=/data
//!     CAISSA_SEARCH_NUM_THREADS=8
//!     CAISSA_SEARCH_MOVE_TIME_MS=250
//!     CAISSA_EXPLORATION_DIRICHLET_ALPHA=0.15
//!     CAISSA_SELFPLAY_GAMES=100
//! ```

mod defaults;
mod loader;
mod structs;

pub use defaults::*;
pub use loader::{
    apply_env_overrides, load_config, load_from_path, CONFIG_PATH_ENV, CONFIG_SEARCH_PATHS,
};
pub use structs::*;
