//! Default configuration values loaded from config.defaults.toml.
//!
//! The shared TOML file is embedded at compile time, so every binary in the
//! workspace agrees on the same defaults.

use once_cell::sync::Lazy;
use serde::Deserialize;

/// The embedded defaults TOML file (loaded at compile time)
const DEFAULTS_TOML: &str = include_str!("../../../config.defaults.toml");

/// Parsed defaults structure (parsed once at first use)
static DEFAULTS: Lazy<DefaultsConfig> = Lazy::new(|| {
    toml::from_str(DEFAULTS_TOML).expect("config.defaults.toml should be valid TOML")
});

// ============================================================================
// Internal structs for parsing config.defaults.toml
// ============================================================================

#[derive(Debug, Deserialize)]
struct DefaultsConfig {
    common: CommonDefaults,
    search: SearchDefaults,
    exploration: ExplorationDefaults,
    selfplay: SelfPlayDefaults,
}

#[derive(Debug, Deserialize)]
struct CommonDefaults {
    data_dir: String,
    log_level: String,
}

#[derive(Debug, Deserialize)]
struct SearchDefaults {
    num_threads: usize,
    eval_batch_size: usize,
    num_simulations: u32,
    move_time_ms: u64,
    cache_capacity: usize,
    #[serde(default)]
    seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ExplorationDefaults {
    c_puct: f64,
    c_puct_decay: f64,
    c_puct_floor: f64,
    dirichlet_alpha: f64,
    dirichlet_epsilon: f64,
    dirichlet_cutoff: u32,
}

#[derive(Debug, Deserialize)]
struct SelfPlayDefaults {
    games: u32,
    max_plies: u32,
    temp_threshold: u32,
    output: String,
    max_consecutive_failures: u32,
    evaluator: String,
    opponent: String,
}

// ============================================================================
// Public accessor functions
// ============================================================================

// Common
pub fn data_dir() -> &'static str {
    &DEFAULTS.common.data_dir
}
pub fn log_level() -> &'static str {
    &DEFAULTS.common.log_level
}

// Search
pub fn num_threads() -> usize {
    DEFAULTS.search.num_threads
}
pub fn eval_batch_size() -> usize {
    DEFAULTS.search.eval_batch_size
}
pub fn num_simulations() -> u32 {
    DEFAULTS.search.num_simulations
}
pub fn move_time_ms() -> u64 {
    DEFAULTS.search.move_time_ms
}
pub fn cache_capacity() -> usize {
    DEFAULTS.search.cache_capacity
}
pub fn seed() -> Option<u64> {
    DEFAULTS.search.seed
}

// Exploration
pub fn c_puct() -> f64 {
    DEFAULTS.exploration.c_puct
}
pub fn c_puct_decay() -> f64 {
    DEFAULTS.exploration.c_puct_decay
}
pub fn c_puct_floor() -> f64 {
    DEFAULTS.exploration.c_puct_floor
}
pub fn dirichlet_alpha() -> f64 {
    DEFAULTS.exploration.dirichlet_alpha
}
pub fn dirichlet_epsilon() -> f64 {
    DEFAULTS.exploration.dirichlet_epsilon
}
pub fn dirichlet_cutoff() -> u32 {
    DEFAULTS.exploration.dirichlet_cutoff
}

// Self-play
pub fn games() -> u32 {
    DEFAULTS.selfplay.games
}
pub fn max_plies() -> u32 {
    DEFAULTS.selfplay.max_plies
}
pub fn temp_threshold() -> u32 {
    DEFAULTS.selfplay.temp_threshold
}
pub fn output() -> &'static str {
    &DEFAULTS.selfplay.output
}
pub fn max_consecutive_failures() -> u32 {
    DEFAULTS.selfplay.max_consecutive_failures
}
pub fn evaluator() -> &'static str {
    &DEFAULTS.selfplay.evaluator
}
pub fn opponent() -> &'static str {
    &DEFAULTS.selfplay.opponent
}
