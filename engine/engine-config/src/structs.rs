//! Configuration struct definitions.
//!
//! All config structs with serde deserialization support and default values.

use std::time::Duration;

use crate::defaults;
use serde::Deserialize;

// ============================================================================
// Serde default functions (required for #[serde(default = "...")])
// These call the accessor functions from defaults module
// ============================================================================

fn d_data_dir() -> String {
    defaults::data_dir().into()
}
fn d_log_level() -> String {
    defaults::log_level().into()
}
fn d_num_threads() -> usize {
    defaults::num_threads()
}
fn d_eval_batch_size() -> usize {
    defaults::eval_batch_size()
}
fn d_num_sims() -> u32 {
    defaults::num_simulations()
}
fn d_move_time_ms() -> u64 {
    defaults::move_time_ms()
}
fn d_cache_capacity() -> usize {
    defaults::cache_capacity()
}
fn d_seed() -> Option<u64> {
    defaults::seed()
}
fn d_c_puct() -> f64 {
    defaults::c_puct()
}
fn d_c_puct_decay() -> f64 {
    defaults::c_puct_decay()
}
fn d_c_puct_floor() -> f64 {
    defaults::c_puct_floor()
}
fn d_dirichlet_alpha() -> f64 {
    defaults::dirichlet_alpha()
}
fn d_dirichlet_epsilon() -> f64 {
    defaults::dirichlet_epsilon()
}
fn d_dirichlet_cutoff() -> u32 {
    defaults::dirichlet_cutoff()
}
fn d_games() -> u32 {
    defaults::games()
}
fn d_max_plies() -> u32 {
    defaults::max_plies()
}
fn d_temp_threshold() -> u32 {
    defaults::temp_threshold()
}
fn d_output() -> String {
    defaults::output().into()
}
fn d_max_failures() -> u32 {
    defaults::max_consecutive_failures()
}
fn d_evaluator() -> String {
    defaults::evaluator().into()
}
fn d_opponent() -> String {
    defaults::opponent().into()
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Root configuration structure matching config.toml
#[derive(Debug, Deserialize, Default, Clone)]
pub struct CentralConfig {
    #[serde(default)]
    pub common: CommonConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub exploration: ExplorationConfig,
    #[serde(default)]
    pub selfplay: SelfPlayConfig,
}

/// Common configuration shared by all components
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CommonConfig {
    #[serde(default = "d_data_dir")]
    pub data_dir: String,
    #[serde(default = "d_log_level")]
    pub log_level: String,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::data_dir().into(),
            log_level: defaults::log_level().into(),
        }
    }
}

/// Search worker pool and budget.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    #[serde(default = "d_num_threads")]
    pub num_threads: usize,
    #[serde(default = "d_eval_batch_size")]
    pub eval_batch_size: usize,
    /// 0 = unset.
    #[serde(default = "d_num_sims")]
    pub num_simulations: u32,
    /// 0 = unset.
    #[serde(default = "d_move_time_ms")]
    pub move_time_ms: u64,
    #[serde(default = "d_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "d_seed")]
    pub seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            num_threads: defaults::num_threads(),
            eval_batch_size: defaults::eval_batch_size(),
            num_simulations: defaults::num_simulations(),
            move_time_ms: defaults::move_time_ms(),
            cache_capacity: defaults::cache_capacity(),
            seed: defaults::seed(),
        }
    }
}

impl SearchConfig {
    pub fn simulation_limit(&self) -> Option<u32> {
        (self.num_simulations > 0).then_some(self.num_simulations)
    }

    pub fn move_time_limit(&self) -> Option<Duration> {
        (self.move_time_ms > 0).then(|| Duration::from_millis(self.move_time_ms))
    }
}

/// Exploration constant schedule and root noise.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExplorationConfig {
    #[serde(default = "d_c_puct")]
    pub c_puct: f64,
    #[serde(default = "d_c_puct_decay")]
    pub c_puct_decay: f64,
    #[serde(default = "d_c_puct_floor")]
    pub c_puct_floor: f64,
    #[serde(default = "d_dirichlet_alpha")]
    pub dirichlet_alpha: f64,
    #[serde(default = "d_dirichlet_epsilon")]
    pub dirichlet_epsilon: f64,
    #[serde(default = "d_dirichlet_cutoff")]
    pub dirichlet_cutoff: u32,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            c_puct: defaults::c_puct(),
            c_puct_decay: defaults::c_puct_decay(),
            c_puct_floor: defaults::c_puct_floor(),
            dirichlet_alpha: defaults::dirichlet_alpha(),
            dirichlet_epsilon: defaults::dirichlet_epsilon(),
            dirichlet_cutoff: defaults::dirichlet_cutoff(),
        }
    }
}

/// Self-play driver configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SelfPlayConfig {
    #[serde(default = "d_games")]
    pub games: u32,
    #[serde(default = "d_max_plies")]
    pub max_plies: u32,
    #[serde(default = "d_temp_threshold")]
    pub temp_threshold: u32,
    #[serde(default = "d_output")]
    pub output: String,
    #[serde(default = "d_max_failures")]
    pub max_consecutive_failures: u32,
    /// `uniform` or `material`.
    #[serde(default = "d_evaluator")]
    pub evaluator: String,
    /// `self`, `random` or `greedy`.
    #[serde(default = "d_opponent")]
    pub opponent: String,
}

impl Default for SelfPlayConfig {
    fn default() -> Self {
        Self {
            games: defaults::games(),
            max_plies: defaults::max_plies(),
            temp_threshold: defaults::temp_threshold(),
            output: defaults::output().into(),
            max_consecutive_failures: defaults::max_consecutive_failures(),
            evaluator: defaults::evaluator().into(),
            opponent: defaults::opponent().into(),
        }
    }
}
