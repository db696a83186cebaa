//! Configuration for the self-play actor
//!
//! Configuration is loaded from config.toml with environment variable overrides.
//! CLI arguments take highest priority, followed by env vars, then config.toml.

use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};
use engine_config::{load_config, CentralConfig};
use mcts::{
    Evaluator, ExplorationHooks, MaterialEvaluator, MctsConfig, SearchBudget, UniformEvaluator,
};
use once_cell::sync::Lazy;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::level_filters::LevelFilter;

// Load central config once at startup
static CENTRAL_CONFIG: Lazy<CentralConfig> = Lazy::new(load_config);

/// Leaf evaluator backing the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EvaluatorKind {
    Uniform,
    Material,
}

impl EvaluatorKind {
    pub fn build(self) -> Arc<dyn Evaluator> {
        match self {
            EvaluatorKind::Uniform => Arc::new(UniformEvaluator::new()),
            EvaluatorKind::Material => Arc::new(MaterialEvaluator::default()),
        }
    }
}

/// Who the searching side plays against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OpponentKind {
    /// The search plays both colours.
    #[value(name = "self")]
    SelfPlay,
    Random,
    Greedy,
}

// Default value functions that read from central config
fn default_games() -> u32 {
    CENTRAL_CONFIG.selfplay.games
}

fn default_num_threads() -> usize {
    CENTRAL_CONFIG.search.num_threads
}

fn default_eval_batch_size() -> usize {
    CENTRAL_CONFIG.search.eval_batch_size
}

fn default_cache_capacity() -> usize {
    CENTRAL_CONFIG.search.cache_capacity
}

fn default_temp_threshold() -> u32 {
    CENTRAL_CONFIG.selfplay.temp_threshold
}

fn default_max_plies() -> u32 {
    CENTRAL_CONFIG.selfplay.max_plies
}

fn default_max_failures() -> u32 {
    CENTRAL_CONFIG.selfplay.max_consecutive_failures
}

fn default_evaluator() -> EvaluatorKind {
    EvaluatorKind::from_str(&CENTRAL_CONFIG.selfplay.evaluator, true)
        .unwrap_or(EvaluatorKind::Material)
}

fn default_opponent() -> OpponentKind {
    OpponentKind::from_str(&CENTRAL_CONFIG.selfplay.opponent, true)
        .unwrap_or(OpponentKind::SelfPlay)
}

fn default_output() -> String {
    CENTRAL_CONFIG.selfplay.output.clone()
}

fn default_data_dir() -> String {
    CENTRAL_CONFIG.common.data_dir.clone()
}

fn default_log_level() -> String {
    CENTRAL_CONFIG.common.log_level.clone()
}

fn default_c_puct() -> f32 {
    CENTRAL_CONFIG.exploration.c_puct as f32
}

fn default_c_puct_decay() -> f32 {
    CENTRAL_CONFIG.exploration.c_puct_decay as f32
}

fn default_c_puct_floor() -> f32 {
    CENTRAL_CONFIG.exploration.c_puct_floor as f32
}

fn default_dirichlet_alpha() -> f32 {
    CENTRAL_CONFIG.exploration.dirichlet_alpha as f32
}

fn default_dirichlet_epsilon() -> f32 {
    CENTRAL_CONFIG.exploration.dirichlet_epsilon as f32
}

fn default_dirichlet_cutoff() -> u32 {
    CENTRAL_CONFIG.exploration.dirichlet_cutoff
}

#[derive(Parser, Debug, Clone)]
#[command(name = "actor")]
#[command(about = "Chess self-play actor driven by parallel MCTS")]
#[command(
    long_about = "Plays chess games with a multi-threaded MCTS and writes one JSON line per
searched position (FEN, visit distribution, final outcome) for training.

Configuration is loaded from config.toml with environment variable overrides.
CLI arguments take highest priority."
)]
pub struct Config {
    /// Number of games to play
    #[arg(long, default_value_t = default_games())]
    pub games: u32,

    /// Search worker threads
    #[arg(long, default_value_t = default_num_threads())]
    pub num_threads: usize,

    /// Leaves per evaluator call
    #[arg(long, default_value_t = default_eval_batch_size())]
    pub eval_batch_size: usize,

    /// Evaluations kept in the LRU cache
    #[arg(long, default_value_t = default_cache_capacity())]
    pub cache_capacity: usize,

    /// Simulations per move (overrides the configured budget)
    #[arg(long, conflicts_with = "move_time_ms")]
    pub num_simulations: Option<u32>,

    /// Milliseconds per move (overrides the configured budget)
    #[arg(long)]
    pub move_time_ms: Option<u64>,

    /// Sample moves from the visit distribution before this ply, play the
    /// most visited move after it
    #[arg(long, default_value_t = default_temp_threshold())]
    pub temp_threshold: u32,

    /// Seed for search noise, move sampling and opponents
    #[arg(long)]
    pub seed: Option<u64>,

    /// Adjudicate a draw after this many plies
    #[arg(long, default_value_t = default_max_plies())]
    pub max_plies: u32,

    /// Leaf evaluator
    #[arg(long, value_enum, default_value_t = default_evaluator())]
    pub evaluator: EvaluatorKind,

    /// Opponent of the searching side
    #[arg(long, value_enum, default_value_t = default_opponent())]
    pub opponent: OpponentKind,

    /// Training samples (JSON lines); relative paths live under --data-dir
    #[arg(long, default_value_t = default_output())]
    pub output: String,

    /// Directory for samples and actor_stats.json
    #[arg(long, default_value_t = default_data_dir())]
    pub data_dir: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value_t = default_log_level())]
    pub log_level: String,

    /// Stop after this many failed games in a row
    #[arg(long, default_value_t = default_max_failures())]
    pub max_consecutive_failures: u32,

    /// Exploration constant at ply 0
    #[arg(long, default_value_t = default_c_puct())]
    pub c_puct: f32,

    /// Per-ply decay factor of the exploration constant
    #[arg(long, default_value_t = default_c_puct_decay())]
    pub c_puct_decay: f32,

    /// Lower bound of the exploration constant
    #[arg(long, default_value_t = default_c_puct_floor())]
    pub c_puct_floor: f32,

    /// Dirichlet noise concentration at the root
    #[arg(long, default_value_t = default_dirichlet_alpha())]
    pub dirichlet_alpha: f32,

    /// Weight of the root noise
    #[arg(long, default_value_t = default_dirichlet_epsilon())]
    pub dirichlet_epsilon: f32,

    /// Root noise is applied while the game ply is below this
    #[arg(long, default_value_t = default_dirichlet_cutoff())]
    pub dirichlet_cutoff: u32,

    /// Budget from config.toml, used when neither budget flag is given.
    #[arg(skip = CENTRAL_CONFIG.search.simulation_limit())]
    pub configured_simulations: Option<u32>,

    #[arg(skip = CENTRAL_CONFIG.search.move_time_limit())]
    pub configured_move_time: Option<Duration>,

    #[arg(skip = CENTRAL_CONFIG.search.seed)]
    pub configured_seed: Option<u64>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.games == 0 {
            return Err(anyhow!("games must be greater than 0"));
        }

        if self.max_plies == 0 {
            return Err(anyhow!("max_plies must be greater than 0"));
        }

        if self.max_consecutive_failures == 0 {
            return Err(anyhow!("max_consecutive_failures must be greater than 0"));
        }

        if self.output.is_empty() {
            return Err(anyhow!("output cannot be empty"));
        }

        if self.log_level.parse::<LevelFilter>().is_err() {
            return Err(anyhow!(
                "invalid log level '{}', expected one of trace, debug, info, warn, error",
                self.log_level
            ));
        }

        self.mcts_config()?
            .validate()
            .map_err(|e| anyhow!("invalid search settings: {}", e))?;

        Ok(())
    }

    /// Per-move budget: CLI flags win, otherwise the configured limits.
    pub fn budget(&self) -> Result<SearchBudget> {
        let limits = match (self.num_simulations, self.move_time_ms) {
            (None, None) => (self.configured_simulations, self.configured_move_time),
            (sims, ms) => (sims, ms.map(Duration::from_millis)),
        };
        SearchBudget::from_limits(limits.0, limits.1).map_err(|e| anyhow!("{}", e))
    }

    pub fn mcts_config(&self) -> Result<MctsConfig> {
        Ok(MctsConfig {
            num_threads: self.num_threads,
            eval_batch_size: self.eval_batch_size,
            budget: self.budget()?,
            cache_capacity: self.cache_capacity,
            dirichlet_alpha: self.dirichlet_alpha,
            dirichlet_epsilon: self.dirichlet_epsilon,
            seed: self.seed(),
        })
    }

    /// `--seed`, else the configured seed.
    pub fn seed(&self) -> Option<u64> {
        self.seed.or(self.configured_seed)
    }

    pub fn hooks(&self) -> ExplorationHooks {
        ExplorationHooks::for_training(
            self.c_puct,
            self.c_puct_decay,
            self.c_puct_floor,
            self.dirichlet_cutoff,
        )
    }

    /// Where samples are appended.
    pub fn output_path(&self) -> PathBuf {
        let output = PathBuf::from(&self.output);
        if output.is_absolute() {
            output
        } else {
            PathBuf::from(&self.data_dir).join(output)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn base_config() -> Config {
        Config {
            games: 2,
            num_threads: 1,
            eval_batch_size: 4,
            cache_capacity: 1024,
            num_simulations: Some(8),
            move_time_ms: None,
            temp_threshold: 4,
            seed: Some(7),
            max_plies: 12,
            evaluator: EvaluatorKind::Uniform,
            opponent: OpponentKind::SelfPlay,
            output: "samples.jsonl".into(),
            data_dir: "../data".into(),
            log_level: "info".into(),
            max_consecutive_failures: 3,
            c_puct: 1.25,
            c_puct_decay: 1.0,
            c_puct_floor: 1.25,
            dirichlet_alpha: 0.3,
            dirichlet_epsilon: 0.25,
            dirichlet_cutoff: 30,
            configured_simulations: Some(800),
            configured_move_time: None,
            configured_seed: None,
        }
    }

    #[test]
    fn validate_accepts_valid_configuration() {
        let cfg = base_config();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut cfg = base_config();
        cfg.log_level = "nope".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("invalid log level"));
    }

    #[test]
    fn validate_rejects_zero_games() {
        let mut cfg = base_config();
        cfg.games = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("games"));
    }

    #[test]
    fn validate_rejects_zero_threads() {
        let mut cfg = base_config();
        cfg.num_threads = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("num_threads"));
    }

    #[test]
    fn cli_budget_overrides_configured_budget() {
        let mut cfg = base_config();
        assert_eq!(cfg.budget().unwrap(), SearchBudget::Simulations(8));

        cfg.num_simulations = None;
        cfg.move_time_ms = Some(40);
        assert_eq!(
            cfg.budget().unwrap(),
            SearchBudget::Time(Duration::from_millis(40))
        );

        cfg.move_time_ms = None;
        assert_eq!(cfg.budget().unwrap(), SearchBudget::Simulations(800));
    }

    #[test]
    fn conflicting_configured_budget_is_rejected() {
        let mut cfg = base_config();
        cfg.num_simulations = None;
        cfg.configured_move_time = Some(Duration::from_millis(100));
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("conflicting"));
    }

    #[test]
    fn configured_seed_is_the_fallback() {
        let mut cfg = base_config();
        cfg.configured_seed = Some(99);
        assert_eq!(cfg.seed(), Some(7));

        cfg.seed = None;
        assert_eq!(cfg.seed(), Some(99));
        assert_eq!(cfg.mcts_config().unwrap().seed, Some(99));
    }

    #[test]
    fn cli_rejects_both_budget_flags() {
        let result = Config::try_parse_from([
            "actor",
            "--num-simulations",
            "10",
            "--move-time-ms",
            "100",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_parses_enums() {
        let cfg =
            Config::try_parse_from(["actor", "--opponent", "self", "--evaluator", "uniform"])
                .unwrap();
        assert_eq!(cfg.opponent, OpponentKind::SelfPlay);
        assert_eq!(cfg.evaluator, EvaluatorKind::Uniform);

        let cfg = Config::try_parse_from(["actor", "--opponent", "greedy"]).unwrap();
        assert_eq!(cfg.opponent, OpponentKind::Greedy);
    }

    #[test]
    fn output_path_resolves_under_data_dir() {
        let mut cfg = base_config();
        assert_eq!(cfg.output_path(), PathBuf::from("../data/samples.jsonl"));

        cfg.output = "/tmp/abs.jsonl".into();
        assert_eq!(cfg.output_path(), PathBuf::from("/tmp/abs.jsonl"));
    }
}
