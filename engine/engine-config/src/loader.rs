//! Configuration loading logic.
//!
//! Handles loading config from files and applying environment variable overrides.

use crate::CentralConfig;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "CAISSA_CONFIG";

/// Standard locations to search for config.toml
pub const CONFIG_SEARCH_PATHS: &[&str] = &[
    "config.toml",      // Current directory
    "../config.toml",   // Parent directory (when running from subdirectory)
    "/app/config.toml", // Docker container
];

/// Load the central configuration from config.toml.
///
/// Searches for config.toml in the following order:
/// 1. Path specified by CAISSA_CONFIG environment variable
/// 2. Current directory (config.toml)
/// 3. Parent directory (../config.toml)
/// 4. Docker container path (/app/config.toml)
///
/// After loading, environment variable overrides are applied.
pub fn load_config() -> CentralConfig {
    // Check for explicit config path
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(&path);
        if path.exists() {
            info!("Loading config from {}: {}", CONFIG_PATH_ENV, path.display());
            return load_from_path(&path);
        }
        warn!(
            "{}={} not found, searching defaults",
            CONFIG_PATH_ENV,
            path.display()
        );
    }

    // Search default locations
    for path_str in CONFIG_SEARCH_PATHS {
        let path = Path::new(path_str);
        if path.exists() {
            info!("Loading config from {}", path.display());
            return load_from_path(path);
        }
    }

    // Fall back to defaults
    debug!("No config.toml found, using built-in defaults");
    apply_env_overrides(CentralConfig::default())
}

/// Load configuration from a specific path.
///
/// An unreadable or malformed file falls back to the built-in defaults.
pub fn load_from_path(path: &Path) -> CentralConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => apply_env_overrides(config),
            Err(e) => {
                warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                apply_env_overrides(CentralConfig::default())
            }
        },
        Err(e) => {
            warn!("Failed to read {}: {}, using defaults", path.display(), e);
            apply_env_overrides(CentralConfig::default())
        }
    }
}

/// Macro to reduce env override boilerplate
macro_rules! env_override {
    // String field
    ($config:expr, $section:ident . $field:ident, $key:expr) => {
        if let Ok(v) = std::env::var($key) {
            $config.$section.$field = v;
        }
    };
    // Parseable field (u32, usize, f64, etc.)
    ($config:expr, $section:ident . $field:ident, $key:expr, parse) => {
        if let Ok(v) =
            std::env::var($key).and_then(|s| s.parse().map_err(|_| std::env::VarError::NotPresent))
        {
            $config.$section.$field = v;
        }
    };
    // Optional parseable field (Option<u64>, etc.)
    ($config:expr, $section:ident . $field:ident, $key:expr, optional_parse) => {
        if let Ok(v) =
            std::env::var($key).and_then(|s| s.parse().map_err(|_| std::env::VarError::NotPresent))
        {
            $config.$section.$field = Some(v);
        }
    };
}

/// Apply environment variable overrides to a configuration.
///
/// Environment variables follow the pattern: CAISSA_<SECTION>_<KEY>
pub fn apply_env_overrides(mut config: CentralConfig) -> CentralConfig {
    // Common
    env_override!(config, common.data_dir, "CAISSA_COMMON_DATA_DIR");
    env_override!(config, common.log_level, "CAISSA_COMMON_LOG_LEVEL");

    // Search
    env_override!(config, search.num_threads, "CAISSA_SEARCH_NUM_THREADS", parse);
    env_override!(
        config,
        search.eval_batch_size,
        "CAISSA_SEARCH_EVAL_BATCH_SIZE",
        parse
    );
    env_override!(
        config,
        search.num_simulations,
        "CAISSA_SEARCH_NUM_SIMULATIONS",
        parse
    );
    env_override!(
        config,
        search.move_time_ms,
        "CAISSA_SEARCH_MOVE_TIME_MS",
        parse
    );
    env_override!(
        config,
        search.cache_capacity,
        "CAISSA_SEARCH_CACHE_CAPACITY",
        parse
    );
    env_override!(config, search.seed, "CAISSA_SEARCH_SEED", optional_parse);

    // Exploration
    env_override!(config, exploration.c_puct, "CAISSA_EXPLORATION_C_PUCT", parse);
    env_override!(
        config,
        exploration.c_puct_decay,
        "CAISSA_EXPLORATION_C_PUCT_DECAY",
        parse
    );
    env_override!(
        config,
        exploration.c_puct_floor,
        "CAISSA_EXPLORATION_C_PUCT_FLOOR",
        parse
    );
    env_override!(
        config,
        exploration.dirichlet_alpha,
        "CAISSA_EXPLORATION_DIRICHLET_ALPHA",
        parse
    );
    env_override!(
        config,
        exploration.dirichlet_epsilon,
        "CAISSA_EXPLORATION_DIRICHLET_EPSILON",
        parse
    );
    env_override!(
        config,
        exploration.dirichlet_cutoff,
        "CAISSA_EXPLORATION_DIRICHLET_CUTOFF",
        parse
    );

    // Self-play
    env_override!(config, selfplay.games, "CAISSA_SELFPLAY_GAMES", parse);
    env_override!(config, selfplay.max_plies, "CAISSA_SELFPLAY_MAX_PLIES", parse);
    env_override!(
        config,
        selfplay.temp_threshold,
        "CAISSA_SELFPLAY_TEMP_THRESHOLD",
        parse
    );
    env_override!(config, selfplay.output, "CAISSA_SELFPLAY_OUTPUT");
    env_override!(
        config,
        selfplay.max_consecutive_failures,
        "CAISSA_SELFPLAY_MAX_CONSECUTIVE_FAILURES",
        parse
    );
    env_override!(config, selfplay.evaluator, "CAISSA_SELFPLAY_EVALUATOR");
    env_override!(config, selfplay.opponent, "CAISSA_SELFPLAY_OPPONENT");

    config
}
