//! Actor statistics tracking and persistence.
//!
//! Tracks game results, sample output and the search counters of the
//! learner, and writes them to `actor_stats.json` in the data directory.

use mcts::StatsSnapshot;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, warn};

/// Aggregated actor statistics, designed for lock-free updates.
#[derive(Debug)]
pub struct ActorStats {
    games_completed: AtomicU32,
    failed_games: AtomicU32,
    total_plies: AtomicU64,
    white_wins: AtomicU32,
    black_wins: AtomicU32,
    draws: AtomicU32,
    samples_written: AtomicU64,
    start_time: Instant,
    stats_path: PathBuf,
    /// Latest cumulative counters from the search.
    search: Mutex<StatsSnapshot>,
}

/// Serializable stats for JSON output.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActorStatsSnapshot {
    pub games_completed: u32,
    pub failed_games: u32,
    pub total_plies: u64,
    pub white_wins: u32,
    pub black_wins: u32,
    pub draws: u32,
    pub samples_written: u64,
    pub avg_game_length: f64,
    pub games_per_second: f64,
    pub runtime_seconds: f64,
    pub avg_batch_size: f64,
    pub cache_hit_rate: f64,
    pub search: StatsSnapshot,
    pub timestamp: u64,
}

impl ActorStats {
    /// Create new stats tracker.
    pub fn new(data_dir: &Path) -> Self {
        // Ensure data directory exists
        if let Err(e) = fs::create_dir_all(data_dir) {
            warn!("Failed to create data directory: {}", e);
        }

        Self {
            games_completed: AtomicU32::new(0),
            failed_games: AtomicU32::new(0),
            total_plies: AtomicU64::new(0),
            white_wins: AtomicU32::new(0),
            black_wins: AtomicU32::new(0),
            draws: AtomicU32::new(0),
            samples_written: AtomicU64::new(0),
            start_time: Instant::now(),
            stats_path: data_dir.join("actor_stats.json"),
            search: Mutex::new(StatsSnapshot::default()),
        }
    }

    /// Record a finished game. `white_score` is +1, -1 or 0 for White.
    pub fn record_game(&self, plies: u32, white_score: f32, samples: usize) {
        self.games_completed.fetch_add(1, Ordering::Relaxed);
        self.total_plies.fetch_add(plies as u64, Ordering::Relaxed);
        self.samples_written
            .fetch_add(samples as u64, Ordering::Relaxed);

        if white_score > 0.0 {
            self.white_wins.fetch_add(1, Ordering::Relaxed);
        } else if white_score < 0.0 {
            self.black_wins.fetch_add(1, Ordering::Relaxed);
        } else {
            self.draws.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_failure(&self) {
        self.failed_games.fetch_add(1, Ordering::Relaxed);
    }

    /// Replace the search counters with a newer cumulative snapshot.
    pub fn record_search(&self, snapshot: StatsSnapshot) {
        match self.search.lock() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }

    /// Get a snapshot of current stats.
    pub fn snapshot(&self) -> ActorStatsSnapshot {
        let games = self.games_completed.load(Ordering::Relaxed);
        let total_plies = self.total_plies.load(Ordering::Relaxed);
        let runtime = self.start_time.elapsed().as_secs_f64();
        let search = match self.search.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        };

        let avg_game_length = if games > 0 {
            total_plies as f64 / games as f64
        } else {
            0.0
        };

        let games_per_second = if runtime > 0.0 {
            games as f64 / runtime
        } else {
            0.0
        };

        ActorStatsSnapshot {
            games_completed: games,
            failed_games: self.failed_games.load(Ordering::Relaxed),
            total_plies,
            white_wins: self.white_wins.load(Ordering::Relaxed),
            black_wins: self.black_wins.load(Ordering::Relaxed),
            draws: self.draws.load(Ordering::Relaxed),
            samples_written: self.samples_written.load(Ordering::Relaxed),
            avg_game_length,
            games_per_second,
            runtime_seconds: runtime,
            avg_batch_size: search.avg_batch_size(),
            cache_hit_rate: search.cache_hit_rate(),
            search,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }

    /// Write stats to JSON file (atomic write-then-rename).
    pub fn write_stats(&self) {
        let snapshot = self.snapshot();

        let json = match serde_json::to_string_pretty(&snapshot) {
            Ok(j) => j,
            Err(e) => {
                warn!("Failed to serialize actor stats: {}", e);
                return;
            }
        };

        // Write to temp file then rename (atomic on most filesystems)
        let temp_path = self.stats_path.with_extension("json.tmp");
        match fs::File::create(&temp_path) {
            Ok(mut file) => {
                if let Err(e) = file.write_all(json.as_bytes()) {
                    warn!("Failed to write actor stats: {}", e);
                    return;
                }
            }
            Err(e) => {
                warn!("Failed to create temp stats file: {}", e);
                return;
            }
        }

        if let Err(e) = fs::rename(&temp_path, &self.stats_path) {
            warn!("Failed to rename stats file: {}", e);
            let _ = fs::remove_file(&temp_path);
            return;
        }

        debug!("Wrote actor stats to {}", self.stats_path.display());
    }

    #[allow(dead_code)]
    pub fn stats_path(&self) -> &Path {
        &self.stats_path
    }
}
