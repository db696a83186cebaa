//! Self-play game loop
//!
//! Each game runs on a blocking thread so the parallel search can use its
//! own worker threads without starving the tokio runtime. Samples are kept
//! in memory until the game ends, then labelled with the final result and
//! appended to the JSONL output.

use anyhow::{anyhow, Context, Result};
use chess::{ChessMove, Color};
use engine_core::{DrawReason, GameView, Outcome, Position};
use indicatif::{ProgressBar, ProgressStyle};
use mcts::MctsSearch;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::{Config, OpponentKind};
use crate::mcts_policy::MctsPolicy;
use crate::policy::{MaterialGreedyPolicy, MovePolicy, RandomPolicy};
use crate::replay::{Sample, SampleWriter};
use crate::stats::ActorStats;

/// The learner and, unless it plays itself, its opponent.
pub struct Players {
    pub learner: Box<dyn MovePolicy>,
    pub opponent: Option<Box<dyn MovePolicy>>,
}

impl Players {
    pub fn self_play(learner: Box<dyn MovePolicy>) -> Self {
        Self {
            learner,
            opponent: None,
        }
    }

    fn for_side(&mut self, side: Color, learner_color: Color) -> &mut dyn MovePolicy {
        match &mut self.opponent {
            Some(opponent) if side != learner_color => opponent.as_mut(),
            _ => self.learner.as_mut(),
        }
    }
}

/// A finished game.
#[derive(Debug, Clone)]
pub struct GameRecord {
    pub samples: Vec<Sample>,
    pub plies: u32,
    /// Outcome for the side to move in the final position.
    pub termination: Outcome,
    /// +1 White won, -1 Black won, 0 draw.
    pub white_score: f32,
}

fn score_for(color: Color, white_score: f32) -> f32 {
    match color {
        Color::White => white_score,
        // 0.0 - x keeps draws at +0.0
        Color::Black => 0.0 - white_score,
    }
}

/// Play one game from `start`.
///
/// Returns `Ok(None)` when `shutdown` is raised mid-game.
pub fn play_game(
    players: &mut Players,
    learner_color: Color,
    start: Position,
    max_plies: u32,
    shutdown: &AtomicBool,
) -> Result<Option<GameRecord>> {
    let mut game = GameView::new(start);
    let mut samples = Vec::new();
    let mut last_move: Option<ChessMove> = None;
    let mut plies = 0u32;

    let termination = loop {
        let outcome = game.outcome();
        if outcome.is_terminal() {
            break outcome;
        }
        if plies >= max_plies {
            break Outcome::Draw(DrawReason::MaxPlies);
        }
        if shutdown.load(Ordering::Relaxed) {
            return Ok(None);
        }

        let side = game.side_to_move();
        let legal = game.position().legal_moves();
        let policy = players.for_side(side, learner_color);
        let proposal = policy
            .propose(&game, last_move, &legal)
            .with_context(|| format!("{} policy failed at ply {}", policy.name(), game.ply()))?;

        if !legal.contains(&proposal.mv) {
            return Err(anyhow!(
                "{} policy proposed illegal move {}",
                policy.name(),
                proposal.mv
            ));
        }

        if let Some(target) = &proposal.policy_target {
            samples.push(Sample::new(
                game.position().to_fen(),
                u32::from(game.ply()),
                side,
                target,
                proposal.root_value,
            ));
        }

        game.push(proposal.mv);
        last_move = Some(proposal.mv);
        plies += 1;
    };

    let final_value = termination.value().unwrap_or(0.0);
    let white_score = score_for(game.side_to_move(), final_value);
    for sample in &mut samples {
        let color = if sample.is_white() {
            Color::White
        } else {
            Color::Black
        };
        sample.outcome = score_for(color, white_score);
    }

    Ok(Some(GameRecord {
        samples,
        plies,
        termination,
        white_score,
    }))
}

/// Build the learner and opponent described by `config`.
pub fn build_players(config: &Config) -> Result<Players> {
    let search = MctsSearch::new(
        config.evaluator.build(),
        config.mcts_config()?,
        config.hooks(),
    )?;
    let learner: Box<dyn MovePolicy> =
        Box::new(MctsPolicy::new(search, config.temp_threshold, config.seed()));

    let opponent_seed = config.seed().map(|s| s.wrapping_add(2));
    let opponent: Option<Box<dyn MovePolicy>> = match config.opponent {
        OpponentKind::SelfPlay => None,
        OpponentKind::Random => {
            let policy = match opponent_seed {
                Some(s) => RandomPolicy::with_seed(s),
                None => RandomPolicy::new(),
            };
            Some(Box::new(policy) as Box<dyn MovePolicy>)
        }
        OpponentKind::Greedy => {
            let policy = match opponent_seed {
                Some(s) => MaterialGreedyPolicy::with_seed(s),
                None => MaterialGreedyPolicy::new(),
            };
            Some(Box::new(policy) as Box<dyn MovePolicy>)
        }
    };

    Ok(Players { learner, opponent })
}

pub struct Actor {
    config: Config,
    players: Arc<Mutex<Players>>,
    writer: Mutex<SampleWriter>,
    stats: ActorStats,
    shutdown_signal: Arc<AtomicBool>,
    search_stop: Option<Arc<AtomicBool>>,
    games_played: AtomicU32,
}

impl Actor {
    pub fn new(config: Config) -> Result<Self> {
        let players = build_players(&config)?;
        Self::with_players(config, players)
    }

    pub fn with_players(config: Config, players: Players) -> Result<Self> {
        let output = config.output_path();
        let writer = SampleWriter::open(&output)?;
        let stats = ActorStats::new(config.data_dir.as_ref());
        let search_stop = players.learner.stop_handle();

        info!(
            learner = players.learner.name(),
            opponent = players.opponent.as_ref().map(|p| p.name()).unwrap_or("self"),
            output = %output.display(),
            "Actor ready"
        );

        Ok(Self {
            config,
            players: Arc::new(Mutex::new(players)),
            writer: Mutex::new(writer),
            stats,
            shutdown_signal: Arc::new(AtomicBool::new(false)),
            search_stop,
            games_played: AtomicU32::new(0),
        })
    }

    /// Stop after the current move; a running search is interrupted too.
    pub fn shutdown(&self) {
        self.shutdown_signal.store(true, Ordering::SeqCst);
        if let Some(stop) = &self.search_stop {
            stop.store(true, Ordering::SeqCst);
        }
    }

    pub fn games_played(&self) -> u32 {
        self.games_played.load(Ordering::Relaxed)
    }

    #[allow(dead_code)] // Read by tests and embedders
    pub fn stats(&self) -> &ActorStats {
        &self.stats
    }

    pub async fn run(&self) -> Result<()> {
        let total = self.config.games;
        info!("Starting self-play: {} games", total);

        // Progress bar only when stderr is a TTY
        let progress = if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
            let pb = ProgressBar::new(u64::from(total));
            let style = ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} games ({eta}) {msg}")
                .map(|s| s.progress_chars("#>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            pb.set_style(style);
            Some(pb)
        } else {
            None
        };

        let mut consecutive_failures = 0u32;
        for game_index in 0..total {
            if self.shutdown_signal.load(Ordering::SeqCst) {
                info!("Shutdown requested, stopping before game {}", game_index + 1);
                break;
            }

            // Learner alternates colours when it has an opponent.
            let learner_color = if game_index % 2 == 0 {
                Color::White
            } else {
                Color::Black
            };
            let players = Arc::clone(&self.players);
            let shutdown = Arc::clone(&self.shutdown_signal);
            let max_plies = self.config.max_plies;

            let result = tokio::task::spawn_blocking(move || {
                let mut players = players
                    .lock()
                    .map_err(|_| anyhow!("player state poisoned by an earlier panic"))?;
                let record = play_game(
                    &mut players,
                    learner_color,
                    Position::startpos(),
                    max_plies,
                    &shutdown,
                );
                let search = players.learner.search_stats();
                record.map(|r| (r, search))
            })
            .await
            .context("game task panicked")?;

            match result {
                Ok((Some(record), search)) => {
                    consecutive_failures = 0;
                    if let Some(snapshot) = search {
                        self.stats.record_search(snapshot);
                    }
                    self.finish_game(game_index, record)?;
                    if let Some(ref pb) = progress {
                        pb.inc(1);
                    }
                }
                Ok((None, _)) => {
                    info!("Game {} interrupted by shutdown", game_index + 1);
                    break;
                }
                Err(e) => {
                    if self.shutdown_signal.load(Ordering::SeqCst) {
                        debug!("Game {} ended during shutdown: {:#}", game_index + 1, e);
                        break;
                    }
                    consecutive_failures += 1;
                    self.stats.record_failure();

                    // Suspend progress bar while logging
                    let log = || {
                        error!(
                            "Game {} failed ({}/{} in a row): {:#}",
                            game_index + 1,
                            consecutive_failures,
                            self.config.max_consecutive_failures,
                            e
                        )
                    };
                    match progress {
                        Some(ref pb) => pb.suspend(log),
                        None => log(),
                    }

                    if consecutive_failures >= self.config.max_consecutive_failures {
                        if let Some(ref pb) = progress {
                            pb.abandon();
                        }
                        self.stats.write_stats();
                        return Err(anyhow!(
                            "{} consecutive games failed, last error: {:#}",
                            consecutive_failures,
                            e
                        ));
                    }
                }
            }
        }

        if let Some(pb) = progress {
            pb.finish_with_message("done");
        }
        self.stats.write_stats();

        let snapshot = self.stats.snapshot();
        info!(
            games = self.games_played(),
            white_wins = snapshot.white_wins,
            black_wins = snapshot.black_wins,
            draws = snapshot.draws,
            samples = snapshot.samples_written,
            avg_plies = %format!("{:.1}", snapshot.avg_game_length),
            avg_batch = %format!("{:.2}", snapshot.avg_batch_size),
            cache_hit_rate = %format!("{:.3}", snapshot.cache_hit_rate),
            "Self-play finished"
        );
        Ok(())
    }

    fn finish_game(&self, game_index: u32, record: GameRecord) -> Result<()> {
        let (written, total_written) = {
            let mut writer = self
                .writer
                .lock()
                .map_err(|_| anyhow!("sample writer poisoned"))?;
            let written = writer.write_game(&record.samples)?;
            (written, writer.written())
        };

        self.stats
            .record_game(record.plies, record.white_score, written);
        self.games_played.fetch_add(1, Ordering::Relaxed);
        self.stats.write_stats();

        let result = match record.white_score {
            s if s > 0.0 => "1-0",
            s if s < 0.0 => "0-1",
            _ => "1/2-1/2",
        };
        if matches!(record.termination, Outcome::Draw(DrawReason::MaxPlies)) {
            warn!(
                "Game {} adjudicated drawn after {} plies",
                game_index + 1,
                record.plies
            );
        }
        info!(
            "Game {} finished {} ({:?}) in {} plies, {} samples ({} this run)",
            game_index + 1,
            result,
            record.termination,
            record.plies,
            written,
            total_written
        );
        Ok(())
    }
}
