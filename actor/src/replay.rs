//! JSON-lines sample file for training data
//!
//! Every searched position becomes one line: the FEN, the visit
//! distribution over legal moves and the final game result from the
//! perspective of the side that was to move.

use anyhow::{Context, Result};
use chess::{ChessMove, Color};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One training example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub fen: String,
    pub ply: u32,
    /// `white` or `black`.
    pub side_to_move: String,
    /// (UCI move, visit probability) over the legal moves.
    pub policy: Vec<(String, f32)>,
    /// Search value at the root, for the side to move.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_value: Option<f32>,
    /// +1 win, -1 loss, 0 draw for the side to move. Filled in when the
    /// game ends.
    pub outcome: f32,
}

impl Sample {
    pub fn new(
        fen: String,
        ply: u32,
        side_to_move: Color,
        policy: &[(ChessMove, f32)],
        root_value: Option<f32>,
    ) -> Self {
        Self {
            fen,
            ply,
            side_to_move: color_name(side_to_move).to_string(),
            policy: policy
                .iter()
                .map(|(mv, p)| (mv.to_string(), *p))
                .collect(),
            root_value,
            outcome: 0.0,
        }
    }

    pub fn is_white(&self) -> bool {
        self.side_to_move == "white"
    }
}

pub fn color_name(color: Color) -> &'static str {
    match color {
        Color::White => "white",
        Color::Black => "black",
    }
}

/// Appends samples to a JSONL file.
pub struct SampleWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
}

impl SampleWriter {
    /// Open `path` for appending, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    /// Write one game's samples and flush.
    pub fn write_game(&mut self, samples: &[Sample]) -> Result<usize> {
        for sample in samples {
            serde_json::to_writer(&mut self.writer, sample)?;
            self.writer.write_all(b"\n")?;
        }
        self.writer
            .flush()
            .with_context(|| format!("flushing {}", self.path.display()))?;

        self.written += samples.len() as u64;
        debug!(
            "Wrote {} samples to {} ({} total)",
            samples.len(),
            self.path.display(),
            self.written
        );
        Ok(samples.len())
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

/// Read every sample from a JSONL file. Blank lines are skipped.
#[allow(dead_code)] // Used by tests and offline tooling
pub fn read_samples(path: &Path) -> Result<Vec<Sample>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut samples = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let sample = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}", path.display(), index + 1))?;
        samples.push(sample);
    }
    Ok(samples)
}
