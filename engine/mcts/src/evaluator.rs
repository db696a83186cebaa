//! Evaluator trait for batched position evaluation.
//!
//! The evaluator is the inference backend: one synchronous call maps a batch
//! of encoded positions to (policy, value) pairs. In AlphaZero this is a
//! neural network. For testing and bootstrapping, we provide a uniform
//! evaluator and a material-count evaluator.

use engine_core::encode::material_from_planes;
use engine_core::{EncodedPosition, INPUT_SIZE, MOVE_SPACE, PLANES};
use thiserror::Error;

/// Errors that can occur during evaluation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvaluatorError {
    #[error("Evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),
}

/// Result of evaluating a position.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalResult {
    /// Policy over the full move space, indexed by `engine_core::move_index`.
    /// Illegal entries are ignored at expansion.
    pub policy: Vec<f32>,

    /// Value estimate for the side to move.
    /// Range: -1.0 (certain loss) to +1.0 (certain win).
    pub value: f32,
}

/// Encoded positions stacked row by row, in enqueue order.
#[derive(Debug, Clone, Default)]
pub struct InputBatch {
    data: Vec<f32>,
    rows: usize,
}

impl InputBatch {
    pub fn with_capacity(rows: usize) -> Self {
        Self {
            data: Vec::with_capacity(rows * INPUT_SIZE),
            rows: 0,
        }
    }

    pub fn push(&mut self, position: &EncodedPosition) {
        self.data.extend_from_slice(position.as_slice());
        self.rows += 1;
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Tensor shape: `[batch, planes, rank, file]`.
    pub fn shape(&self) -> [usize; 4] {
        [self.rows, PLANES, 8, 8]
    }

    pub fn row(&self, index: usize) -> &[f32] {
        &self.data[index * INPUT_SIZE..(index + 1) * INPUT_SIZE]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// Trait for position evaluators.
///
/// Implementations could be:
/// - UniformEvaluator: uniform policy, neutral value (for testing)
/// - MaterialEvaluator: material count squashed into [-1, 1]
/// - a neural network backend
pub trait Evaluator: Send + Sync {
    /// Evaluate every row of `batch`, returning one result per row in order.
    fn evaluate_batch(&self, batch: &InputBatch) -> Result<Vec<EvalResult>, EvaluatorError>;
}

/// Check that an evaluator answered every row with a full policy vector
/// and a finite value. Values outside [-1, 1] are clamped.
pub(crate) fn validate_results(
    batch: &InputBatch,
    mut results: Vec<EvalResult>,
) -> Result<Vec<EvalResult>, EvaluatorError> {
    if results.len() != batch.rows() {
        return Err(EvaluatorError::ShapeMismatch(format!(
            "expected {} results, got {}",
            batch.rows(),
            results.len()
        )));
    }
    if let Some(bad) = results.iter().find(|r| r.policy.len() != MOVE_SPACE) {
        return Err(EvaluatorError::ShapeMismatch(format!(
            "policy length {} != {}",
            bad.policy.len(),
            MOVE_SPACE
        )));
    }
    if let Some(row) = results.iter().position(|r| !r.value.is_finite()) {
        return Err(EvaluatorError::EvaluationFailed(format!(
            "non-finite value {} in row {}",
            results[row].value, row
        )));
    }
    for result in &mut results {
        result.value = result.value.clamp(-1.0, 1.0);
    }
    Ok(results)
}

/// Uniform evaluator that assigns equal probability to every move.
/// Value is always 0.0 (neutral). Useful for testing MCTS without a model.
#[derive(Debug, Clone, Default)]
pub struct UniformEvaluator;

impl UniformEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl Evaluator for UniformEvaluator {
    fn evaluate_batch(&self, batch: &InputBatch) -> Result<Vec<EvalResult>, EvaluatorError> {
        let prob = 1.0 / MOVE_SPACE as f32;
        Ok((0..batch.rows())
            .map(|_| EvalResult {
                policy: vec![prob; MOVE_SPACE],
                value: 0.0,
            })
            .collect())
    }
}

/// Uniform policy with `tanh(material / scale)` as the value.
#[derive(Debug, Clone)]
pub struct MaterialEvaluator {
    /// Pawns of advantage that map to a value of about 0.76.
    pub scale: f32,
}

impl Default for MaterialEvaluator {
    fn default() -> Self {
        Self { scale: 10.0 }
    }
}

impl MaterialEvaluator {
    pub fn new(scale: f32) -> Self {
        Self { scale }
    }
}

impl Evaluator for MaterialEvaluator {
    fn evaluate_batch(&self, batch: &InputBatch) -> Result<Vec<EvalResult>, EvaluatorError> {
        if self.scale <= 0.0 {
            return Err(EvaluatorError::EvaluationFailed(format!(
                "material scale must be positive, got {}",
                self.scale
            )));
        }
        let prob = 1.0 / MOVE_SPACE as f32;
        Ok((0..batch.rows())
            .map(|i| EvalResult {
                policy: vec![prob; MOVE_SPACE],
                value: (material_from_planes(batch.row(i)) / self.scale).tanh(),
            })
            .collect())
    }
}
