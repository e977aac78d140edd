//! Mini-batch blending weight for online dictionary learning.
//!
//! An online learner that has seen `count` samples folds the statistics of
//! its latest mini-batch into running averages with weight `w`:
//! `S <- (1 - w) S + w S_batch`. Processing the batch one sample at a time
//! with per-sample weights `((1 + offset) / (offset + i))^learning_rate`
//! compounds into
//!
//! ```text
//! w = 1 - prod_{i = count + 1 - batch_size}^{count} (1 - ((1 + offset) / (offset + i))^learning_rate)
//! ```
//!
//! For `i >= 1` and `offset > -1` every ratio lies in `(0, 1]`. The very
//! first sample (`i = 0`) has no well-defined ratio and gets weight 1, so a
//! batch that starts the stream fully replaces the empty statistics.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BatchWeightError {
    #[error("Batch size must be at least 1.")]
    EmptyBatch,

    #[error("count ({count}) must be at least batch_size - 1 ({}).", .batch_size - 1)]
    CountBelowBatch { count: usize, batch_size: usize },

    #[error("offset must be finite and greater than -1, but was {0}.")]
    InvalidOffset(f64),

    #[error("learning_rate must be finite and non-negative, but was {0}.")]
    InvalidLearningRate(f64),
}

/// Weight given to the newest mini-batch after `count` samples.
///
/// `learning_rate` close to 1 lets old batches fade quickly; `offset` delays
/// the onset of the decay.
pub fn batch_weight(
    count: usize,
    batch_size: usize,
    learning_rate: f64,
    offset: f64,
) -> Result<f64, BatchWeightError> {
    if batch_size == 0 {
        return Err(BatchWeightError::EmptyBatch);
    }
    if count < batch_size - 1 {
        return Err(BatchWeightError::CountBelowBatch { count, batch_size });
    }
    if !offset.is_finite() || offset <= -1.0 {
        return Err(BatchWeightError::InvalidOffset(offset));
    }
    if !learning_rate.is_finite() || learning_rate < 0.0 {
        return Err(BatchWeightError::InvalidLearningRate(learning_rate));
    }

    let first = count - (batch_size - 1);
    let retained: f64 = (first..=count)
        .map(|i| 1.0 - sample_weight(i, learning_rate, offset))
        .product();

    Ok(1.0 - retained)
}

// An online learner only asks for a weight once `count >= batch_size`, so
// the stream's first sample never enters its product. Capping that sample's
// ratio at 1 keeps the weight defined when a batch does start the stream.
fn sample_weight(i: usize, learning_rate: f64, offset: f64) -> f64 {
    if i == 0 {
        return 1.0;
    }
    ((1.0 + offset) / (offset + i as f64)).powf(learning_rate)
}
