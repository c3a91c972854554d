//! Score providers queried by the decoder
//!
//! The search itself never parses model files. It asks these providers for:
//! - per-frame acoustic log-probabilities of emitting states
//! - state duration log-probabilities
//! - lookahead estimates of the language model cost ahead of a node
//!
//! Language models live in [`crate::lm`].

pub mod acoustic;
pub mod duration;
pub mod lookahead;

pub use acoustic::FrameMatrix;
pub use duration::DurationTable;
pub use lookahead::{NoLookahead, NodeLookahead};

use crate::config::ModelsConfig;
use crate::error::ModelError;
use crate::network::{NodeIndex, StateId, UnitId};

/// Per-frame acoustic scores for one utterance
pub trait AcousticScorer: Send {
    /// Load scores for `frame`. Returns false when the utterance has ended.
    fn go_to(&mut self, frame: usize) -> bool;

    /// Log-probability of `state` emitting the current frame
    fn log_prob(&self, state: StateId) -> f32;

    /// Scores per frame; states `0..state_count()` can be queried
    fn state_count(&self) -> usize;
}

/// State duration model
pub trait DurationModel: Send + Sync {
    /// Log-probability of staying exactly `duration` frames in `state`
    fn log_prob(&self, state: StateId, duration: u16) -> f32;
}

/// Lookahead estimate of the language model score of the units reachable
/// from a node
pub trait LookaheadScorer: Send + Sync {
    /// `hint` is the last unit on the token's path, for context-dependent
    /// tables. The result is in the language model's log domain.
    fn score(&self, node: NodeIndex, hint: UnitId) -> f32;
}

/// Factory function for the configured lookahead table
pub fn create_lookahead(config: &ModelsConfig) -> Result<Box<dyn LookaheadScorer>, ModelError> {
    match config.lookahead {
        Some(ref path) => {
            tracing::info!("Using node lookahead table {:?}", path);
            Ok(Box::new(NodeLookahead::load(path)?))
        }
        None => {
            tracing::info!("Lookahead disabled");
            Ok(Box::new(NoLookahead))
        }
    }
}

/// Factory function for the configured duration model
pub fn create_duration_model(
    config: &ModelsConfig,
) -> Result<Option<Box<dyn DurationModel>>, ModelError> {
    config
        .duration
        .as_deref()
        .map(|path| DurationTable::load(path).map(|t| Box::new(t) as Box<dyn DurationModel>))
        .transpose()
}

/// Numerically stable `ln(e^a + e^b)`
pub fn log_add(a: f64, b: f64) -> f64 {
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    if lo == f64::NEG_INFINITY {
        return hi;
    }
    hi + (lo - hi).exp().ln_1p()
}
