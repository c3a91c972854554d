//! Tokens: scored hypotheses copied by value on every expansion

use crate::history::HistoryRef;
use crate::network::{NodeIndex, UnitId};

/// One hypothesis occupying a network node in a language model context.
///
/// Everything except the history handles is copied on expansion; the
/// handles point into tries shared by all tokens of an utterance.
#[derive(Debug, Clone, Copy)]
pub struct Token<S> {
    pub node: NodeIndex,
    pub am_log_prob: f32,
    /// Language model score including the current lookahead estimate
    pub lm_log_prob: f32,
    pub lookahead_log_prob: f32,
    /// `am_log_prob + lm_scale * lm_log_prob`
    pub total_log_prob: f32,
    pub lm_state: S,
    pub last_unit: UnitId,
    /// Frames spent in the current emitting state
    pub duration: u16,
    /// Crossed a unit boundary during the current frame's expansion
    pub word_end: bool,
    pub histogram_bin: usize,
    pub word_history: HistoryRef,
    pub state_history: HistoryRef,
}

impl<S> Token<S> {
    pub fn update_total_log_prob(&mut self, lm_scale: f32) {
        self.total_log_prob = self.am_log_prob + lm_scale * self.lm_log_prob;
    }

    /// Replace the lookahead estimate, keeping `lm_log_prob` free of the old one
    pub fn update_lookahead_log_prob(&mut self, lookahead: f32) {
        self.lm_log_prob -= self.lookahead_log_prob;
        self.lm_log_prob += lookahead;
        self.lookahead_log_prob = lookahead;
    }

    /// Total score with the speculative lookahead term removed
    pub fn log_prob_without_lookahead(&self, lm_scale: f32) -> f32 {
        self.total_log_prob - lm_scale * self.lookahead_log_prob
    }
}
