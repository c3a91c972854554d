//! Per-frame pruning thresholds and statistics

use crate::network::NodeIndex;

/// Score floor used before any token has been seen in a frame
pub const NO_SCORE: f32 = -1e20;

/// Running maxima gathered while expanding one frame. Reset at the start of
/// every frame and owned by a single recognition.
#[derive(Debug, Clone)]
pub struct FrameAccumulator {
    pub best_log_prob: f32,
    /// Best word end score without lookahead
    pub best_word_end_log_prob: f32,
    best_node_log_prob: Vec<f32>,
    touched: Vec<NodeIndex>,
}

impl FrameAccumulator {
    pub fn new(node_count: usize) -> Self {
        Self {
            best_log_prob: NO_SCORE,
            best_word_end_log_prob: NO_SCORE,
            best_node_log_prob: vec![NO_SCORE; node_count],
            touched: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.best_log_prob = NO_SCORE;
        self.best_word_end_log_prob = NO_SCORE;
        // Only nodes written this frame need resetting
        for node in self.touched.drain(..) {
            self.best_node_log_prob[node as usize] = NO_SCORE;
        }
    }

    pub fn best_at(&self, node: NodeIndex) -> f32 {
        self.best_node_log_prob[node as usize]
    }

    pub fn update_node(&mut self, node: NodeIndex, log_prob: f32) {
        let best = &mut self.best_node_log_prob[node as usize];
        if *best == NO_SCORE {
            self.touched.push(node);
        }
        if log_prob > *best {
            *best = log_prob;
        }
    }

    pub fn update_best(&mut self, log_prob: f32) {
        if log_prob > self.best_log_prob {
            self.best_log_prob = log_prob;
        }
    }

    pub fn update_word_end(&mut self, log_prob: f32) {
        if log_prob > self.best_word_end_log_prob {
            self.best_word_end_log_prob = log_prob;
        }
    }
}

/// Counters for one frame, logged at debug level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Tokens expanded from the recombination table
    pub tokens_expanded: usize,
    pub raw_tokens: usize,
    pub global_beam_pruned: usize,
    pub node_beam_pruned: usize,
    pub word_end_beam_pruned: usize,
    pub histogram_pruned: usize,
    pub max_duration_pruned: usize,
    /// Expansions rejected because the language model could not score a unit
    pub lm_rejected: usize,
    /// Tokens dropped by recombination
    pub recombined: usize,
    pub tokens_after_pruning: usize,
    pub active_nodes: usize,
    pub histogram_bin_limit: usize,
    pub histories_freed: usize,
}

impl FrameStats {
    pub fn log(&self, frame: usize, best_log_prob: f32) {
        tracing::debug!(
            frame,
            best = best_log_prob,
            expanded = self.tokens_expanded,
            raw = self.raw_tokens,
            kept = self.tokens_after_pruning,
            active_nodes = self.active_nodes,
            global_beam = self.global_beam_pruned,
            node_beam = self.node_beam_pruned,
            word_end_beam = self.word_end_beam_pruned,
            histogram = self.histogram_pruned,
            max_duration = self.max_duration_pruned,
            lm_rejected = self.lm_rejected,
            recombined = self.recombined,
            bin_limit = self.histogram_bin_limit,
            "frame pruning"
        );
    }
}
