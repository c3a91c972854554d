//! Beam pruning and histogram population control
//!
//! Raw tokens pass three beams: global (against the frame's best score),
//! node (against the best score at the token's node) and word end (word end
//! tokens only, compared without their lookahead estimate). Survivors are
//! binned by score. The bins decide which tokens the *next* frame skips,
//! approximating "keep the best `token_limit` tokens" without sorting.

use super::recombination::Recombined;
use super::Recognition;
use crate::lm::LanguageModel;

pub const HISTOGRAM_BIN_COUNT: usize = 100;

/// Token counts per score bin, lowest scores in bin 0
#[derive(Debug, Clone)]
pub struct Histogram {
    counts: [usize; HISTOGRAM_BIN_COUNT],
}

impl Default for Histogram {
    fn default() -> Self {
        Self {
            counts: [0; HISTOGRAM_BIN_COUNT],
        }
    }
}

impl Histogram {
    /// Bin of a score between the global beam floor and the frame's best
    pub fn bin(log_prob: f32, floor: f32, global_beam: f32) -> usize {
        let pos = (HISTOGRAM_BIN_COUNT - 1) as f32 * (log_prob - floor) / global_beam;
        pos.round().clamp(0.0, (HISTOGRAM_BIN_COUNT - 1) as f32) as usize
    }

    pub fn add(&mut self, bin: usize) {
        self.counts[bin] += 1;
    }

    pub fn remove(&mut self, bin: usize) {
        self.counts[bin] = self.counts[bin].saturating_sub(1);
    }

    pub fn count(&self, bin: usize) -> usize {
        self.counts[bin]
    }

    /// Lowest bin to keep: counting down from the top, the bin where the
    /// running count first exceeds `token_limit`. Zero keeps everything.
    pub fn limit(&self, token_limit: usize) -> usize {
        let mut total = 0;
        for bin in (0..HISTOGRAM_BIN_COUNT).rev() {
            total += self.counts[bin];
            if total > token_limit {
                return bin;
            }
        }
        0
    }
}

impl<'d, L: LanguageModel> Recognition<'d, L> {
    /// Beam-prune the raw tokens of this frame, recombine the survivors into
    /// the token table and compute the histogram limit for the next frame.
    pub(crate) fn prune_tokens(&mut self) {
        let decoder = self.decoder;
        let cfg = &decoder.search;
        let global_floor = self.acc.best_log_prob - cfg.global_beam;
        let word_end_floor = self.acc.best_word_end_log_prob - cfg.word_end_beam;

        let mut raw = std::mem::take(&mut self.raw_tokens);
        let mut histogram = Histogram::default();
        for mut token in raw.drain(..) {
            if token.total_log_prob < global_floor {
                self.stats.global_beam_pruned += 1;
                continue;
            }
            if token.total_log_prob < self.acc.best_at(token.node) - cfg.node_beam {
                self.stats.node_beam_pruned += 1;
                continue;
            }
            if token.word_end && token.log_prob_without_lookahead(cfg.lm_scale) < word_end_floor {
                self.stats.word_end_beam_pruned += 1;
                continue;
            }
            token.histogram_bin = Histogram::bin(token.total_log_prob, global_floor, cfg.global_beam);
            match self.recombine(token) {
                Recombined::Inserted => {
                    histogram.add(token.histogram_bin);
                    self.stats.tokens_after_pruning += 1;
                }
                Recombined::Replaced { previous_bin } => {
                    histogram.remove(previous_bin);
                    histogram.add(token.histogram_bin);
                    self.stats.recombined += 1;
                }
                Recombined::Dropped => self.stats.recombined += 1,
            }
        }
        self.raw_tokens = raw;

        self.histogram_bin_limit = histogram.limit(cfg.token_limit);
        self.stats.histogram_bin_limit = self.histogram_bin_limit;
        self.stats.active_nodes = self.active_nodes.len();
    }
}
