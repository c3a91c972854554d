//! Frame expansion
//!
//! Every surviving token is pushed along every outgoing arc of its node.
//! Unit boundary and routing nodes are crossed within the same frame, so a
//! single expansion walks the network until it reaches emitting nodes or
//! runs out of arcs. The walk uses an explicit stack and visits arcs in the
//! order they are stored.

use super::frame::NO_SCORE;
use super::token::Token;
use super::Recognition;
use crate::lm::LanguageModel;
use crate::network::{Arc, NodeIndex, UnitId};
use crate::scorer::AcousticScorer;

type Pending<S> = (Token<S>, Arc);

impl<'d, L: LanguageModel> Recognition<'d, L> {
    /// Expand all tokens in the table into raw tokens for the current frame.
    /// The table is left empty.
    pub(crate) fn propagate_tokens(&mut self, acoustics: &dyn AcousticScorer) {
        let decoder = self.decoder;
        self.order_active_nodes();

        let active = std::mem::take(&mut self.active_nodes);
        let mut stack = std::mem::take(&mut self.expansion_stack);
        for &node in &active {
            let mut tokens = std::mem::take(&mut self.table[node as usize]);
            let arcs = &decoder.network.node(node).arcs;
            for token in tokens.values() {
                if token.histogram_bin < self.histogram_bin_limit {
                    self.stats.histogram_pruned += 1;
                    continue;
                }
                self.stats.tokens_expanded += 1;
                let mut token = *token;
                token.word_end = false;

                push_arcs(&mut stack, token, arcs);
                while let Some((token, arc)) = stack.pop() {
                    if let Some(through) = self.move_token_to_node(token, &arc, acoustics) {
                        push_arcs(&mut stack, through, &decoder.network.node(through.node).arcs);
                    }
                }
            }
            // Keep the allocation for the next frame
            tokens.clear();
            self.table[node as usize] = tokens;
        }

        self.active_nodes = active;
        self.active_nodes.clear();
        self.expansion_stack = stack;
        self.stats.raw_tokens = self.raw_tokens.len();
    }

    /// Best scoring nodes first when configured, else by node index
    fn order_active_nodes(&mut self) {
        if !self.decoder.search.sort_active_nodes {
            self.active_nodes.sort_unstable();
            return;
        }
        let table = &self.table;
        let mut keyed: Vec<(f32, NodeIndex)> = self
            .active_nodes
            .iter()
            .map(|&node| {
                let best = table[node as usize]
                    .values()
                    .map(|t| t.total_log_prob)
                    .fold(NO_SCORE, f32::max);
                (best, node)
            })
            .collect();
        keyed.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        self.active_nodes.clear();
        self.active_nodes.extend(keyed.into_iter().map(|(_, node)| node));
    }

    /// Move a copy of `token` along `arc`. Returns the token when it has to
    /// continue through the target node's own arcs in this frame.
    fn move_token_to_node(
        &mut self,
        mut token: Token<L::State>,
        arc: &Arc,
        acoustics: &dyn AcousticScorer,
    ) -> Option<Token<L::State>> {
        let decoder = self.decoder;
        let cfg = &decoder.search;
        let network = &decoder.network;

        token.am_log_prob += cfg.transition_scale * arc.log_prob;

        let self_loop = arc.target == token.node;
        if self_loop {
            token.duration = token.duration.saturating_add(1);
            if token.duration > cfg.max_state_duration {
                if let Some(state) = network.node(arc.target).state {
                    if !network.is_silence_state(state) {
                        self.stats.max_duration_pruned += 1;
                        return None;
                    }
                }
            }
        } else {
            // Leaving an emitting state: score its duration and record the visit
            if let Some(state) = network.node(token.node).state {
                if let Some(duration) = decoder.duration.as_deref() {
                    token.am_log_prob +=
                        cfg.duration_scale * duration.log_prob(state, token.duration);
                }
                let end = self.frame as u32;
                let start = end.saturating_sub(token.duration as u32);
                token.state_history = self.state_history.push_visit(
                    token.state_history,
                    state,
                    start,
                    end,
                    token.am_log_prob,
                );
            }
            token.node = arc.target;
            token.duration = 1;
        }

        let node = network.node(arc.target);
        if !self_loop {
            if let Some(unit) = node.unit {
                if !self.enter_unit(&mut token, arc, unit) {
                    return None;
                }
            }
        }

        if let Some(state) = node.state {
            if arc.update_lookahead {
                let lookahead = decoder.lookahead.score(arc.target, token.last_unit);
                token.update_lookahead_log_prob(lookahead);
            }
            token.am_log_prob += acoustics.log_prob(state);
            token.update_total_log_prob(cfg.lm_scale);
            if token.total_log_prob < self.acc.best_log_prob - cfg.global_beam {
                self.stats.global_beam_pruned += 1;
                return None;
            }

            self.acc.update_best(token.total_log_prob);
            if token.word_end {
                self.acc
                    .update_word_end(token.log_prob_without_lookahead(cfg.lm_scale));
            }
            self.acc.update_node(arc.target, token.total_log_prob);
            self.raw_tokens.push(token);
            return None;
        }

        Some(token)
    }

    /// Score a unit boundary: language model, lookahead, global beam, word
    /// history. Returns false if the token dies here.
    fn enter_unit(&mut self, token: &mut Token<L::State>, arc: &Arc, unit: UnitId) -> bool {
        let decoder = self.decoder;
        let cfg = &decoder.search;
        let markers = &decoder.markers;

        let Some((lm_state, log_prob)) = decoder.lm.score(token.lm_state, unit) else {
            self.stats.lm_rejected += 1;
            return false;
        };
        token.lm_state = lm_state;
        token.lm_log_prob += log_prob;
        token.last_unit = unit;

        if arc.update_lookahead {
            let hint = if unit == markers.sentence_end {
                markers.word_boundary.unwrap_or(markers.sentence_begin)
            } else {
                unit
            };
            let lookahead = decoder.lookahead.score(arc.target, hint);
            token.update_lookahead_log_prob(lookahead);
        }

        token.update_total_log_prob(cfg.lm_scale);
        if token.total_log_prob < self.acc.best_log_prob - cfg.global_beam {
            self.stats.global_beam_pruned += 1;
            return false;
        }

        token.word_history = self.word_history.push_unit(token.word_history, unit);
        token.word_end = true;

        if unit == markers.sentence_end {
            token.lm_state = decoder.start_state;
            match markers.word_boundary {
                Some(boundary) => {
                    token.word_history = self.word_history.push_unit(token.word_history, boundary);
                    token.last_unit = boundary;
                }
                None => token.last_unit = markers.sentence_begin,
            }
        }
        true
    }
}

fn push_arcs<S: Copy>(stack: &mut Vec<Pending<S>>, token: Token<S>, arcs: &[Arc]) {
    // Reversed so the first arc is popped first
    for arc in arcs.iter().rev() {
        stack.push((token, *arc));
    }
}
