//! End of utterance: close open state visits, force sentence ends and read
//! the winning token's history

use super::token::Token;
use super::Recognition;
use crate::error::DecodeError;
use crate::history::HistoryRef;
use crate::lm::LanguageModel;
use crate::network::{flags, UnitId};
use crate::result::{Hypothesis, RecognitionResult};
use std::time::Duration;

impl<'d, L: LanguageModel> Recognition<'d, L> {
    /// Finish the utterance after the last frame
    pub fn finish(mut self, elapsed: Duration) -> Result<RecognitionResult, DecodeError> {
        let decoder = self.decoder;
        let cfg = &decoder.search;

        let mut tokens: Vec<Token<L::State>> = self.tokens().copied().collect();
        if tokens.is_empty() {
            return Err(DecodeError::NoSurvivingHypothesis { frame: self.frame });
        }

        let end_frame = self.frame as u32;
        for token in &mut tokens {
            if let Some(state) = decoder.network.node(token.node).state {
                if token.duration > 1 {
                    if let Some(duration) = decoder.duration.as_deref() {
                        token.am_log_prob +=
                            cfg.duration_scale * duration.log_prob(state, token.duration);
                    }
                }
                token.state_history = self.state_history.push_visit(
                    token.state_history,
                    state,
                    end_frame.saturating_sub(token.duration as u32),
                    end_frame,
                    token.am_log_prob,
                );
            }
            token.update_lookahead_log_prob(0.0);
            token.update_total_log_prob(cfg.lm_scale);
        }

        // Prefer hypotheses that ended in silence over forcing a sentence end
        let silence_tokens: Vec<Token<L::State>> = tokens
            .iter()
            .filter(|t| decoder.network.node(t.node).has_flag(flags::SILENCE))
            .copied()
            .collect();
        let end_tokens = if silence_tokens.is_empty() {
            if cfg.force_sentence_end {
                self.add_sentence_ends(&mut tokens);
            }
            tokens
        } else {
            silence_tokens
        };

        let best = best_token(&end_tokens).ok_or(DecodeError::NoSurvivingHypothesis {
            frame: self.frame,
        })?;
        let best_hypothesis = self.hypothesis(
            self.word_history.units(best.word_history),
            [best.total_log_prob, best.am_log_prob, best.lm_log_prob],
        );
        let alternates = if self.track_links {
            self.alternates(&end_tokens, &best)
        } else {
            Vec::new()
        };

        tracing::debug!(
            frames = self.frame,
            word_nodes = self.word_history.len(),
            state_nodes = self.state_history.len(),
            links = self.links_recorded,
            "utterance finished"
        );

        Ok(RecognitionResult {
            best: best_hypothesis,
            alternates,
            alignment: self.state_history.alignment(best.state_history),
            frames: self.frame,
            elapsed,
            total_token_count: self.total_token_count,
        })
    }

    /// Move every token that is not at a sentence start through the word
    /// boundary (if used) and the sentence end. Tokens the language model
    /// cannot close keep their unforced score.
    fn add_sentence_ends(&mut self, tokens: &mut [Token<L::State>]) {
        let decoder = self.decoder;
        let markers = decoder.markers;

        for token in tokens.iter_mut() {
            if token.lm_state == decoder.start_state {
                continue;
            }
            let mut closed = *token;

            if let Some(boundary) = markers.word_boundary {
                if self.word_history.key(closed.word_history) != boundary {
                    let Some((state, log_prob)) = decoder.lm.score(closed.lm_state, boundary)
                    else {
                        continue;
                    };
                    closed.lm_state = state;
                    closed.lm_log_prob += log_prob;
                    closed.word_history = self.word_history.push_unit(closed.word_history, boundary);
                }
            }

            let Some((state, log_prob)) = decoder.lm.score(closed.lm_state, markers.sentence_end)
            else {
                continue;
            };
            closed.lm_state = state;
            closed.lm_log_prob += log_prob;
            closed.word_history = self
                .word_history
                .push_unit(closed.word_history, markers.sentence_end);
            closed.update_total_log_prob(decoder.search.lm_scale);
            *token = closed;
        }
    }

    /// Build a hypothesis from units in utterance order and
    /// `[total, am, lm]` scores
    pub(crate) fn hypothesis(&self, units: Vec<UnitId>, scores: [f32; 3]) -> Hypothesis {
        let vocab = &self.decoder.vocab;
        let units: Vec<UnitId> = if self.decoder.search.keep_sentence_markers {
            units
        } else {
            units
                .into_iter()
                .filter(|&u| !vocab.is_sentence_marker(u))
                .collect()
        };

        Hypothesis {
            units: units.iter().map(|&u| vocab.label(u).to_string()).collect(),
            text: vocab.render(&units),
            unit_ids: units,
            total_log_prob: scores[0],
            am_log_prob: scores[1],
            lm_log_prob: scores[2],
        }
    }

    /// Word history of the best token in the table
    pub fn best_history(&self) -> Option<HistoryRef> {
        let tokens: Vec<Token<L::State>> = self.tokens().copied().collect();
        best_token(&tokens).map(|t| t.word_history)
    }
}

fn best_token<S: Copy>(tokens: &[Token<S>]) -> Option<Token<S>> {
    tokens
        .iter()
        .copied()
        .max_by(|a, b| a.total_log_prob.total_cmp(&b.total_log_prob))
}
