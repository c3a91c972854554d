//! Recombination: at most one token per (node, language model state)

use super::token::Token;
use super::Recognition;
use crate::history::RecombinationLink;
use crate::lm::LanguageModel;
use std::collections::hash_map::Entry;

/// What happened to a token offered to the token table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Recombined {
    /// First token with its key
    Inserted,
    /// Beat the previous holder of its key
    Replaced { previous_bin: usize },
    /// Lost against the current holder of its key
    Dropped,
}

impl<'d, L: LanguageModel> Recognition<'d, L> {
    /// Fold a pruned token into the token table, keeping the better of two
    /// tokens with the same key. With alternates enabled, the loser's path
    /// is remembered as a link on the winner's word history.
    pub(crate) fn recombine(&mut self, token: Token<L::State>) -> Recombined {
        let node_tokens = &mut self.table[token.node as usize];
        let was_empty = node_tokens.is_empty();

        let (outcome, contest) = match node_tokens.entry(token.lm_state) {
            Entry::Vacant(slot) => {
                slot.insert(token);
                (Recombined::Inserted, None)
            }
            Entry::Occupied(mut slot) => {
                let existing = *slot.get();
                if token.total_log_prob > existing.total_log_prob {
                    slot.insert(token);
                    (
                        Recombined::Replaced {
                            previous_bin: existing.histogram_bin,
                        },
                        Some((token, existing)),
                    )
                } else {
                    (Recombined::Dropped, Some((existing, token)))
                }
            }
        };

        if was_empty {
            self.active_nodes.push(token.node);
        }
        if self.track_links {
            if let Some((winner, loser)) = contest {
                self.record_link(&winner, &loser);
            }
        }
        outcome
    }

    fn record_link(&mut self, winner: &Token<L::State>, loser: &Token<L::State>) {
        if self
            .word_history
            .is_trivial_link(winner.word_history, loser.word_history)
        {
            return;
        }
        let link = RecombinationLink {
            log_prob: loser.total_log_prob - winner.total_log_prob,
            am_log_prob: loser.am_log_prob - winner.am_log_prob,
            lm_log_prob: loser.lm_log_prob - winner.lm_log_prob,
            frame: self.frame as u32,
        };
        if self
            .word_history
            .link(winner.word_history, loser.word_history, link)
        {
            self.links_recorded += 1;
        }
    }
}
