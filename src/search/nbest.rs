//! Alternate hypotheses from recombination links
//!
//! When alternates are enabled, every recombination leaves a link on the
//! winner's word history pointing at the loser's, with the score penalty
//! of switching. Walking the winning histories back to the root and taking
//! detours through these links reconstructs paths the search merged away.

use super::token::Token;
use super::Recognition;
use crate::history::HistoryRef;
use crate::lm::LanguageModel;
use crate::network::UnitId;
use crate::result::Hypothesis;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;

/// Best scores per distinct unit sequence, bounded in size and score range
#[derive(Debug, Clone)]
pub struct NbestStorage {
    max_hypotheses: usize,
    beam: f32,
    best_log_prob: f32,
    /// `[total, am, lm]` per unit sequence
    entries: FxHashMap<Vec<UnitId>, [f32; 3]>,
}

impl NbestStorage {
    pub fn new(max_hypotheses: usize, beam: f32) -> Self {
        Self {
            max_hypotheses,
            beam,
            best_log_prob: f32::NEG_INFINITY,
            entries: FxHashMap::default(),
        }
    }

    /// Offer a hypothesis. Returns whether it was stored.
    pub fn add(&mut self, units: Vec<UnitId>, scores: [f32; 3]) -> bool {
        if scores[0] < self.best_log_prob - self.beam {
            return false;
        }

        if let Some(existing) = self.entries.get_mut(&units) {
            if scores[0] <= existing[0] {
                return false;
            }
            *existing = scores;
        } else {
            if self.max_hypotheses == 0 {
                return false;
            }
            if self.entries.len() >= self.max_hypotheses {
                let worst = self
                    .entries
                    .iter()
                    .min_by(|a, b| a.1[0].total_cmp(&b.1[0]))
                    .map(|(units, s)| (units.clone(), s[0]));
                match worst {
                    Some((worst_units, worst_score)) if worst_score < scores[0] => {
                        self.entries.remove(&worst_units);
                    }
                    _ => return false,
                }
            }
            self.entries.insert(units, scores);
        }

        self.best_log_prob = self.best_log_prob.max(scores[0]);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored hypotheses within the beam, best first
    pub fn into_sorted(self) -> Vec<(Vec<UnitId>, [f32; 3])> {
        let floor = self.best_log_prob - self.beam;
        let mut sorted: Vec<_> = self
            .entries
            .into_iter()
            .filter(|(_, s)| s[0] >= floor)
            .collect();
        sorted.sort_by(|a, b| b.1[0].total_cmp(&a.1[0]).then_with(|| a.0.cmp(&b.0)));
        sorted
    }
}

/// A path being walked back towards the root
struct PartialPath {
    history: HistoryRef,
    /// Units below `history`, last unit first
    suffix: Vec<UnitId>,
    scores: [f32; 3],
    recombinations: usize,
    /// Links recorded after this frame may not be followed
    last_frame: u32,
}

impl<'d, L: LanguageModel> Recognition<'d, L> {
    /// Alternate hypotheses ending in `end_tokens`, best first. The best
    /// hypothesis itself is the first entry.
    pub(crate) fn alternates(
        &self,
        end_tokens: &[Token<L::State>],
        best: &Token<L::State>,
    ) -> Vec<Hypothesis> {
        let cfg = &self.decoder.nbest;
        let floor = best.total_log_prob - cfg.beam;

        let mut per_history: FxHashMap<HistoryRef, Token<L::State>> = FxHashMap::default();
        for token in end_tokens {
            per_history
                .entry(token.word_history)
                .and_modify(|t| {
                    if token.total_log_prob > t.total_log_prob {
                        *t = *token;
                    }
                })
                .or_insert(*token);
        }
        let mut starts: Vec<Token<L::State>> = per_history
            .into_values()
            .filter(|t| t.total_log_prob >= floor)
            .collect();
        starts.sort_by(|a, b| b.total_log_prob.total_cmp(&a.total_log_prob));

        let mut storage = NbestStorage::new(cfg.max_hypotheses, cfg.beam);
        let mut queue = VecDeque::new();
        for token in starts {
            queue.push_back(PartialPath {
                history: token.word_history,
                suffix: Vec::new(),
                scores: [token.total_log_prob, token.am_log_prob, token.lm_log_prob],
                recombinations: 0,
                last_frame: u32::MAX,
            });

            while let Some(path) = queue.pop_front() {
                let key = self.word_history.key(path.history);
                let Some(parent) = self.word_history.parent(path.history) else {
                    let mut units = path.suffix;
                    units.push(key);
                    units.reverse();
                    storage.add(units, path.scores);
                    continue;
                };

                if path.recombinations < cfg.max_recombinations {
                    for (&loser, link) in self.word_history.links(path.history) {
                        if link.frame > path.last_frame {
                            continue;
                        }
                        let scores = [
                            path.scores[0] + link.log_prob,
                            path.scores[1] + link.am_log_prob,
                            path.scores[2] + link.lm_log_prob,
                        ];
                        if scores[0] <= floor {
                            continue;
                        }
                        queue.push_back(PartialPath {
                            history: loser,
                            suffix: path.suffix.clone(),
                            scores,
                            recombinations: path.recombinations + 1,
                            last_frame: link.frame,
                        });
                    }
                }

                let mut suffix = path.suffix;
                suffix.push(key);
                queue.push_back(PartialPath {
                    history: parent,
                    suffix,
                    scores: path.scores,
                    recombinations: path.recombinations,
                    last_frame: path.last_frame,
                });
            }
        }

        storage
            .into_sorted()
            .into_iter()
            .map(|(units, scores)| self.hypothesis(units, scores))
            .collect()
    }
}
