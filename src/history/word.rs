//! Word history: one trie node per emitted vocabulary unit

use super::{HistoryRef, HistoryTrie};
use crate::network::UnitId;
use rustc_hash::FxHashMap;

/// Score penalty of switching to another history that was recombined away.
///
/// All penalties are `loser - winner` and thus never positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecombinationLink {
    pub log_prob: f32,
    pub am_log_prob: f32,
    pub lm_log_prob: f32,
    /// Frame in which the recombination happened
    pub frame: u32,
}

#[derive(Debug, Clone, Default)]
pub struct WordPayload {
    /// Histories that lost a recombination against this one
    pub links: FxHashMap<HistoryRef, RecombinationLink>,
}

pub type WordHistory = HistoryTrie<UnitId, WordPayload>;

impl WordHistory {
    pub fn with_root(sentence_begin: UnitId) -> Self {
        HistoryTrie::new(sentence_begin, WordPayload::default())
    }

    /// Drop every unit and recombination link, invalidating all handles
    pub fn clear_units(&mut self, sentence_begin: UnitId) {
        self.clear(sentence_begin, WordPayload::default());
    }

    /// Advance `from` by one unit
    pub fn push_unit(&mut self, from: HistoryRef, unit: UnitId) -> HistoryRef {
        self.advance(from, unit, WordPayload::default).0
    }

    /// Units from the utterance start to `node`, root unit included
    pub fn units(&self, node: HistoryRef) -> Vec<UnitId> {
        self.keys_from_root(node)
    }

    /// Record that `loser` was recombined into `winner`. An existing link is
    /// only replaced by a smaller penalty. Returns whether the link changed.
    pub fn link(&mut self, winner: HistoryRef, loser: HistoryRef, link: RecombinationLink) -> bool {
        let links = &mut self.payload_mut(winner).links;
        match links.get_mut(&loser) {
            Some(existing) if existing.log_prob >= link.log_prob => false,
            Some(existing) => {
                *existing = link;
                true
            }
            None => {
                links.insert(loser, link);
                true
            }
        }
    }

    pub fn links(&self, node: HistoryRef) -> &FxHashMap<HistoryRef, RecombinationLink> {
        &self.payload(node).links
    }

    /// Histories too close to each other for a link to add an alternate:
    /// equal, parent and child, or the loser's grandparent is the winner.
    pub fn is_trivial_link(&self, winner: HistoryRef, loser: HistoryRef) -> bool {
        if winner == loser {
            return true;
        }
        let loser_parent = self.parent(loser);
        if loser_parent == Some(winner) || self.parent(winner) == Some(loser) {
            return true;
        }
        loser_parent.and_then(|p| self.parent(p)) == Some(winner)
    }
}
