//! State history: one trie node per visited emitting state, used to produce a
//! time alignment for the winning path

use super::{HistoryRef, HistoryTrie};
use crate::network::StateId;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatePayload {
    /// Acoustic score of the best token that recorded this visit
    pub best_am_log_prob: f32,
    pub start_frame: u32,
    pub end_frame: u32,
}

impl StatePayload {
    const EMPTY: Self = Self {
        best_am_log_prob: 0.0,
        start_frame: 0,
        end_frame: 0,
    };
}

/// One state visit in an alignment, frames `start..end`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StateSegment {
    pub state: StateId,
    pub start_frame: u32,
    pub end_frame: u32,
}

/// Key of the root node, which stands for "no state yet"
pub const NO_STATE: StateId = StateId::MAX;

pub type StateHistory = HistoryTrie<StateId, StatePayload>;

impl StateHistory {
    pub fn with_empty_root() -> Self {
        HistoryTrie::new(NO_STATE, StatePayload::EMPTY)
    }

    /// Drop every visit, invalidating all handles
    pub fn clear_visits(&mut self) {
        self.clear(NO_STATE, StatePayload::EMPTY);
    }

    /// Record a visit to `state` spanning `start..end`. Paths sharing the
    /// same state sequence share the node; the span of the best scoring
    /// visit is kept.
    pub fn push_visit(
        &mut self,
        from: HistoryRef,
        state: StateId,
        start: u32,
        end: u32,
        am_log_prob: f32,
    ) -> HistoryRef {
        let visit = StatePayload {
            best_am_log_prob: am_log_prob,
            start_frame: start,
            end_frame: end,
        };
        let (node, created) = self.advance(from, state, || visit);
        if !created {
            let payload = self.payload_mut(node);
            if am_log_prob > payload.best_am_log_prob {
                *payload = visit;
            }
        }
        node
    }

    /// Segments from the first visited state to `node`
    pub fn alignment(&self, node: HistoryRef) -> Vec<StateSegment> {
        let mut segments: Vec<StateSegment> = self
            .path_to_root(node)
            .into_iter()
            .filter(|&n| n != self.root())
            .map(|n| {
                let payload = self.payload(n);
                StateSegment {
                    state: self.key(n),
                    start_frame: payload.start_frame,
                    end_frame: payload.end_frame,
                }
            })
            .collect();
        segments.reverse();
        segments
    }
}
