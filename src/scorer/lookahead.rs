//! Lookahead tables

use super::LookaheadScorer;
use crate::error::ModelError;
use crate::network::{NodeIndex, UnitId};
use rustc_hash::FxHashMap;
use std::io::BufRead;
use std::path::Path;

/// Lookahead that never estimates anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookahead;

impl LookaheadScorer for NoLookahead {
    fn score(&self, _node: NodeIndex, _hint: UnitId) -> f32 {
        0.0
    }
}

/// Precomputed per-node lookahead scores.
///
/// Lines are `<node> <score>` for context-independent entries or
/// `<node> <unit> <score>` for entries that apply only after `unit`.
/// Context-dependent entries take precedence. Missing nodes score zero.
#[derive(Debug, Clone, Default)]
pub struct NodeLookahead {
    by_node: FxHashMap<NodeIndex, f32>,
    by_context: FxHashMap<(NodeIndex, UnitId), f32>,
}

impl NodeLookahead {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, node: NodeIndex, score: f32) {
        self.by_node.insert(node, score);
    }

    pub fn set_in_context(&mut self, node: NodeIndex, previous: UnitId, score: f32) {
        self.by_context.insert((node, previous), score);
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let file = std::fs::File::open(path).map_err(|e| ModelError::read(path, e))?;
        let table = Self::from_reader(std::io::BufReader::new(file), path)?;
        tracing::info!(
            "Loaded lookahead table {:?}: {} node entries, {} context entries",
            path,
            table.by_node.len(),
            table.by_context.len()
        );
        Ok(table)
    }

    pub fn from_reader<R: BufRead>(reader: R, origin: &Path) -> Result<Self, ModelError> {
        let mut table = Self::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| ModelError::read(origin, e))?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            let bad = |what: &str| ModelError::parse(origin, idx + 1, format!("invalid {}", what));
            match fields.as_slice() {
                [] => continue,
                [node, score] => table.set(
                    node.parse().map_err(|_| bad("node"))?,
                    score.parse().map_err(|_| bad("score"))?,
                ),
                [node, unit, score] => table.set_in_context(
                    node.parse().map_err(|_| bad("node"))?,
                    unit.parse().map_err(|_| bad("unit"))?,
                    score.parse().map_err(|_| bad("score"))?,
                ),
                _ => return Err(bad("lookahead record")),
            }
        }
        Ok(table)
    }
}

impl LookaheadScorer for NodeLookahead {
    fn score(&self, node: NodeIndex, hint: UnitId) -> f32 {
        if let Some(&score) = self.by_context.get(&(node, hint)) {
            return score;
        }
        self.by_node.get(&node).copied().unwrap_or(0.0)
    }
}
