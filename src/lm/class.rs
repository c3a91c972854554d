//! Class n-gram language model
//!
//! A unit is scored as `log P(unit | class) + log P(class | class history)`.
//! The class n-gram uses class indices ("0", "1", ...) as its symbols.

use super::ngram::{Ngram, NgramNode, SymbolId};
use super::LanguageModel;
use crate::error::ModelError;
use crate::network::UnitId;
use crate::vocab::{Vocabulary, SENTENCE_BEGIN};
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

/// `word -> (class, log10 P(word | class))`
pub type Memberships = HashMap<String, (u32, f32)>;

/// Read `word class logprob` lines
pub fn read_memberships<R: BufRead>(reader: R, origin: &Path) -> Result<Memberships, ModelError> {
    let mut memberships = HashMap::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| ModelError::read(origin, e))?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [] => continue,
            [word, class, log_prob] => {
                let class: u32 = class.parse().map_err(|_| {
                    ModelError::parse(origin, idx + 1, format!("invalid class '{}'", class))
                })?;
                let log_prob: f32 = log_prob.parse().map_err(|_| {
                    ModelError::parse(origin, idx + 1, format!("invalid log-prob '{}'", log_prob))
                })?;
                memberships.insert(word.to_string(), (class, log_prob));
            }
            _ => {
                return Err(ModelError::parse(
                    origin,
                    idx + 1,
                    "expected 'word class logprob'",
                ))
            }
        }
    }
    Ok(memberships)
}

#[derive(Debug, Clone)]
pub struct ClassLm {
    ngram: Ngram,
    /// Per unit: class symbol in the class n-gram and membership log-prob
    membership: Vec<Option<(SymbolId, f32)>>,
    sentence_end_unit: UnitId,
    sentence_end_symbol: SymbolId,
}

impl ClassLm {
    pub fn new(ngram: Ngram, memberships: &Memberships, vocab: &Vocabulary) -> Result<Self, ModelError> {
        let sentence_end_symbol = ngram
            .sentence_end_symbol()
            .ok_or(ModelError::MissingMarker(crate::vocab::SENTENCE_END))?;

        let mut unmodeled = 0usize;
        let mut membership: Vec<Option<(SymbolId, f32)>> = vocab
            .labels()
            .iter()
            .map(|label| {
                let entry = memberships.get(label.as_str()).and_then(|&(class, lp)| {
                    ngram.symbol(&class.to_string()).map(|symbol| (symbol, lp))
                });
                if entry.is_none() {
                    unmodeled += 1;
                }
                entry
            })
            .collect();

        // Sentence end shares the membership of sentence begin
        let begin = membership[vocab.sentence_begin() as usize];
        membership[vocab.sentence_end() as usize] = begin;
        if begin.is_none() {
            tracing::warn!("No class membership for {}", SENTENCE_BEGIN);
        }
        if unmodeled > 0 {
            tracing::warn!("{} vocabulary units have no class membership", unmodeled);
        }

        Ok(Self {
            ngram,
            membership,
            sentence_end_unit: vocab.sentence_end(),
            sentence_end_symbol,
        })
    }

    pub fn load(ngram: &Path, memberships: &Path, vocab: &Vocabulary) -> Result<Self, ModelError> {
        let class_ngram = Ngram::load(ngram)?;
        let file = std::fs::File::open(memberships).map_err(|e| ModelError::read(memberships, e))?;
        let table = read_memberships(std::io::BufReader::new(file), memberships)?;
        tracing::info!("Loaded {} class memberships from {:?}", table.len(), memberships);
        Self::new(class_ngram, &table, vocab)
    }

    pub fn ngram(&self) -> &Ngram {
        &self.ngram
    }
}

impl LanguageModel for ClassLm {
    type State = NgramNode;

    fn sentence_start(&self) -> NgramNode {
        self.ngram.sentence_start_node()
    }

    fn score(&self, state: NgramNode, unit: UnitId) -> Option<(NgramNode, f32)> {
        let (class, membership) = (*self.membership.get(unit as usize)?)?;
        if unit == self.sentence_end_unit {
            let (next, lp) = self.ngram.score(state, self.sentence_end_symbol);
            Some((next, membership + lp))
        } else {
            let (next, lp) = self.ngram.score(state, class);
            Some((next, membership + lp))
        }
    }

    fn describe(&self) -> String {
        format!("class n-gram (order {})", self.ngram.order())
    }
}
