//! ARPA backoff n-gram models
//!
//! The model is stored as a trie: node 0 is the empty context, and each
//! n-gram is a node reached from its (n-1)-gram prefix. Every node keeps the
//! node of its longest existing suffix, so a failed lookup backs off by
//! adding the backoff weight and moving there. Scores are log10.

use super::LanguageModel;
use crate::error::ModelError;
use crate::network::UnitId;
use crate::vocab::{Vocabulary, SENTENCE_BEGIN, SENTENCE_END};
use rustc_hash::FxHashMap;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

/// Symbol index in an n-gram vocabulary
pub type SymbolId = u32;

/// Context (trie node) in an n-gram model
pub type NgramNode = u32;

pub const UNKNOWN: &str = "<unk>";

#[derive(Debug, Clone, Default)]
struct Entry {
    next: FxHashMap<SymbolId, NgramNode>,
    log_prob: f32,
    backoff: f32,
    backoff_node: NgramNode,
}

/// Backoff n-gram model read from an ARPA file
#[derive(Debug, Clone)]
pub struct Ngram {
    nodes: Vec<Entry>,
    symbols: Vec<String>,
    lookup: HashMap<String, SymbolId>,
    counts: Vec<usize>,
    sentence_start: NgramNode,
    sentence_end: Option<SymbolId>,
}

impl Ngram {
    pub const ROOT: NgramNode = 0;

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let file = std::fs::File::open(path).map_err(|e| ModelError::read(path, e))?;
        let lm = Self::from_reader(std::io::BufReader::new(file))
            .map_err(|e| ModelError::Arpa(format!("{}: {}", path.display(), e)))?;
        tracing::info!(
            "Loaded n-gram {:?}: order {}, counts {:?}",
            path,
            lm.order(),
            lm.counts
        );
        Ok(lm)
    }

    /// Parse an ARPA model. Errors carry the offending line number.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, String> {
        let mut lines = reader.lines().enumerate().map(|(i, l)| (i + 1, l));
        let mut next_line = move || -> Result<Option<(usize, String)>, String> {
            match lines.next() {
                Some((n, Ok(line))) => Ok(Some((n, line.trim().to_string()))),
                Some((n, Err(e))) => Err(format!("line {}: {}", n, e)),
                None => Ok(None),
            }
        };

        // Header
        let mut line = loop {
            match next_line()? {
                Some((_, l)) if l.is_empty() => continue,
                Some((n, l)) if l != "\\data\\" => {
                    return Err(format!("line {}: expected \\data\\ header, found '{}'", n, l))
                }
                Some(_) => break next_line()?,
                None => return Err("empty file".to_string()),
            }
        };

        let mut counts = Vec::new();
        while let Some((n, l)) = line.clone() {
            if l.is_empty() {
                break;
            }
            let count = l
                .strip_prefix("ngram ")
                .and_then(|rest| rest.split_once('='))
                .and_then(|(order, count)| {
                    let order: usize = order.trim().parse().ok()?;
                    let count: usize = count.trim().parse().ok()?;
                    (order == counts.len() + 1).then_some(count)
                })
                .ok_or_else(|| format!("line {}: invalid header line '{}'", n, l))?;
            counts.push(count);
            line = next_line()?;
        }
        if counts.is_empty() {
            return Err("header declares no n-gram orders".to_string());
        }

        let total: usize = counts.iter().sum();
        let mut lm = Ngram {
            nodes: Vec::with_capacity(total + 1),
            symbols: Vec::with_capacity(counts[0]),
            lookup: HashMap::with_capacity(counts[0]),
            counts: counts.clone(),
            sentence_start: Self::ROOT,
            sentence_end: None,
        };
        lm.nodes.push(Entry::default());

        let mut pending = None;
        for order in 1..=counts.len() {
            // Section header
            let n = loop {
                let item = match pending.take() {
                    Some(p) => Some(p),
                    None => next_line()?,
                };
                match item {
                    Some((_, l)) if l.is_empty() => continue,
                    Some((n, l)) if l == format!("\\{}-grams:", order) => break n,
                    Some((n, l)) => {
                        return Err(format!(
                            "line {}: expected \\{}-grams: section, found '{}'",
                            n, order, l
                        ))
                    }
                    None => return Err(format!("missing \\{}-grams: section", order)),
                }
            };

            let mut read = 0;
            let mut last_line = n;
            loop {
                let (n, l) = match next_line()? {
                    Some((_, l)) if l.is_empty() => break,
                    Some((n, l)) if l.starts_with('\\') => {
                        pending = Some((n, l));
                        break;
                    }
                    Some(pair) => pair,
                    None => break,
                };
                last_line = n;
                lm.insert_line(order, &l).map_err(|e| format!("line {}: {}", n, e))?;
                read += 1;
            }
            if read != counts[order - 1] {
                return Err(format!(
                    "line {}: header declares {} {}-grams, section has {}",
                    last_line,
                    counts[order - 1],
                    order,
                    read
                ));
            }
        }

        let start_symbol = lm
            .symbol(SENTENCE_BEGIN)
            .ok_or_else(|| format!("no {} unigram", SENTENCE_BEGIN))?;
        lm.sentence_start = lm.nodes[Self::ROOT as usize].next[&start_symbol];
        lm.sentence_end = lm.symbol(SENTENCE_END);
        Ok(lm)
    }

    fn insert_line(&mut self, order: usize, line: &str) -> Result<(), String> {
        let mut fields = line.split_whitespace();
        let log_prob: f32 = fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or("invalid log-probability")?;
        if log_prob > 0.0 {
            return Err(format!("positive log-probability {}", log_prob));
        }

        let mut ngram = Vec::with_capacity(order);
        for _ in 0..order {
            let word = fields.next().ok_or("too few words")?;
            let symbol = match self.lookup.get(word) {
                Some(&s) => s,
                None if order == 1 => {
                    let s = self.symbols.len() as SymbolId;
                    self.symbols.push(word.to_string());
                    self.lookup.insert(word.to_string(), s);
                    s
                }
                None => return Err(format!("missing lower order n-gram for '{}'", word)),
            };
            ngram.push(symbol);
        }
        let backoff: f32 = match fields.next() {
            Some(f) => f.parse().map_err(|_| format!("invalid backoff weight '{}'", f))?,
            None => 0.0,
        };
        if fields.next().is_some() {
            return Err("trailing fields".to_string());
        }

        let (&last, prefix) = ngram.split_last().ok_or("empty n-gram")?;
        let parent = self
            .find(prefix)
            .ok_or_else(|| "missing lower order n-gram".to_string())?;
        if self.nodes[parent as usize].next.contains_key(&last) {
            return Err("duplicate n-gram".to_string());
        }

        // Longest existing proper suffix
        let backoff_node = (1..ngram.len())
            .find_map(|start| self.find(&ngram[start..]))
            .unwrap_or(Self::ROOT);

        let idx = self.nodes.len() as NgramNode;
        self.nodes.push(Entry {
            next: FxHashMap::default(),
            log_prob,
            backoff,
            backoff_node,
        });
        self.nodes[parent as usize].next.insert(last, idx);
        Ok(())
    }

    fn find(&self, ngram: &[SymbolId]) -> Option<NgramNode> {
        ngram.iter().try_fold(Self::ROOT, |node, symbol| {
            self.nodes[node as usize].next.get(symbol).copied()
        })
    }

    /// Score `symbol` after context `node`, backing off as needed. Returns
    /// the new context and the log10 probability.
    pub fn score(&self, mut node: NgramNode, symbol: SymbolId) -> (NgramNode, f32) {
        let mut log_prob = 0.0;
        loop {
            let entry = &self.nodes[node as usize];
            if let Some(&next) = entry.next.get(&symbol) {
                return (next, log_prob + self.nodes[next as usize].log_prob);
            }
            assert!(
                node != Self::ROOT,
                "n-gram symbol {} has no unigram",
                symbol
            );
            log_prob += entry.backoff;
            node = entry.backoff_node;
        }
    }

    /// New context after `symbol`, ignoring the score
    pub fn advance(&self, node: NgramNode, symbol: SymbolId) -> NgramNode {
        self.score(node, symbol).0
    }

    pub fn symbol(&self, word: &str) -> Option<SymbolId> {
        self.lookup.get(word).copied()
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn order(&self) -> usize {
        self.counts.len()
    }

    /// Number of n-grams per order, lowest first
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Context after `<s>`
    pub fn sentence_start_node(&self) -> NgramNode {
        self.sentence_start
    }

    pub fn sentence_end_symbol(&self) -> Option<SymbolId> {
        self.sentence_end
    }
}

/// Plain n-gram over vocabulary units
#[derive(Debug, Clone)]
pub struct NgramLm {
    ngram: Ngram,
    unit_symbols: Vec<Option<SymbolId>>,
}

impl NgramLm {
    /// Map vocabulary units to n-gram symbols. Units missing from the model
    /// fall back to `<unk>` when the model has it.
    pub fn new(ngram: Ngram, vocab: &Vocabulary) -> Self {
        let unknown = ngram.symbol(UNKNOWN);
        let mut missing = 0usize;
        let unit_symbols = vocab
            .labels()
            .iter()
            .map(|label| {
                ngram.symbol(label).or_else(|| {
                    missing += 1;
                    unknown
                })
            })
            .collect();
        if missing > 0 {
            tracing::warn!(
                "{} vocabulary units are not in the n-gram model{}",
                missing,
                if unknown.is_some() { ", mapped to <unk>" } else { "" }
            );
        }
        Self {
            ngram,
            unit_symbols,
        }
    }

    pub fn load(path: &Path, vocab: &Vocabulary) -> Result<Self, ModelError> {
        Ok(Self::new(Ngram::load(path)?, vocab))
    }

    pub fn ngram(&self) -> &Ngram {
        &self.ngram
    }

    /// Symbol a unit maps to, if the model covers it
    pub fn unit_symbol(&self, unit: UnitId) -> Option<SymbolId> {
        self.unit_symbols.get(unit as usize).copied().flatten()
    }
}

impl LanguageModel for NgramLm {
    type State = NgramNode;

    fn sentence_start(&self) -> NgramNode {
        self.ngram.sentence_start_node()
    }

    fn score(&self, state: NgramNode, unit: UnitId) -> Option<(NgramNode, f32)> {
        let symbol = self.unit_symbol(unit)?;
        Some(self.ngram.score(state, symbol))
    }

    fn describe(&self) -> String {
        format!("n-gram (order {})", self.ngram.order())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BIGRAM: &str = "\
\\data\\
ngram 1=5
ngram 2=4

\\1-grams:
-1.0 </s>
-99 <s> -0.5
-0.7 a -0.3
-0.9 b -0.2
-1.5 <unk>

\\2-grams:
-0.2 <s> a
-0.4 a b
-0.3 b </s>
-0.6 a </s>

\\end\\
";

    fn bigram() -> Ngram {
        Ngram::from_reader(BIGRAM.as_bytes()).unwrap()
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_read_arpa() {
        let lm = bigram();
        assert_eq!(lm.order(), 2);
        assert_eq!(lm.counts(), &[5, 4]);
        assert_eq!(lm.symbols().len(), 5);
        assert!(lm.sentence_end_symbol().is_some());
    }

    #[test]
    fn test_explicit_bigram() {
        let lm = bigram();
        let a = lm.symbol("a").unwrap();
        let (node, lp) = lm.score(lm.sentence_start_node(), a);
        assert!(close(lp, -0.2));
        let b = lm.symbol("b").unwrap();
        let (_, lp) = lm.score(node, b);
        assert!(close(lp, -0.4));
    }

    #[test]
    fn test_backoff() {
        let lm = bigram();
        // <s> b: backoff(<s>) + p(b)
        let b = lm.symbol("b").unwrap();
        let (node, lp) = lm.score(lm.sentence_start_node(), b);
        assert!(close(lp, -0.5 + -0.9));
        assert_eq!(node, lm.advance(Ngram::ROOT, b));
    }

    #[test]
    fn test_rejects_positive_log_prob() {
        let text = BIGRAM.replace("-0.7 a -0.3", "0.7 a -0.3");
        let err = Ngram::from_reader(text.as_bytes()).unwrap_err();
        assert!(err.contains("positive"), "{}", err);
    }

    #[test]
    fn test_rejects_missing_lower_order() {
        let text = BIGRAM.replace("-0.6 a </s>", "-0.6 a c");
        let err = Ngram::from_reader(text.as_bytes()).unwrap_err();
        assert!(err.contains("missing lower order"), "{}", err);
    }

    #[test]
    fn test_rejects_duplicate_and_count_mismatch() {
        let text = BIGRAM.replace("-0.6 a </s>", "-0.6 a b");
        let err = Ngram::from_reader(text.as_bytes()).unwrap_err();
        assert!(err.contains("duplicate"), "{}", err);

        let text = BIGRAM.replace("ngram 2=4", "ngram 2=5");
        let err = Ngram::from_reader(text.as_bytes()).unwrap_err();
        assert!(err.contains("declares 5"), "{}", err);
    }

    #[test]
    fn test_rejects_bad_header() {
        assert!(Ngram::from_reader("ngram 1=1\n".as_bytes()).is_err());
        assert!(Ngram::from_reader("".as_bytes()).is_err());
    }

    #[test]
    fn test_unit_mapping_with_unknown() {
        let vocab = Vocabulary::new(["<s>", "</s>", "a", "zzz"], None).unwrap();
        let lm = NgramLm::new(bigram(), &vocab);
        assert_eq!(lm.unit_symbol(3), lm.ngram().symbol(UNKNOWN));

        let start = lm.sentence_start();
        let (_, lp) = lm.score(start, 3).unwrap();
        assert!(close(lp, -0.5 + -1.5));
    }

    #[test]
    fn test_unit_without_unknown_is_rejected() {
        let text = BIGRAM.replace("ngram 1=5", "ngram 1=4").replace("-1.5 <unk>\n", "");
        let ngram = Ngram::from_reader(text.as_bytes()).unwrap();
        let vocab = Vocabulary::new(["<s>", "</s>", "zzz"], None).unwrap();
        let lm = NgramLm::new(ngram, &vocab);
        assert!(lm.score(lm.sentence_start(), 2).is_none());
    }
}
