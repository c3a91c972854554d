//! Word, class and subword n-grams interpolated in the probability domain
//!
//! Each unit is scored by all three models. The subword model scores the
//! unit's segmentation, followed by the word boundary symbol `<w>` when the
//! subword model has one. The three log10 scores are combined as
//! `log(w_word * P_word + w_class * P_class + w_subword * P_subword)`.

use super::class::ClassLm;
use super::ngram::{Ngram, NgramLm, NgramNode, SymbolId};
use super::LanguageModel;
use crate::error::ModelError;
use crate::network::UnitId;
use crate::scorer::log_add;
use crate::vocab::Vocabulary;
use std::collections::HashMap;
use std::f64::consts::LN_10;
use std::io::BufRead;
use std::path::Path;

pub const SUBWORD_BOUNDARY: &str = "<w>";

/// Contexts of the three component models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterpolatedState {
    pub word: NgramNode,
    pub class: NgramNode,
    pub subword: NgramNode,
}

/// Read `word sw1 sw2 ...` segmentation lines
pub fn read_segmentations<R: BufRead>(
    reader: R,
    origin: &Path,
) -> Result<HashMap<String, Vec<String>>, ModelError> {
    let mut segmentations = HashMap::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| ModelError::read(origin, e))?;
        let mut fields = line.split_whitespace();
        let Some(word) = fields.next() else { continue };
        let subwords: Vec<String> = fields.map(str::to_string).collect();
        if subwords.is_empty() {
            return Err(ModelError::parse(
                origin,
                idx + 1,
                format!("word '{}' has no segmentation", word),
            ));
        }
        segmentations.insert(word.to_string(), subwords);
    }
    Ok(segmentations)
}

#[derive(Debug, Clone)]
pub struct InterpolatedLm {
    word: NgramLm,
    class: ClassLm,
    subword: Ngram,
    /// Subword symbols scored for each unit
    unit_subwords: Vec<Vec<SymbolId>>,
    subword_start: NgramNode,
    /// Natural log interpolation weights: word, class, subword
    log_weights: [f64; 3],
}

impl InterpolatedLm {
    /// `log_weights` are natural log weights, see
    /// [`crate::config::LmConfig::log_weights`].
    pub fn new(
        word: NgramLm,
        class: ClassLm,
        subword: Ngram,
        segmentations: &HashMap<String, Vec<String>>,
        vocab: &Vocabulary,
        log_weights: [f64; 3],
    ) -> Result<Self, ModelError> {
        let boundary = subword.symbol(SUBWORD_BOUNDARY);
        let lookup = |label: &str| {
            subword
                .symbol(label)
                .ok_or_else(|| ModelError::UnknownUnit(format!("{} (subword model)", label)))
        };

        let mut unit_subwords = Vec::with_capacity(vocab.len());
        for label in vocab.labels() {
            let mut symbols = Vec::new();
            if label.starts_with('<') {
                // Markers are scored as themselves
                symbols.push(lookup(label)?);
            } else {
                let segments = segmentations
                    .get(label)
                    .ok_or_else(|| ModelError::UnknownUnit(format!("{} (segmentations)", label)))?;
                for segment in segments {
                    symbols.push(lookup(segment)?);
                }
                symbols.extend(boundary);
            }
            unit_subwords.push(symbols);
        }

        let mut subword_start = subword.sentence_start_node();
        if let Some(b) = boundary {
            subword_start = subword.advance(subword_start, b);
        }

        Ok(Self {
            word,
            class,
            subword,
            unit_subwords,
            subword_start,
            log_weights,
        })
    }

    pub fn load(
        config: &crate::config::LmConfig,
        vocab: &Vocabulary,
    ) -> Result<Self, ModelError> {
        let require = |path: &Option<std::path::PathBuf>, key: &'static str| {
            path.clone().ok_or_else(|| {
                ModelError::Arpa(format!("interpolated model needs lm.{} to be set", key))
            })
        };
        let word = NgramLm::load(&require(&config.ngram, "ngram")?, vocab)?;
        let class = ClassLm::load(
            &require(&config.class_ngram, "class_ngram")?,
            &require(&config.class_memberships, "class_memberships")?,
            vocab,
        )?;
        let subword = Ngram::load(&require(&config.subword_ngram, "subword_ngram")?)?;
        let seg_path = require(&config.subword_segmentations, "subword_segmentations")?;
        let file = std::fs::File::open(&seg_path).map_err(|e| ModelError::read(&seg_path, e))?;
        let segmentations = read_segmentations(std::io::BufReader::new(file), &seg_path)?;
        let log_weights = config
            .log_weights()
            .map_err(|e| ModelError::Arpa(e.to_string()))?;
        Self::new(word, class, subword, &segmentations, vocab, log_weights)
    }

    fn subword_score(&self, mut state: NgramNode, unit: UnitId) -> (NgramNode, f32) {
        let mut total = 0.0;
        for &symbol in &self.unit_subwords[unit as usize] {
            let (next, lp) = self.subword.score(state, symbol);
            state = next;
            total += lp;
        }
        (state, total)
    }
}

impl LanguageModel for InterpolatedLm {
    type State = InterpolatedState;

    fn sentence_start(&self) -> InterpolatedState {
        InterpolatedState {
            word: self.word.sentence_start(),
            class: self.class.sentence_start(),
            subword: self.subword_start,
        }
    }

    fn score(&self, state: InterpolatedState, unit: UnitId) -> Option<(InterpolatedState, f32)> {
        let (class, class_lp) = self.class.score(state.class, unit)?;
        let (word, word_lp) = self.word.score(state.word, unit)?;
        let (subword, subword_lp) = self.subword_score(state.subword, unit);

        let [ww, cw, sw] = self.log_weights;
        let combined = log_add(
            log_add(word_lp as f64 * LN_10 + ww, class_lp as f64 * LN_10 + cw),
            subword_lp as f64 * LN_10 + sw,
        );
        Some((
            InterpolatedState {
                word,
                class,
                subword,
            },
            (combined / LN_10) as f32,
        ))
    }

    fn describe(&self) -> String {
        format!(
            "interpolated word/class/subword (weights {:.3}/{:.3}/{:.3})",
            self.log_weights[0].exp(),
            self.log_weights[1].exp(),
            self.log_weights[2].exp()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lm::class::read_memberships;

    fn unigram(words: &[(&str, f32)]) -> Ngram {
        let mut text = format!("\\data\\\nngram 1={}\n\n\\1-grams:\n", words.len());
        for (w, lp) in words {
            text.push_str(&format!("{} {}\n", lp, w));
        }
        text.push_str("\n\\end\\\n");
        Ngram::from_reader(text.as_bytes()).unwrap()
    }

    fn model(weights: [f64; 3]) -> InterpolatedLm {
        let vocab = Vocabulary::new(["<s>", "</s>", "talossa"], None).unwrap();
        let word = NgramLm::new(unigram(&[("<s>", -99.0), ("</s>", -1.0), ("talossa", -2.0)]), &vocab);
        let class_ngram = unigram(&[("<s>", -99.0), ("</s>", -1.0), ("0", -1.0)]);
        let memberships =
            read_memberships("<s> 0 0.0\ntalossa 0 -1.0\n".as_bytes(), Path::new("c")).unwrap();
        let class = ClassLm::new(class_ngram, &memberships, &vocab).unwrap();
        let subword = unigram(&[
            ("<s>", -99.0),
            ("</s>", -1.0),
            ("<w>", -0.5),
            ("talo", -1.0),
            ("ssa", -1.5),
        ]);
        let segs = read_segmentations("talossa talo ssa\n".as_bytes(), Path::new("s")).unwrap();
        let weights = weights.map(f64::ln);
        InterpolatedLm::new(word, class, subword, &segs, &vocab, weights).unwrap()
    }

    #[test]
    fn test_interpolates_in_probability_domain() {
        let lm = model([0.5, 0.25, 0.25]);
        let (_, lp) = lm.score(lm.sentence_start(), 2).unwrap();
        // word -2, class -1 + -1, subword -1 + -1.5 + -0.5
        let expected = (0.5 * 1e-2 + 0.25 * 1e-2 + 0.25 * 1e-3f64).log10();
        assert!((lp as f64 - expected).abs() < 1e-5, "{} vs {}", lp, expected);
    }

    #[test]
    fn test_single_component_weight() {
        let lm = model([1.0, 1e-30, 1e-30]);
        let (_, lp) = lm.score(lm.sentence_start(), 2).unwrap();
        assert!((lp + 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_missing_segmentation_is_an_error() {
        let vocab = Vocabulary::new(["<s>", "</s>", "talossa", "on"], None).unwrap();
        let lm = model([0.4, 0.3, 0.3]);
        let segs = read_segmentations("talossa talo ssa\n".as_bytes(), Path::new("s")).unwrap();
        let err = InterpolatedLm::new(
            lm.word.clone(),
            lm.class.clone(),
            lm.subword.clone(),
            &segs,
            &vocab,
            [0.0; 3],
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::UnknownUnit(_)));
    }
}
