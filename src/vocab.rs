//! Vocabulary units
//!
//! Units are listed one per line; the line number (from zero) is the unit id
//! used by the search network. The table must contain the sentence markers
//! `<s>` and `</s>`.

use crate::error::ModelError;
use crate::network::UnitId;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

pub const SENTENCE_BEGIN: &str = "<s>";
pub const SENTENCE_END: &str = "</s>";

/// Unit label table with resolved sentence and word boundary markers
#[derive(Debug, Clone)]
pub struct Vocabulary {
    units: Vec<String>,
    lookup: HashMap<String, UnitId>,
    sentence_begin: UnitId,
    sentence_end: UnitId,
    word_boundary: Option<UnitId>,
}

impl Vocabulary {
    /// Build a vocabulary from labels. `word_boundary`, when given, must be
    /// one of the labels.
    pub fn new<I, S>(labels: I, word_boundary: Option<&str>) -> Result<Self, ModelError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let units: Vec<String> = labels.into_iter().map(Into::into).collect();
        let mut lookup = HashMap::with_capacity(units.len());
        for (idx, unit) in units.iter().enumerate() {
            // First occurrence wins
            lookup.entry(unit.clone()).or_insert(idx as UnitId);
        }

        let sentence_begin = *lookup
            .get(SENTENCE_BEGIN)
            .ok_or(ModelError::MissingMarker(SENTENCE_BEGIN))?;
        let sentence_end = *lookup
            .get(SENTENCE_END)
            .ok_or(ModelError::MissingMarker(SENTENCE_END))?;
        let word_boundary = match word_boundary {
            Some(label) => Some(
                *lookup
                    .get(label)
                    .ok_or_else(|| ModelError::UnknownUnit(label.to_string()))?,
            ),
            None => None,
        };

        Ok(Self {
            units,
            lookup,
            sentence_begin,
            sentence_end,
            word_boundary,
        })
    }

    /// Read one unit per line
    pub fn load(path: &Path, word_boundary: Option<&str>) -> Result<Self, ModelError> {
        let file = std::fs::File::open(path).map_err(|e| ModelError::read(path, e))?;
        let mut labels = Vec::new();
        for line in std::io::BufReader::new(file).lines() {
            let line = line.map_err(|e| ModelError::read(path, e))?;
            labels.push(line.trim().to_string());
        }
        let vocab = Self::new(labels, word_boundary)?;
        tracing::info!("Loaded vocabulary {:?}: {} units", path, vocab.len());
        Ok(vocab)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn label(&self, unit: UnitId) -> &str {
        &self.units[unit as usize]
    }

    pub fn labels(&self) -> &[String] {
        &self.units
    }

    pub fn id(&self, label: &str) -> Option<UnitId> {
        self.lookup.get(label).copied()
    }

    pub fn sentence_begin(&self) -> UnitId {
        self.sentence_begin
    }

    pub fn sentence_end(&self) -> UnitId {
        self.sentence_end
    }

    pub fn word_boundary(&self) -> Option<UnitId> {
        self.word_boundary
    }

    pub fn is_sentence_marker(&self, unit: UnitId) -> bool {
        unit == self.sentence_begin || unit == self.sentence_end
    }

    /// Render units as text. With a word boundary marker, the subword units
    /// between markers are glued into one word.
    pub fn render(&self, units: &[UnitId]) -> String {
        match self.word_boundary {
            None => units
                .iter()
                .map(|&u| self.label(u))
                .collect::<Vec<_>>()
                .join(" "),
            Some(boundary) => {
                let mut words: Vec<String> = Vec::new();
                let mut current = String::new();
                for &unit in units {
                    if unit == boundary {
                        if !current.is_empty() {
                            words.push(std::mem::take(&mut current));
                        }
                    } else if self.is_sentence_marker(unit) {
                        if !current.is_empty() {
                            words.push(std::mem::take(&mut current));
                        }
                        words.push(self.label(unit).to_string());
                    } else {
                        current.push_str(self.label(unit));
                    }
                }
                if !current.is_empty() {
                    words.push(current);
                }
                words.join(" ")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_markers() {
        let vocab = Vocabulary::new(["<s>", "</s>", "<w>", "hello"], Some("<w>")).unwrap();
        assert_eq!(vocab.sentence_begin(), 0);
        assert_eq!(vocab.sentence_end(), 1);
        assert_eq!(vocab.word_boundary(), Some(2));
        assert_eq!(vocab.id("hello"), Some(3));
        assert_eq!(vocab.id("world"), None);
    }

    #[test]
    fn test_missing_markers() {
        let err = Vocabulary::new(["<s>", "a"], None).unwrap_err();
        assert!(matches!(err, ModelError::MissingMarker("</s>")));

        let err = Vocabulary::new(["<s>", "</s>"], Some("<w>")).unwrap_err();
        assert!(matches!(err, ModelError::UnknownUnit(_)));
    }

    #[test]
    fn test_render_words() {
        let vocab = Vocabulary::new(["<s>", "</s>", "hello", "world"], None).unwrap();
        assert_eq!(vocab.render(&[2, 3]), "hello world");
        assert_eq!(vocab.render(&[]), "");
    }

    #[test]
    fn test_render_subwords() {
        let vocab =
            Vocabulary::new(["<s>", "</s>", "<w>", "talo", "ssa", "on"], Some("<w>")).unwrap();
        assert_eq!(vocab.render(&[2, 3, 4, 2, 5, 2]), "talossa on");
        assert_eq!(vocab.render(&[0, 2, 3, 2, 1]), "<s> talo </s>");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.txt");
        std::fs::write(&path, "<s>\n</s>\nyes\nno\n").unwrap();
        let vocab = Vocabulary::load(&path, None).unwrap();
        assert_eq!(vocab.len(), 4);
        assert_eq!(vocab.label(3), "no");
    }
}
