//! Language models
//!
//! Provides unit scoring via:
//! - Plain backoff n-gram ([`NgramLm`])
//! - Class n-gram with membership probabilities ([`ClassLm`])
//! - Word/class/subword interpolation ([`InterpolatedLm`])
//!
//! All scores are log10, the domain of the ARPA files they are read from.

pub mod class;
pub mod interpolated;
pub mod ngram;

pub use class::ClassLm;
pub use interpolated::{InterpolatedLm, InterpolatedState};
pub use ngram::{Ngram, NgramLm};

use crate::config::{LmConfig, LmKind};
use crate::error::ModelError;
use crate::network::UnitId;
use crate::vocab::Vocabulary;
use std::fmt::Debug;
use std::hash::Hash;

/// Trait for language models driven by the decoder.
///
/// The state is an opaque context owned by each token. Two tokens with equal
/// states are indistinguishable to the model and get recombined.
pub trait LanguageModel: Send + Sync {
    type State: Copy + Eq + Hash + Debug + Send + Sync;

    /// Context after the sentence begin marker
    fn sentence_start(&self) -> Self::State;

    /// Score `unit` in context `state`, backing off as needed.
    ///
    /// Returns `None` when the model cannot score the unit at all; the
    /// decoder then drops that expansion.
    fn score(&self, state: Self::State, unit: UnitId) -> Option<(Self::State, f32)>;

    /// Short human-readable description for logs
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Language model selected by configuration
pub enum ConfiguredLm {
    Ngram(NgramLm),
    Class(ClassLm),
    Interpolated(InterpolatedLm),
}

/// Factory function to load the configured language model
pub fn create_language_model(
    config: &LmConfig,
    vocab: &Vocabulary,
) -> Result<ConfiguredLm, ModelError> {
    tracing::info!("Loading language model: kind={:?}", config.kind);

    let missing = |key: &str| ModelError::Arpa(format!("lm.{} is not set", key));
    match config.kind {
        LmKind::Ngram => {
            let path = config.ngram.as_deref().ok_or_else(|| missing("ngram"))?;
            Ok(ConfiguredLm::Ngram(NgramLm::load(path, vocab)?))
        }
        LmKind::Class => {
            let ngram = config
                .class_ngram
                .as_deref()
                .ok_or_else(|| missing("class_ngram"))?;
            let memberships = config
                .class_memberships
                .as_deref()
                .ok_or_else(|| missing("class_memberships"))?;
            Ok(ConfiguredLm::Class(ClassLm::load(ngram, memberships, vocab)?))
        }
        LmKind::Interpolated => Ok(ConfiguredLm::Interpolated(InterpolatedLm::load(
            config, vocab,
        )?)),
    }
}
