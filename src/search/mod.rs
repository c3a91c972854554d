//! Token-passing beam search
//!
//! A [`Decoder`] owns the read-only models shared by every utterance: the
//! search network, the vocabulary, the language model and the optional
//! duration and lookahead scorers. Each utterance gets its own
//! [`Recognition`], which holds the token table and the history tries.
//!
//! # Frame loop
//!
//! ```text
//!   seed token at the decode start node
//!        │
//!        ▼
//!   ┌─────────────────────────────────────────────────────────────┐
//!   │ for each frame:                                             │
//!   │   reset accumulators                                        │
//!   │   propagate   table ──▶ raw tokens   (propagate.rs)         │
//!   │   prune       raw tokens ──▶ table   (prune.rs)             │
//!   │   recombine   best token per (node, LM state)               │
//!   │   every K frames: collect history garbage                   │
//!   └─────────────────────────────────────────────────────────────┘
//!        │
//!        ▼
//!   finalize: flush durations, force sentence ends, pick the best
//!   token and read its word history (finalize.rs, nbest.rs)
//! ```

pub mod finalize;
pub mod frame;
pub mod nbest;
pub mod propagate;
pub mod prune;
pub mod recombination;
pub mod token;

pub use frame::{FrameAccumulator, FrameStats, NO_SCORE};
pub use nbest::NbestStorage;
pub use prune::{Histogram, HISTOGRAM_BIN_COUNT};
pub use token::Token;

use crate::config::{NbestConfig, SearchConfig};
use crate::error::{DecodeError, ModelError, TokpassError};
use crate::history::{HistoryRef, StateHistory, WordHistory};
use crate::lm::LanguageModel;
use crate::network::{Arc, NodeIndex, SearchNetwork, UnitId};
use crate::result::RecognitionResult;
use crate::scorer::{AcousticScorer, DurationModel, LookaheadScorer, NoLookahead};
use crate::vocab::Vocabulary;
use rustc_hash::{FxHashMap, FxHashSet};
use std::time::Instant;

/// Units the search treats specially
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Markers {
    pub sentence_begin: UnitId,
    pub sentence_end: UnitId,
    /// Word boundary unit when decoding subwords
    pub word_boundary: Option<UnitId>,
}

/// Shared, read-only decoding setup
pub struct Decoder<L: LanguageModel> {
    network: SearchNetwork,
    vocab: Vocabulary,
    lm: L,
    lookahead: Box<dyn LookaheadScorer>,
    duration: Option<Box<dyn DurationModel>>,
    search: SearchConfig,
    nbest: NbestConfig,
    markers: Markers,
    /// Language model context at utterance start and after every sentence
    /// end, advanced through the word boundary when one is used
    start_state: L::State,
}

impl<L: LanguageModel> Decoder<L> {
    pub fn new(
        network: SearchNetwork,
        vocab: Vocabulary,
        lm: L,
        search: SearchConfig,
    ) -> Result<Self, TokpassError> {
        search.validate()?;

        if let Some(unit) = network
            .nodes()
            .iter()
            .filter_map(|n| n.unit)
            .find(|&u| u as usize >= vocab.len())
        {
            return Err(ModelError::Network(format!(
                "unit id {} is outside the vocabulary ({} units)",
                unit,
                vocab.len()
            ))
            .into());
        }

        let markers = Markers {
            sentence_begin: vocab.sentence_begin(),
            sentence_end: vocab.sentence_end(),
            word_boundary: vocab.word_boundary(),
        };

        let mut start_state = lm.sentence_start();
        if let Some(boundary) = markers.word_boundary {
            start_state = lm
                .score(start_state, boundary)
                .map(|(state, _)| state)
                .ok_or_else(|| ModelError::UnknownUnit(vocab.label(boundary).to_string()))?;
        }

        tracing::info!(
            "Decoder ready: {} nodes, {} arcs, {} units, lm={}",
            network.len(),
            network.arc_count(),
            vocab.len(),
            lm.describe()
        );

        Ok(Self {
            network,
            vocab,
            lm,
            lookahead: Box::new(NoLookahead),
            duration: None,
            search,
            nbest: NbestConfig::default(),
            markers,
            start_state,
        })
    }

    pub fn with_lookahead(mut self, lookahead: Box<dyn LookaheadScorer>) -> Self {
        self.lookahead = lookahead;
        self
    }

    pub fn with_duration_model(mut self, duration: Option<Box<dyn DurationModel>>) -> Self {
        self.duration = duration;
        self
    }

    /// Enable or configure alternate hypotheses. Tracking recombination
    /// links disables history garbage collection.
    pub fn with_nbest(mut self, nbest: NbestConfig) -> Self {
        self.nbest = nbest;
        self
    }

    pub fn network(&self) -> &SearchNetwork {
        &self.network
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn lm(&self) -> &L {
        &self.lm
    }

    pub fn search_config(&self) -> &SearchConfig {
        &self.search
    }

    pub fn nbest_config(&self) -> &NbestConfig {
        &self.nbest
    }

    pub fn markers(&self) -> Markers {
        self.markers
    }

    pub fn start_state(&self) -> L::State {
        self.start_state
    }

    /// Start a new utterance
    pub fn recognition(&self) -> Recognition<'_, L> {
        Recognition::new(self)
    }

    /// Decode one utterance, reading frames until the scorer runs out
    pub fn recognize(
        &self,
        acoustics: &mut dyn AcousticScorer,
    ) -> Result<RecognitionResult, DecodeError> {
        self.recognition().run(acoustics)
    }
}

/// Search state of one utterance
pub struct Recognition<'d, L: LanguageModel> {
    decoder: &'d Decoder<L>,
    /// Recombination table: node -> LM state -> best token
    table: Vec<FxHashMap<L::State, Token<L::State>>>,
    /// Nodes with at least one token in `table`
    active_nodes: Vec<NodeIndex>,
    raw_tokens: Vec<Token<L::State>>,
    expansion_stack: Vec<(Token<L::State>, Arc)>,
    word_history: WordHistory,
    state_history: StateHistory,
    acc: FrameAccumulator,
    stats: FrameStats,
    /// Tokens binned below this are skipped in the next expansion
    histogram_bin_limit: usize,
    frame: usize,
    total_token_count: u64,
    track_links: bool,
    links_recorded: usize,
}

impl<'d, L: LanguageModel> Recognition<'d, L> {
    fn new(decoder: &'d Decoder<L>) -> Self {
        let node_count = decoder.network.len();
        let mut recognition = Self {
            decoder,
            table: vec![FxHashMap::default(); node_count],
            active_nodes: Vec::new(),
            raw_tokens: Vec::new(),
            expansion_stack: Vec::new(),
            word_history: WordHistory::with_root(decoder.markers.sentence_begin),
            state_history: StateHistory::with_empty_root(),
            acc: FrameAccumulator::new(node_count),
            stats: FrameStats::default(),
            histogram_bin_limit: 0,
            frame: 0,
            total_token_count: 0,
            track_links: decoder.nbest.enabled,
            links_recorded: 0,
        };
        recognition.reset();
        recognition
    }

    /// Start over with a single seed token at the decode start node. Every
    /// history handle from before the reset becomes stale; allocations are
    /// kept for the next utterance.
    pub fn reset(&mut self) {
        let decoder = self.decoder;
        let markers = decoder.markers;

        for node in self.active_nodes.drain(..) {
            self.table[node as usize].clear();
        }
        self.raw_tokens.clear();
        self.expansion_stack.clear();
        self.word_history.clear_units(markers.sentence_begin);
        self.state_history.clear_visits();
        self.acc.reset();
        self.stats = FrameStats::default();
        self.histogram_bin_limit = 0;
        self.frame = 0;
        self.total_token_count = 0;
        self.links_recorded = 0;

        let mut history = self.word_history.root();
        let mut last_unit = markers.sentence_begin;
        if let Some(boundary) = markers.word_boundary {
            history = self.word_history.push_unit(history, boundary);
            last_unit = boundary;
        }

        let start = decoder.network.decode_start();
        let seed = Token {
            node: start,
            am_log_prob: 0.0,
            lm_log_prob: 0.0,
            lookahead_log_prob: 0.0,
            total_log_prob: 0.0,
            lm_state: decoder.start_state,
            last_unit,
            duration: 0,
            word_end: false,
            histogram_bin: HISTOGRAM_BIN_COUNT - 1,
            word_history: history,
            state_history: self.state_history.root(),
        };
        self.table[start as usize].insert(seed.lm_state, seed);
        self.active_nodes.push(start);
    }

    /// Decode one frame. The scorer must already be positioned on it and
    /// cover every emitting state of the network.
    pub fn step(&mut self, acoustics: &dyn AcousticScorer) -> Result<(), DecodeError> {
        let frame = self.frame;
        self.acc.reset();
        self.stats = FrameStats::default();

        self.propagate_tokens(acoustics);
        self.prune_tokens();
        self.total_token_count += self.stats.tokens_expanded as u64;
        self.frame += 1;

        if self.active_nodes.is_empty() {
            self.stats.log(frame, self.acc.best_log_prob);
            tracing::debug!("No tokens left after frame {}", frame);
            return Err(DecodeError::NoSurvivingHypothesis { frame });
        }

        let interval = self.decoder.search.history_clean_frame_interval;
        if !self.track_links && self.frame % interval == 0 {
            self.collect_history_garbage();
        }
        self.stats.log(frame, self.acc.best_log_prob);
        Ok(())
    }

    /// Decode all remaining frames and finalize
    pub fn run(
        mut self,
        acoustics: &mut dyn AcousticScorer,
    ) -> Result<RecognitionResult, DecodeError> {
        let started = Instant::now();
        while acoustics.go_to(self.frame) {
            if self.frame == 0 {
                let required = self.decoder.network.state_count();
                if acoustics.state_count() < required {
                    return Err(DecodeError::MissingAcousticStates {
                        available: acoustics.state_count(),
                        required,
                    });
                }
            }
            self.step(&*acoustics)?;
        }
        if self.frame == 0 {
            return Err(DecodeError::EmptyUtterance);
        }
        self.finish(started.elapsed())
    }

    /// Free history nodes no token in the table can reach
    pub fn collect_history_garbage(&mut self) -> usize {
        let mut live_words = FxHashSet::default();
        let mut live_states = FxHashSet::default();
        for token in self.tokens() {
            live_words.insert(token.word_history);
            live_states.insert(token.state_history);
        }

        let freed = self.word_history.collect_garbage(&live_words)
            + self.state_history.collect_garbage(&live_states);
        self.stats.histories_freed = freed;
        tracing::trace!(
            frame = self.frame,
            freed,
            word_nodes = self.word_history.len(),
            state_nodes = self.state_history.len(),
            "history garbage collected"
        );
        freed
    }

    /// Tokens currently in the recombination table
    pub fn tokens(&self) -> impl Iterator<Item = &Token<L::State>> + '_ {
        self.active_nodes
            .iter()
            .flat_map(move |&node| self.table[node as usize].values())
    }

    pub fn token_count(&self) -> usize {
        self.tokens().count()
    }

    /// Frames decoded so far
    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn word_history(&self) -> &WordHistory {
        &self.word_history
    }

    pub fn state_history(&self) -> &StateHistory {
        &self.state_history
    }

    /// Unit sequence of a word history node, root included
    pub fn units(&self, history: HistoryRef) -> Vec<UnitId> {
        self.word_history.units(history)
    }

    pub fn links_recorded(&self) -> usize {
        self.links_recorded
    }
}
