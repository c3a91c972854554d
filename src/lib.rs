//! tokpass: token-passing beam-search decoder for large-vocabulary speech
//! recognition
//!
//! This library provides:
//! - Loading a precompiled search network and vocabulary
//! - Backoff n-gram, class n-gram and interpolated word/class/subword
//!   language models read from ARPA files
//! - Frame-synchronous token passing with global, node and word-end beams,
//!   histogram population control and recombination
//! - Garbage-collected word and state history tries for reconstructing the
//!   winning unit sequence, its time alignment and alternate hypotheses
//! - A worker pool decoding independent utterances in parallel
//!
//! # Architecture
//!
//! ```text
//!   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!   │   Network    │   │  Vocabulary  │   │   Language   │   │  Lookahead / │
//!   │  (graph.txt) │   │  (vocab.txt) │   │    model     │   │   Duration   │
//!   └──────┬───────┘   └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!          └──────────────────┴─────────┬────────┴──────────────────┘
//!                                       ▼
//!                               ┌──────────────┐
//!                               │   Decoder    │  shared, read-only
//!                               └──────┬───────┘
//!                      ┌───────────────┼───────────────┐
//!                      ▼               ▼               ▼
//!               ┌────────────┐  ┌────────────┐  ┌────────────┐
//!   frames ───▶ │Recognition │  │Recognition │  │Recognition │  one per utterance
//!               └─────┬──────┘  └─────┬──────┘  └─────┬──────┘
//!                     ▼               ▼               ▼
//!               RecognitionResult (best, alternates, alignment)
//! ```

pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod lm;
pub mod network;
pub mod result;
pub mod scorer;
pub mod search;
pub mod vocab;

pub use config::Config;
pub use error::{DecodeError, ModelError, Result, TokpassError};
pub use network::SearchNetwork;
pub use result::{Hypothesis, RecognitionResult, TotalStats};
pub use search::{Decoder, Recognition};
pub use vocab::Vocabulary;
