//! Error types for tokpass
//!
//! Uses thiserror for ergonomic error definitions. Model loading errors are
//! fatal and carry enough context (file, line) to fix the input; decoding
//! errors are per utterance and leave sibling utterances untouched.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the tokpass library
#[derive(Error, Debug)]
pub enum TokpassError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Decoding error: {0}")]
    Decode(#[from] DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decoding worker failed: {0}")]
    Worker(String),
}

/// Errors raised while loading the search network, vocabulary, language
/// models or acoustic scores. These are never recovered from.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Invalid search network: {0}")]
    Network(String),

    #[error("Invalid ARPA language model: {0}")]
    Arpa(String),

    #[error("Unit '{0}' is not in the vocabulary")]
    UnknownUnit(String),

    #[error("Vocabulary has no '{0}' marker")]
    MissingMarker(&'static str),

    #[error("{path}: acoustic file has {states} states per frame, network needs {required}")]
    AcousticWidth {
        path: PathBuf,
        states: usize,
        required: usize,
    },
}

impl ModelError {
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ModelError::Read {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        ModelError::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}

/// Errors for a single utterance. The caller may retry with wider beams.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("No hypothesis survived pruning (frame {frame}). Try widening the beams or raising token_limit.")]
    NoSurvivingHypothesis { frame: usize },

    #[error("Utterance has no acoustic frames")]
    EmptyUtterance,

    #[error("Acoustic scorer has {available} states per frame, network needs {required}")]
    MissingAcousticStates { available: usize, required: usize },
}

/// Result type alias using TokpassError
pub type Result<T> = std::result::Result<T, TokpassError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_message_has_location() {
        let err = ModelError::parse("graph.txt", 12, "expected 'n' record");
        assert_eq!(err.to_string(), "graph.txt:12: expected 'n' record");
    }

    #[test]
    fn test_decode_error_converts() {
        let err: TokpassError = DecodeError::EmptyUtterance.into();
        assert!(matches!(err, TokpassError::Decode(DecodeError::EmptyUtterance)));
    }
}
