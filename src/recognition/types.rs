//! Data types for the recognition event stream.

use std::collections::HashMap;
use thiserror::Error;

/// One output token from the recognizer or translator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub text: String,
    /// A fixed word will not be revised further; an unfixed word is
    /// provisional and may be overwritten by a later update for the same
    /// sentence.
    pub is_fixed: bool,
}

impl Word {
    pub fn fixed(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_fixed: true,
        }
    }

    pub fn unfixed(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_fixed: false,
        }
    }
}

/// One incremental update for the sentence currently being recognized.
///
/// Produced repeatedly for the same sentence until `is_sentence_end`,
/// after which the next result belongs to a new sentence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IncrementalResult {
    pub words: Vec<Word>,
    pub is_sentence_end: bool,
    /// Trailing unflushed tail: a just-finalized revision delivered after
    /// the main word list.
    pub stash: Option<Vec<Word>>,
}

/// One service event: the transcription update plus per-language
/// translation updates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecognitionEvent {
    pub request_id: String,
    pub transcription: Option<IncrementalResult>,
    pub translations: HashMap<String, IncrementalResult>,
}

/// Typed failure classification for a recognition session.
///
/// Replaces the service SDK's ad hoc exception classes; the retry policy
/// keys off the variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("network error: {0}")]
    Network(String),

    #[error("audio device error: {0}")]
    Device(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("{0}")]
    Unknown(String),
}

/// Parameters for opening one recognition session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    /// Short source-language code, e.g. "zh".
    pub source_language: String,
    /// Short target-language codes, e.g. ["en"].
    pub target_languages: Vec<String>,
    pub semantic_punctuation: bool,
}
