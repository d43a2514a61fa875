//! Newly-fixed word extraction for downstream synthesis.
//!
//! The reconciler consumes each result as a full replacement; synthesis
//! instead needs only the delta since the last update. The cursor keeps
//! an index into the current sentence's word list and emits each fixed
//! word exactly once.

use crate::recognition::types::IncrementalResult;

/// One unit handed to the synthesis queue. A sentence boundary is the
/// empty-text item with `is_sentence_end` set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedWord {
    pub text: String,
    pub is_sentence_end: bool,
}

impl FixedWord {
    pub fn word(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_sentence_end: false,
        }
    }

    pub fn sentence_end() -> Self {
        Self {
            text: String::new(),
            is_sentence_end: true,
        }
    }
}

/// Per-sentence cursor over a language track's fixed words.
///
/// Created fresh for every recognition session; the position resets on
/// each sentence boundary.
#[derive(Debug, Default)]
pub struct FixedWordCursor {
    emitted: usize,
    sentences: u64,
}

impl FixedWordCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sentences completed since this cursor was created.
    pub fn sentences(&self) -> u64 {
        self.sentences
    }

    /// Extract the fixed words this result newly finalized.
    ///
    /// Unfixed words are never emitted — they may still be rewritten. On
    /// a sentence end, a boundary marker follows the words and the
    /// position resets for the next sentence.
    pub fn advance(&mut self, result: &IncrementalResult) -> Vec<FixedWord> {
        let mut out = Vec::new();

        for (i, word) in result.words.iter().enumerate() {
            if word.is_fixed && i >= self.emitted {
                out.push(FixedWord::word(word.text.clone()));
                self.emitted = i + 1;
            }
        }

        if result.is_sentence_end {
            self.sentences += 1;
            self.emitted = 0;
            out.push(FixedWord::sentence_end());
        }

        out
    }
}
