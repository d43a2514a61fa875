//! Rolling transcript reconciliation.
//!
//! The recognition service re-sends the current sentence on every update:
//! each [`IncrementalResult`] is a full replacement of the in-progress
//! sentence, not a delta. The reconciler overwrites the open tail line
//! with every result and closes the line when the service signals a
//! sentence boundary.

use crate::defaults;
use crate::recognition::types::{IncrementalResult, Word};
use std::collections::VecDeque;

/// One transcript line: the stable part and the provisional remainder.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TranscriptLine {
    /// Text the recognizer will not revise further.
    pub fixed: String,
    /// Provisional text that may be rewritten by the next result.
    pub unfixed: String,
}

impl TranscriptLine {
    fn is_empty(&self) -> bool {
        self.fixed.is_empty() && self.unfixed.is_empty()
    }

    fn text(&self) -> String {
        format!("{}{}", self.fixed, self.unfixed)
    }
}

/// Snapshot handed across the UI boundary.
///
/// `settled` holds every closed line, `active` the open tail; the split
/// exists because the display renders the two in different styles and
/// synthesis only ever consumes fixed text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderedTranscript {
    pub settled: String,
    pub active: String,
}

impl RenderedTranscript {
    /// Full rendered text, settled lines followed by the active line.
    pub fn text(&self) -> String {
        format!("{}{}", self.settled, self.active)
    }
}

/// Bounded rolling buffer of transcript lines.
///
/// Invariant: exactly one open line exists at the tail at all times; it
/// is created immediately after the prior line closes. When capacity is
/// exceeded the oldest completed lines are evicted from the front.
#[derive(Debug)]
pub struct TranscriptBuffer {
    lines: VecDeque<TranscriptLine>,
    capacity: usize,
}

impl TranscriptBuffer {
    pub fn new(capacity: usize) -> Self {
        let mut lines = VecDeque::with_capacity(capacity.max(1));
        lines.push_back(TranscriptLine::default());
        Self {
            lines,
            capacity: capacity.max(1),
        }
    }

    /// Apply one incremental result.
    ///
    /// 1. The tail line is overwritten with the result's fixed/unfixed
    ///    partition (full replacement).
    /// 2. A trailing stash, when present, overwrites the tail again — it
    ///    is a just-finalized revision arriving after the main word list.
    /// 3. A sentence end closes the line and opens a fresh empty tail,
    ///    evicting from the front beyond capacity.
    ///
    /// Replaying the identical final result of an already-closed sentence
    /// is a no-op, so a duplicated sentence-end event cannot close the
    /// same line twice.
    pub fn apply(&mut self, result: &IncrementalResult) {
        let line = partition(&result.words);

        if result.is_sentence_end && self.is_replay_of_closed(&line) {
            return;
        }

        *self.tail_mut() = line;

        if let Some(stash) = &result.stash {
            *self.tail_mut() = partition(stash);
        }

        if result.is_sentence_end {
            self.lines.push_back(TranscriptLine::default());
            while self.lines.len() > self.capacity {
                self.lines.pop_front();
            }
        }
    }

    /// Render the whole buffer for display.
    pub fn rendered(&self) -> RenderedTranscript {
        let settled = self
            .lines
            .iter()
            .take(self.lines.len().saturating_sub(1))
            .map(TranscriptLine::text)
            .collect();
        let active = self
            .lines
            .back()
            .map(TranscriptLine::text)
            .unwrap_or_default();
        RenderedTranscript { settled, active }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        // The open tail always exists; "empty" means nothing was ever written.
        self.lines.len() == 1 && self.lines[0].is_empty()
    }

    pub fn lines(&self) -> impl Iterator<Item = &TranscriptLine> {
        self.lines.iter()
    }

    fn tail_mut(&mut self) -> &mut TranscriptLine {
        if self.lines.is_empty() {
            self.lines.push_back(TranscriptLine::default());
        }
        self.lines.back_mut().expect("tail line exists")
    }

    fn is_replay_of_closed(&self, line: &TranscriptLine) -> bool {
        if self.lines.len() < 2 {
            return false;
        }
        let tail_empty = self.lines.back().map(|l| l.is_empty()).unwrap_or(false);
        tail_empty && self.lines[self.lines.len() - 2] == *line
    }
}

impl Default for TranscriptBuffer {
    fn default() -> Self {
        Self::new(defaults::TRANSCRIPT_CAPACITY)
    }
}

/// Reconciler for one language track. Owns its buffer exclusively; the
/// UI boundary only ever sees rendered snapshots.
#[derive(Debug, Default)]
pub struct TextReconciler {
    buffer: TranscriptBuffer,
}

impl TextReconciler {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: TranscriptBuffer::new(capacity),
        }
    }

    /// Apply a result and return the updated rendering.
    pub fn apply(&mut self, result: &IncrementalResult) -> RenderedTranscript {
        self.buffer.apply(result);
        self.buffer.rendered()
    }

    pub fn rendered(&self) -> RenderedTranscript {
        self.buffer.rendered()
    }

    pub fn buffer(&self) -> &TranscriptBuffer {
        &self.buffer
    }
}

fn partition(words: &[Word]) -> TranscriptLine {
    let mut line = TranscriptLine::default();
    for word in words {
        if word.is_fixed {
            line.fixed.push_str(&word.text);
        } else {
            line.unfixed.push_str(&word.text);
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, fixed: bool) -> Word {
        Word {
            text: text.to_string(),
            is_fixed: fixed,
        }
    }

    fn result(words: Vec<Word>, sentence_end: bool) -> IncrementalResult {
        IncrementalResult {
            words,
            is_sentence_end: sentence_end,
            stash: None,
        }
    }

    #[test]
    fn test_empty_buffer_has_open_tail() {
        let buffer = TranscriptBuffer::new(20);
        assert_eq!(buffer.len(), 1);
        assert!(buffer.is_empty());
        assert_eq!(buffer.rendered().text(), "");
    }

    #[test]
    fn test_full_replacement_of_tail() {
        let mut buffer = TranscriptBuffer::new(20);

        buffer.apply(&result(vec![word("he", true)], false));
        buffer.apply(&result(vec![word("hello", true), word(" wor", false)], false));

        // Second result replaces the first entirely
        assert_eq!(buffer.len(), 1);
        let rendered = buffer.rendered();
        assert_eq!(rendered.settled, "");
        assert_eq!(rendered.active, "hello wor");
    }

    #[test]
    fn test_sentence_end_closes_line_and_opens_tail() {
        let mut buffer = TranscriptBuffer::new(20);

        buffer.apply(&result(vec![word("他", true), word("好", true)], false));
        buffer.apply(&result(
            vec![word("他", true), word("好", true), word("。", true)],
            true,
        ));

        assert_eq!(buffer.len(), 2);
        let lines: Vec<_> = buffer.lines().cloned().collect();
        assert_eq!(lines[0].fixed, "他好。");
        assert_eq!(lines[0].unfixed, "");
        assert!(lines[1].is_empty());
        assert_eq!(buffer.rendered().text(), "他好。");
    }

    #[test]
    fn test_closed_fixed_part_matches_final_result() {
        let mut buffer = TranscriptBuffer::new(20);

        buffer.apply(&result(vec![word("a", true), word("b", false)], false));
        buffer.apply(&result(
            vec![word("a", true), word("b", true), word("c", true)],
            true,
        ));

        let closed: Vec<_> = buffer.lines().cloned().collect();
        assert_eq!(closed[0].fixed, "abc");
    }

    #[test]
    fn test_replaying_final_result_is_idempotent() {
        let mut buffer = TranscriptBuffer::new(20);

        let final_result = result(
            vec![word("他", true), word("好", true), word("。", true)],
            true,
        );
        buffer.apply(&final_result);
        assert_eq!(buffer.len(), 2);

        buffer.apply(&final_result);
        assert_eq!(buffer.len(), 2, "replay must not close another line");
        assert_eq!(buffer.rendered().text(), "他好。");
    }

    #[test]
    fn test_stash_overwrites_tail_after_words() {
        let mut buffer = TranscriptBuffer::new(20);

        let mut r = result(vec![word("draft", false)], false);
        r.stash = Some(vec![word("final", true), word(" tail", false)]);
        buffer.apply(&r);

        let rendered = buffer.rendered();
        assert_eq!(rendered.active, "final tail");
        let lines: Vec<_> = buffer.lines().cloned().collect();
        assert_eq!(lines[0].fixed, "final");
        assert_eq!(lines[0].unfixed, " tail");
    }

    #[test]
    fn test_capacity_evicts_from_front() {
        let mut buffer = TranscriptBuffer::new(3);

        for i in 0..5 {
            buffer.apply(&result(vec![word(&format!("s{}。", i), true)], true));
        }

        assert_eq!(buffer.len(), 3);
        let lines: Vec<_> = buffer.lines().cloned().collect();
        // The two most recent closed lines plus the open tail survive
        assert_eq!(lines[0].fixed, "s3。");
        assert_eq!(lines[1].fixed, "s4。");
        assert!(lines[2].is_empty());
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut buffer = TranscriptBuffer::new(20);

        for i in 0..100 {
            buffer.apply(&result(vec![word(&i.to_string(), true)], true));
            assert!(buffer.len() <= 20);
        }
        assert_eq!(buffer.len(), 20);
    }

    #[test]
    fn test_rendered_split_between_settled_and_active() {
        let mut buffer = TranscriptBuffer::new(20);

        buffer.apply(&result(vec![word("one.", true)], true));
        buffer.apply(&result(vec![word("two", true), word("…", false)], false));

        let rendered = buffer.rendered();
        assert_eq!(rendered.settled, "one.");
        assert_eq!(rendered.active, "two…");
        assert_eq!(rendered.text(), "one.two…");
    }

    #[test]
    fn test_reconciler_owns_buffer_and_returns_snapshot() {
        let mut reconciler = TextReconciler::new(20);

        let rendered = reconciler.apply(&result(vec![word("hi", true)], false));
        assert_eq!(rendered.active, "hi");
        assert_eq!(reconciler.rendered(), rendered);
    }

    #[test]
    fn test_mixed_sentence_sequence() {
        // The concrete scenario from the service contract:
        // R1 = 他/好 fixed, no end; R2 = 他/好/。 fixed, end.
        let mut reconciler = TextReconciler::new(20);

        reconciler.apply(&result(vec![word("他", true), word("好", true)], false));
        let rendered = reconciler.apply(&result(
            vec![word("他", true), word("好", true), word("。", true)],
            true,
        ));

        assert_eq!(reconciler.buffer().len(), 2);
        assert_eq!(rendered.text(), "他好。");
    }
}
