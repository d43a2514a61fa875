//! Incremental-result reconciliation.
//!
//! [`reconciler`] turns the service's fixed/unfixed word stream into a
//! bounded rolling transcript; [`cursor`] extracts the newly-fixed word
//! deltas that feed speech synthesis.

pub mod cursor;
pub mod reconciler;

pub use cursor::{FixedWord, FixedWordCursor};
pub use reconciler::{RenderedTranscript, TextReconciler, TranscriptBuffer, TranscriptLine};
