//! Service-boundary traits for the recognition session.
//!
//! The remote recognizer is a black box behind [`RecognizerConnector`]:
//! open a stream, feed it audio frames, poll it for incremental results,
//! close it. The session reacts to stream lifecycle through the fixed
//! [`SessionObserver`] capability set.

use crate::recognition::types::{FailureReason, RecognitionEvent, SessionRequest};

/// One open recognition stream.
pub trait RecognizerStream: Send {
    /// Forward one PCM16 audio frame to the service.
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), FailureReason>;

    /// Poll for the next incremental result. Returns `Ok(None)` when no
    /// event is currently available; implementations should wait at most
    /// a few tens of milliseconds so the caller's loop stays responsive.
    fn poll_event(&mut self) -> Result<Option<RecognitionEvent>, FailureReason>;

    /// Close the stream, flushing the final task state where the
    /// protocol supports it.
    fn close(&mut self);
}

/// Connects recognition streams. One connector outlives many sessions;
/// every retry opens a fresh stream.
pub trait RecognizerConnector: Send + Sync {
    fn open(&self, request: &SessionRequest) -> Result<Box<dyn RecognizerStream>, FailureReason>;
}

/// Session lifecycle callbacks.
///
/// The session's adapter implements this to claim the audio device on
/// open, release it on close, and fan out events to the display and
/// synthesis queues.
pub trait SessionObserver {
    fn on_open(&mut self);
    fn on_close(&mut self);
    fn on_event(&mut self, event: RecognitionEvent);
}
