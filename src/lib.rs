//! livesub - realtime speech translation subtitles.
//!
//! Captures the microphone, streams it to a realtime
//! recognition-and-translation service, reconciles the incremental word
//! stream into rolling per-language transcripts, and optionally speaks
//! completed translated sentences through a streaming TTS service.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod config;
pub mod defaults;
pub mod error;
pub mod recognition;
pub mod supervisor;
pub mod synthesis;
pub mod transcript;
pub mod ui;

// Audio ownership
pub use audio::{AudioBackend, AudioDevice, CaptureStream, CpalBackend, PlaybackStream};

// Service contracts (source → reconcile → sink)
pub use recognition::{
    DashScopeConnector, FailureReason, IncrementalResult, RecognitionEvent, RecognitionSession,
    RecognizerConnector, RecognizerStream, SessionObserver, SessionRequest, Word,
};
pub use synthesis::{
    HttpSynthesisClient, HttpSynthesisFactory, SpeechSynthesisSession, SynthesisClient,
    SynthesisClientFactory,
};

// Reconciliation
pub use transcript::{
    FixedWord, FixedWordCursor, RenderedTranscript, TextReconciler, TranscriptBuffer,
    TranscriptLine,
};

// Supervisor
pub use supervisor::{MonitorHandle, PipelineState, ServiceSupervisor};

// UI boundary
pub use ui::{NullUi, TerminalUi, UiBridge};

// Error handling
pub use error::{LivesubError, Result};

// Config
pub use config::Config;
