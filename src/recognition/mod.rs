//! Realtime recognition: service contract, wire client and worker.

pub mod client;
pub mod dashscope;
pub mod session;
pub mod types;

pub use client::{RecognizerConnector, RecognizerStream, SessionObserver};
pub use dashscope::DashScopeConnector;
pub use session::{RecognitionSession, RetryDecision, RetryPolicy};
pub use types::{FailureReason, IncrementalResult, RecognitionEvent, SessionRequest, Word};
