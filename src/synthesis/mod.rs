//! Streaming text-to-speech: client contract and worker.

pub mod client;
pub mod session;

pub use client::{
    default_voice, ByteStream, HttpSynthesisClient, HttpSynthesisFactory, SynthesisClient,
    SynthesisClientFactory,
};
pub use session::{SpeechSynthesisSession, SynthesisBuffer};
