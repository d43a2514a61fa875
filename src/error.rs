//! Error types for livesub.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LivesubError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("API key is not configured")]
    MissingApiKey,

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    #[error("Audio playback failed: {message}")]
    AudioPlayback { message: String },

    // Recognition errors
    #[error("Recognition session failed: {message}")]
    Recognition { message: String },

    // Synthesis errors
    #[error("Synthesis request failed: {message}")]
    SynthesisRequest { message: String },

    #[error("Synthesis service returned {status}: {body}")]
    SynthesisStatus { status: u16, body: String },

    // Supervisor errors
    #[error("Unsupported language: {language}")]
    UnsupportedLanguage { language: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, LivesubError>;
