use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub language: LanguageConfig,
    pub audio: AudioConfig,
    pub recognition: RecognitionConfig,
    pub synthesis: SynthesisConfig,
}

/// Source and target language selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LanguageConfig {
    pub source: String,
    pub target: String,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    /// Optional path for a debug WAV copy of everything sent upstream.
    pub save_capture: Option<PathBuf>,
}

/// Recognition service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecognitionConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub semantic_punctuation: bool,
}

/// Speech synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SynthesisConfig {
    pub enabled: bool,
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    /// Voice identifier; empty selects a per-language default.
    pub voice: String,
    pub speed: f32,
    pub gain: f32,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            source: "zh-CN".to_string(),
            target: "en-US".to_string(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            save_capture: None,
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gummy-realtime-v1".to_string(),
            endpoint: "wss://dashscope.aliyuncs.com/api-ws/v1/inference".to_string(),
            semantic_punctuation: true,
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            endpoint: "https://api.siliconflow.cn/v1/audio/speech".to_string(),
            model: "FunAudioLLM/CosyVoice2-0.5B".to_string(),
            voice: String::new(),
            speed: 1.4,
            gain: 0.0,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Ok(Self::default())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - LIVESUB_SOURCE_LANG → language.source
    /// - LIVESUB_TARGET_LANG → language.target
    /// - LIVESUB_AUDIO_DEVICE → audio.device
    /// - LIVESUB_API_KEY or DASHSCOPE_API_KEY → recognition.api_key
    /// - LIVESUB_TTS_API_KEY → synthesis.api_key
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(lang) = std::env::var("LIVESUB_SOURCE_LANG") {
            if !lang.is_empty() {
                self.language.source = lang;
            }
        }

        if let Ok(lang) = std::env::var("LIVESUB_TARGET_LANG") {
            if !lang.is_empty() {
                self.language.target = lang;
            }
        }

        if let Ok(device) = std::env::var("LIVESUB_AUDIO_DEVICE") {
            if !device.is_empty() {
                self.audio.device = Some(device);
            }
        }

        if let Ok(key) = std::env::var("LIVESUB_API_KEY") {
            if !key.is_empty() {
                self.recognition.api_key = key;
            }
        } else if let Ok(key) = std::env::var("DASHSCOPE_API_KEY") {
            if !key.is_empty() {
                self.recognition.api_key = key;
            }
        }

        if let Ok(key) = std::env::var("LIVESUB_TTS_API_KEY") {
            if !key.is_empty() {
                self.synthesis.api_key = key;
            }
        }

        self
    }

    /// Validate values a TOML parse cannot reject on its own.
    pub fn validate(&self) -> crate::error::Result<()> {
        for (key, language) in [
            ("language.source", &self.language.source),
            ("language.target", &self.language.target),
        ] {
            if !defaults::is_supported_language(language) {
                return Err(crate::error::LivesubError::ConfigInvalidValue {
                    key: key.to_string(),
                    message: format!("unsupported language '{}'", language),
                });
            }
        }

        if self.synthesis.speed <= 0.0 {
            return Err(crate::error::LivesubError::ConfigInvalidValue {
                key: "synthesis.speed".to_string(),
                message: "must be positive".to_string(),
            });
        }

        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/livesub/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("livesub")
            .join("config.toml")
    }
}
