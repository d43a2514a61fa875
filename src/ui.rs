//! UI boundary.
//!
//! The display toolkit lives outside this crate; it receives reconciled
//! transcripts and status text through [`UiBridge`] and drives the
//! supervisor with start/stop/reconfigure commands. Implementations must
//! be cheap and non-blocking — they are called from worker threads.

use crate::transcript::RenderedTranscript;

/// Sink for everything the pipeline wants shown to the user.
pub trait UiBridge: Send + Sync {
    /// Replace the displayed transcript for one language track.
    fn update_transcript(&self, language: &str, rendered: &RenderedTranscript);

    /// Show a one-line status message.
    fn update_status(&self, message: &str);
}

/// Terminal implementation used by the CLI binary.
///
/// Transcripts go to stdout, status lines to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalUi;

impl UiBridge for TerminalUi {
    fn update_transcript(&self, language: &str, rendered: &RenderedTranscript) {
        println!("[{}] {}", language, rendered.text());
    }

    fn update_status(&self, message: &str) {
        log::info!("status: {}", message);
    }
}

/// Bridge that discards everything. Useful in tests and as a placeholder
/// while no display is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullUi;

impl UiBridge for NullUi {
    fn update_transcript(&self, _language: &str, _rendered: &RenderedTranscript) {}

    fn update_status(&self, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Recording bridge used across the crate's tests.
    #[derive(Default)]
    pub struct RecordingUi {
        pub transcripts: Mutex<Vec<(String, String)>>,
        pub statuses: Mutex<Vec<String>>,
    }

    impl UiBridge for RecordingUi {
        fn update_transcript(&self, language: &str, rendered: &RenderedTranscript) {
            self.transcripts
                .lock()
                .unwrap()
                .push((language.to_string(), rendered.text()));
        }

        fn update_status(&self, message: &str) {
            self.statuses.lock().unwrap().push(message.to_string());
        }
    }

    #[test]
    fn test_null_ui_ignores_everything() {
        let ui = NullUi;
        ui.update_transcript("en", &RenderedTranscript::default());
        ui.update_status("nothing happens");
    }

    #[test]
    fn test_recording_ui_collects_updates() {
        let ui = Arc::new(RecordingUi::default());
        let rendered = RenderedTranscript {
            settled: "one.".to_string(),
            active: "two".to_string(),
        };

        ui.update_transcript("en", &rendered);
        ui.update_status("started");

        assert_eq!(
            ui.transcripts.lock().unwrap().as_slice(),
            &[("en".to_string(), "one.two".to_string())]
        );
        assert_eq!(ui.statuses.lock().unwrap().as_slice(), &[
            "started".to_string()
        ]);
    }
}
