//! Recognition worker: one thread owning the session lifecycle.
//!
//! The worker repeatedly opens a session against the remote service,
//! claims the microphone, feeds 100ms frames upstream and fans incoming
//! results out to the display queue and the synthesis queue. Any failure
//! tears the whole session down and restarts it after a classified
//! backoff; the sentence that was in progress is discarded on reconnect.

use crate::audio::{AudioDevice, FrameRead};
use crate::defaults;
use crate::error::Result;
use crate::recognition::client::{RecognizerConnector, RecognizerStream, SessionObserver};
use crate::recognition::types::{FailureReason, RecognitionEvent, SessionRequest};
use crate::transcript::{FixedWord, FixedWordCursor};
use crate::ui::UiBridge;
use crossbeam_channel::Sender;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Decision produced by the retry policy for one failure.
#[derive(Debug, PartialEq, Eq)]
pub struct RetryDecision {
    pub delay: Duration,
    /// Status text for the UI; `None` keeps the failure quiet.
    pub status: Option<String>,
}

/// Maps failure classes onto the backoff schedule.
///
/// Network and device problems retry quickly and always surface; an
/// authentication failure backs off long since the key will not fix
/// itself. Unclassified failures stay quiet for the first two
/// consecutive occurrences, then surface with the long delay.
#[derive(Debug, Default)]
pub struct RetryPolicy {
    consecutive_unknown: u32,
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset after a session that ended cleanly.
    pub fn reset(&mut self) {
        self.consecutive_unknown = 0;
    }

    pub fn next(&mut self, reason: &FailureReason) -> RetryDecision {
        match reason {
            FailureReason::Network(message) => {
                self.consecutive_unknown = 0;
                RetryDecision {
                    delay: defaults::NETWORK_RETRY_DELAY,
                    status: Some(format!("Network connection problem: {}", message)),
                }
            }
            FailureReason::Device(message) => {
                self.consecutive_unknown = 0;
                RetryDecision {
                    delay: defaults::DEVICE_RETRY_DELAY,
                    status: Some(format!("Audio device problem: {}", message)),
                }
            }
            FailureReason::Auth(_) => {
                self.consecutive_unknown = 0;
                RetryDecision {
                    delay: defaults::AUTH_RETRY_DELAY,
                    status: Some("API key rejected, please update it in the settings".to_string()),
                }
            }
            FailureReason::Unknown(message) => {
                self.consecutive_unknown += 1;
                if self.consecutive_unknown >= defaults::UNKNOWN_RETRY_LIMIT {
                    RetryDecision {
                        delay: defaults::UNKNOWN_SURFACED_DELAY,
                        status: Some(format!("Translation service error: {}", message)),
                    }
                } else {
                    RetryDecision {
                        delay: defaults::UNKNOWN_RETRY_DELAY,
                        status: None,
                    }
                }
            }
        }
    }
}

/// Recognition worker state. `run` consumes the session on its thread.
pub struct RecognitionSession {
    device: Arc<AudioDevice>,
    connector: Arc<dyn RecognizerConnector>,
    request: SessionRequest,
    events: Sender<RecognitionEvent>,
    fixed_words: Sender<FixedWord>,
    ui: Arc<dyn UiBridge>,
    running: Arc<AtomicBool>,
    device_name: Option<String>,
    save_capture: Option<PathBuf>,
}

impl RecognitionSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: Arc<AudioDevice>,
        connector: Arc<dyn RecognizerConnector>,
        request: SessionRequest,
        events: Sender<RecognitionEvent>,
        fixed_words: Sender<FixedWord>,
        ui: Arc<dyn UiBridge>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            device,
            connector,
            request,
            events,
            fixed_words,
            ui,
            running,
            device_name: None,
            save_capture: None,
        }
    }

    /// Capture from a specific input device instead of the default.
    pub fn with_device_name(mut self, name: Option<String>) -> Self {
        self.device_name = name;
        self
    }

    /// Also write every outgoing frame to a WAV file.
    pub fn with_capture_tap(mut self, path: Option<PathBuf>) -> Self {
        self.save_capture = path;
        self
    }

    /// Worker entry point: session attempts until the running flag clears.
    pub fn run(self) {
        let mut retry = RetryPolicy::new();

        while self.running.load(Ordering::SeqCst) {
            match self.run_once() {
                Ok(()) => retry.reset(),
                Err(reason) => {
                    log::error!("recognition session failed: {}", reason);
                    let decision = retry.next(&reason);
                    if let Some(status) = decision.status {
                        self.ui.update_status(&status);
                    }
                    self.sleep_while_running(decision.delay);
                }
            }
        }
        log::debug!("recognition worker exiting");
    }

    /// One full session: open → feed → close.
    fn run_once(&self) -> std::result::Result<(), FailureReason> {
        let mut stream = self.connector.open(&self.request)?;

        // A stop may have landed while the connection was being opened;
        // claiming the device now would leave it open after the stop.
        if !self.running.load(Ordering::SeqCst) {
            stream.close();
            return Ok(());
        }

        let target_code = self
            .request
            .target_languages
            .first()
            .cloned()
            .unwrap_or_default();
        let mut adapter = SessionAdapter::new(
            Arc::clone(&self.device),
            self.device_name.clone(),
            self.events.clone(),
            self.fixed_words.clone(),
            target_code,
            self.save_capture.clone(),
        );

        adapter.on_open();
        let outcome = self.feed_loop(stream.as_mut(), &mut adapter);
        stream.close();
        adapter.on_close();
        outcome
    }

    fn feed_loop(
        &self,
        stream: &mut dyn RecognizerStream,
        adapter: &mut SessionAdapter,
    ) -> std::result::Result<(), FailureReason> {
        if let Some(failure) = adapter.take_open_failure() {
            return Err(failure);
        }

        while self.running.load(Ordering::SeqCst) {
            match self.device.read_frame() {
                Ok(FrameRead::Frame(frame)) => {
                    stream.send_frame(&frame)?;
                    adapter.record_frame(&frame);
                }
                Ok(FrameRead::Empty) => {
                    // Deadline passed without a full frame; keep polling.
                }
                Ok(FrameRead::Closed) => {
                    // Startup race: the device is not claimed yet.
                    std::thread::sleep(defaults::DEVICE_NOT_READY_RETRY);
                }
                Err(e) => return Err(FailureReason::Device(e.to_string())),
            }

            while let Some(event) = stream.poll_event()? {
                adapter.on_event(event);
            }
        }

        Ok(())
    }

    fn sleep_while_running(&self, delay: Duration) {
        let deadline = Instant::now() + delay;
        while self.running.load(Ordering::SeqCst) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

/// Per-session adapter implementing the observer capability set.
///
/// Owns the per-session cursor, so reconnects start over with fresh
/// word pointers.
struct SessionAdapter {
    device: Arc<AudioDevice>,
    device_name: Option<String>,
    events: Sender<RecognitionEvent>,
    fixed_words: Sender<FixedWord>,
    target_code: String,
    cursor: FixedWordCursor,
    open_failure: Option<FailureReason>,
    capture_tap: Option<hound::WavWriter<BufWriter<File>>>,
    tap_path: Option<PathBuf>,
}

impl SessionAdapter {
    fn new(
        device: Arc<AudioDevice>,
        device_name: Option<String>,
        events: Sender<RecognitionEvent>,
        fixed_words: Sender<FixedWord>,
        target_code: String,
        tap_path: Option<PathBuf>,
    ) -> Self {
        Self {
            device,
            device_name,
            events,
            fixed_words,
            target_code,
            cursor: FixedWordCursor::new(),
            open_failure: None,
            capture_tap: None,
            tap_path,
        }
    }

    fn take_open_failure(&mut self) -> Option<FailureReason> {
        self.open_failure.take()
    }

    /// Append a frame to the debug WAV tap, opening it lazily.
    fn record_frame(&mut self, frame: &[u8]) {
        if self.capture_tap.is_none() {
            let Some(path) = &self.tap_path else {
                return;
            };
            match open_capture_tap(path) {
                Ok(writer) => self.capture_tap = Some(writer),
                Err(e) => {
                    log::warn!("capture tap disabled: {}", e);
                    self.tap_path = None;
                    return;
                }
            }
        }

        if let Some(writer) = self.capture_tap.as_mut() {
            for pair in frame.chunks_exact(2) {
                let sample = i16::from_le_bytes([pair[0], pair[1]]);
                if let Err(e) = writer.write_sample(sample) {
                    log::warn!("capture tap write failed: {}", e);
                    self.capture_tap = None;
                    self.tap_path = None;
                    break;
                }
            }
        }
    }
}

impl SessionObserver for SessionAdapter {
    fn on_open(&mut self) {
        if let Err(e) = self.device.open_capture(self.device_name.as_deref()) {
            self.open_failure = Some(FailureReason::Device(e.to_string()));
        }
    }

    fn on_close(&mut self) {
        self.device.close_capture();
        if let Some(writer) = self.capture_tap.take() {
            if let Err(e) = writer.finalize() {
                log::warn!("capture tap finalize failed: {}", e);
            }
        }
    }

    fn on_event(&mut self, event: RecognitionEvent) {
        if let Some(translation) = event.translations.get(&self.target_code) {
            for fixed_word in self.cursor.advance(translation) {
                if let Err(e) = self.fixed_words.try_send(fixed_word) {
                    if e.is_full() {
                        log::warn!("fixed-word queue full, dropping delta");
                    }
                }
            }
        }

        if let Err(e) = self.events.try_send(event) {
            if e.is_full() {
                log::warn!("event queue full, dropping result");
            }
        }
    }
}

fn open_capture_tap(path: &PathBuf) -> Result<hound::WavWriter<BufWriter<File>>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: defaults::CAPTURE_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    hound::WavWriter::create(path, spec)
        .map_err(|e| crate::error::LivesubError::Other(format!("cannot create {:?}: {}", path, e)))
}
