//! Pipeline supervisor.
//!
//! Owns the running/stopped state machine, spawns the recognition,
//! refresh and synthesis workers, and restarts the whole pipeline when a
//! worker dies. All control paths (start, stop, reconfigure, health
//! check) are serialized on one internal lock, so a health-check restart
//! can never interleave with a user-initiated stop.

use crate::audio::AudioDevice;
use crate::config::Config;
use crate::defaults;
use crate::error::{LivesubError, Result};
use crate::recognition::{
    RecognitionEvent, RecognitionSession, RecognizerConnector, SessionRequest,
};
use crate::synthesis::{SpeechSynthesisSession, SynthesisClientFactory};
use crate::transcript::TextReconciler;
use crate::ui::UiBridge;
use crossbeam_channel::{bounded, Receiver};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Pipeline lifecycle state. Owned exclusively by the supervisor; the
/// workers only ever observe their shared running flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineState::Stopped => "stopped",
            PipelineState::Starting => "starting",
            PipelineState::Running => "running",
            PipelineState::Stopping => "stopping",
        };
        write!(f, "{}", name)
    }
}

/// One spawned worker thread.
struct Worker {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl Worker {
    fn spawn<F>(name: &'static str, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            name,
            handle: thread::spawn(f),
        }
    }

    fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Wait for the worker with a bounded deadline, then detach.
    ///
    /// Finished workers are joined so a panic is reported rather than
    /// swallowed.
    fn join_with_timeout(self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while !self.handle.is_finished() {
            if Instant::now() >= deadline {
                log::warn!(
                    "worker '{}' did not stop within {:?}, detaching",
                    self.name,
                    timeout
                );
                return;
            }
            thread::sleep(Duration::from_millis(50));
        }

        if let Err(panic_info) = self.handle.join() {
            let message = panic_info
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| panic_info.downcast_ref::<String>().map(|s| s.as_str()))
                .unwrap_or("unknown panic");
            log::error!("worker '{}' panicked: {}", self.name, message);
        }
    }
}

/// Supervisor for the capture → recognition → display/synthesis pipeline.
pub struct ServiceSupervisor {
    config: Mutex<Config>,
    state: Mutex<PipelineState>,
    /// Serializes start/stop/reconfigure/health-check.
    control: Mutex<()>,
    device: Arc<AudioDevice>,
    connector: Arc<dyn RecognizerConnector>,
    synthesis_factory: Box<dyn SynthesisClientFactory>,
    ui: Arc<dyn UiBridge>,
    running: Mutex<Option<Arc<AtomicBool>>>,
    workers: Mutex<Vec<Worker>>,
    /// Per-language reconcilers; they persist across restarts so the
    /// transcript survives a reconnect.
    reconcilers: Arc<Mutex<HashMap<String, TextReconciler>>>,
    tts_enabled: Arc<AtomicBool>,
}

impl ServiceSupervisor {
    pub fn new(
        config: Config,
        device: Arc<AudioDevice>,
        connector: Arc<dyn RecognizerConnector>,
        synthesis_factory: Box<dyn SynthesisClientFactory>,
        ui: Arc<dyn UiBridge>,
    ) -> Self {
        let tts_enabled = Arc::new(AtomicBool::new(config.synthesis.enabled));
        Self {
            config: Mutex::new(config),
            state: Mutex::new(PipelineState::Stopped),
            control: Mutex::new(()),
            device,
            connector,
            synthesis_factory,
            ui,
            running: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
            reconcilers: Arc::new(Mutex::new(HashMap::new())),
            tts_enabled,
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.lock_poisoned(&self.state)
    }

    pub fn is_running(&self) -> bool {
        self.state() == PipelineState::Running
    }

    pub fn config(&self) -> Config {
        self.lock_poisoned(&self.config).clone()
    }

    pub fn device(&self) -> &Arc<AudioDevice> {
        &self.device
    }

    /// Start the pipeline. A no-op when already running; fails without
    /// retrying when no recognition credential is configured.
    pub fn start(&self) -> Result<()> {
        let _control = self.lock_poisoned(&self.control);
        self.start_locked()
    }

    /// Stop the pipeline: signal the workers, close the audio device
    /// under its lock, then join each worker with a bounded wait.
    pub fn stop(&self) {
        let _control = self.lock_poisoned(&self.control);
        self.stop_locked();
    }

    /// Periodic health check. When the pipeline should be running but a
    /// worker has died, the whole pipeline is restarted.
    pub fn check_and_restart(&self) {
        let _control = self.lock_poisoned(&self.control);

        if self.state() != PipelineState::Running {
            return;
        }

        let dead: Vec<&'static str> = {
            let workers = self.lock_poisoned(&self.workers);
            for w in workers.iter() { eprintln!("DIAG worker {} tid={:?} is_finished={}", w.name, w.handle.thread().id(), w.handle.is_finished()); }
            workers
                .iter()
                .filter(|worker| !worker.is_alive())
                .map(|worker| worker.name)
                .collect()
        };
        if dead.is_empty() {
            return;
        }

        log::warn!("dead worker(s) {:?}, restarting the pipeline", dead);
        self.ui
            .update_status("Service interrupted, reconnecting...");
        self.stop_locked();
        thread::sleep(defaults::RESTART_PAUSE);
        if let Err(e) = self.start_locked() {
            log::error!("restart after health check failed: {}", e);
            self.ui
                .update_status(&format!("Failed to restart the service: {}", e));
        }
    }

    /// Change the language pair. While running this is a full
    /// stop → apply → start cycle so no worker ever reads a half-applied
    /// configuration.
    pub fn set_languages(&self, source: &str, target: &str) -> Result<()> {
        let _control = self.lock_poisoned(&self.control);

        for language in [source, target] {
            if !defaults::is_supported_language(language) {
                return Err(LivesubError::UnsupportedLanguage {
                    language: language.to_string(),
                });
            }
        }

        let was_running = self.state() == PipelineState::Running;
        if was_running {
            self.stop_locked();
            thread::sleep(defaults::RECONFIGURE_PAUSE);
        }

        {
            let mut config = self.lock_poisoned(&self.config);
            config.language.source = source.to_string();
            config.language.target = target.to_string();
        }

        if was_running {
            self.start_locked()?;
        }
        Ok(())
    }

    /// Replace the service credentials, restarting when running.
    pub fn set_credentials(&self, api_key: &str, tts_api_key: &str) -> Result<()> {
        let _control = self.lock_poisoned(&self.control);

        let was_running = self.state() == PipelineState::Running;
        if was_running {
            self.stop_locked();
            thread::sleep(defaults::RECONFIGURE_PAUSE);
        }

        {
            let mut config = self.lock_poisoned(&self.config);
            config.recognition.api_key = api_key.to_string();
            config.synthesis.api_key = tts_api_key.to_string();
        }

        if was_running {
            self.start_locked()?;
        }
        Ok(())
    }

    /// Toggle spoken subtitles. The synthesis loop observes the flag on
    /// its next iteration; no restart is needed and queued words survive
    /// the off period.
    pub fn set_tts_enabled(&self, enabled: bool) {
        let _control = self.lock_poisoned(&self.control);
        self.lock_poisoned(&self.config).synthesis.enabled = enabled;
        self.tts_enabled.store(enabled, Ordering::SeqCst);
        log::info!("spoken subtitles {}", if enabled { "enabled" } else { "disabled" });
    }

    /// Spawn the periodic health-check thread.
    pub fn spawn_monitor(self: &Arc<Self>, interval: Duration) -> MonitorHandle {
        let supervisor = Arc::clone(self);
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = thread::spawn(move || {
            let mut last_check = Instant::now();
            while flag.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(50));
                if last_check.elapsed() >= interval {
                    supervisor.check_and_restart();
                    last_check = Instant::now();
                }
            }
        });

        MonitorHandle {
            running,
            handle: Some(handle),
        }
    }

    fn start_locked(&self) -> Result<()> {
        match self.state() {
            PipelineState::Running | PipelineState::Starting => return Ok(()),
            _ => {}
        }

        let config = self.config();
        if config.recognition.api_key.is_empty() {
            self.ui.update_status("Error: API key is not configured");
            return Err(LivesubError::MissingApiKey);
        }

        self.set_state(PipelineState::Starting);
        self.tts_enabled
            .store(config.synthesis.enabled, Ordering::SeqCst);

        let running = Arc::new(AtomicBool::new(true));
        let (event_tx, event_rx) = bounded(defaults::EVENT_QUEUE_CAPACITY);
        let (fixed_tx, fixed_rx) = bounded(defaults::FIXED_WORD_QUEUE_CAPACITY);

        let request = SessionRequest {
            api_key: config.recognition.api_key.clone(),
            model: config.recognition.model.clone(),
            endpoint: config.recognition.endpoint.clone(),
            source_language: defaults::service_code(&config.language.source),
            target_languages: vec![defaults::service_code(&config.language.target)],
            semantic_punctuation: config.recognition.semantic_punctuation,
        };

        let mut workers = Vec::new();

        let recognition = RecognitionSession::new(
            Arc::clone(&self.device),
            Arc::clone(&self.connector),
            request,
            event_tx,
            fixed_tx,
            Arc::clone(&self.ui),
            Arc::clone(&running),
        )
        .with_device_name(config.audio.device.clone())
        .with_capture_tap(config.audio.save_capture.clone());
        workers.push(Worker::spawn("recognition", move || recognition.run()));

        let refresh = RefreshWorker {
            events: event_rx,
            reconcilers: Arc::clone(&self.reconcilers),
            ui: Arc::clone(&self.ui),
            running: Arc::clone(&running),
            source_tag: config.language.source.clone(),
            target_tag: config.language.target.clone(),
            target_code: defaults::service_code(&config.language.target),
        };
        workers.push(Worker::spawn("refresh", move || refresh.run()));

        if config.synthesis.api_key.is_empty() {
            if config.synthesis.enabled {
                log::warn!("TTS API key is not set, speech output is unavailable");
                self.ui
                    .update_status("Warning: TTS API key is not set, speech output is unavailable");
            }
        } else {
            let client = self
                .synthesis_factory
                .create(&config.synthesis, &config.language.target);
            let synthesis = SpeechSynthesisSession::new(
                Arc::clone(&self.device),
                client,
                fixed_rx,
                Arc::clone(&running),
                Arc::clone(&self.tts_enabled),
            );
            workers.push(Worker::spawn("synthesis", move || synthesis.run()));
        }

        *self.lock_poisoned(&self.workers) = workers;
        *self.lock_poisoned(&self.running) = Some(running);
        self.set_state(PipelineState::Running);
        self.ui.update_status("Translation service started");
        log::info!("pipeline started");
        Ok(())
    }

    fn stop_locked(&self) {
        if self.state() == PipelineState::Stopped {
            return;
        }
        self.set_state(PipelineState::Stopping);

        if let Some(running) = self.lock_poisoned(&self.running).take() {
            running.store(false, Ordering::SeqCst);
        }

        self.device.close_capture();

        let workers = std::mem::take(&mut *self.lock_poisoned(&self.workers));
        for worker in workers {
            worker.join_with_timeout(defaults::WORKER_JOIN_TIMEOUT);
        }

        self.set_state(PipelineState::Stopped);
        self.ui.update_status("Translation service stopped");
        log::info!("pipeline stopped");
    }

    fn set_state(&self, state: PipelineState) {
        *self.lock_poisoned(&self.state) = state;
    }

    /// Lock, treating poisoning as unrecoverable corruption of the
    /// supervisor rather than silently continuing.
    fn lock_poisoned<'a, T>(&self, mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Handle for the health-check thread.
pub struct MonitorHandle {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    pub fn stop(mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// UI refresh worker: drains the recognition event queue on a fixed
/// tick, applies events to the per-language reconcilers and pushes
/// rendered snapshots across the UI boundary. The drain is bounded per
/// tick so a result burst cannot starve the display.
struct RefreshWorker {
    events: Receiver<RecognitionEvent>,
    reconcilers: Arc<Mutex<HashMap<String, TextReconciler>>>,
    ui: Arc<dyn UiBridge>,
    running: Arc<AtomicBool>,
    source_tag: String,
    target_tag: String,
    target_code: String,
}

impl RefreshWorker {
    fn run(self) {
        while self.running.load(Ordering::SeqCst) {
            for _ in 0..defaults::UI_DRAIN_MAX_ITEMS {
                match self.events.try_recv() {
                    Ok(event) => self.apply(event),
                    Err(_) => break,
                }
            }
            thread::sleep(defaults::UI_REFRESH_INTERVAL);
        }
        log::debug!("refresh worker exiting");
    }

    fn apply(&self, event: RecognitionEvent) {
        let mut reconcilers = match self.reconcilers.lock() {
            Ok(reconcilers) => reconcilers,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(transcription) = &event.transcription {
            let reconciler = reconcilers
                .entry(self.source_tag.clone())
                .or_insert_with(|| TextReconciler::new(defaults::TRANSCRIPT_CAPACITY));
            let rendered = reconciler.apply(transcription);
            self.ui.update_transcript(&self.source_tag, &rendered);
        }

        if let Some(translation) = event.translations.get(&self.target_code) {
            let reconciler = reconcilers
                .entry(self.target_tag.clone())
                .or_insert_with(|| TextReconciler::new(defaults::TRANSCRIPT_CAPACITY));
            let rendered = reconciler.apply(translation);
            self.ui.update_transcript(&self.target_tag, &rendered);
        }
    }
}
