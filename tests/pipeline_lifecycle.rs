//! End-to-end pipeline tests with scripted service and audio backends.

use async_trait::async_trait;
use livesub::audio::{AudioBackend, AudioDevice, CaptureStream, PlaybackStream};
use livesub::config::Config;
use livesub::defaults;
use livesub::recognition::{
    FailureReason, IncrementalResult, RecognitionEvent, RecognizerConnector, RecognizerStream,
    SessionRequest, Word,
};
use livesub::supervisor::{PipelineState, ServiceSupervisor};
use livesub::synthesis::{ByteStream, SynthesisClient, SynthesisClientFactory};
use livesub::transcript::RenderedTranscript;
use livesub::ui::UiBridge;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

// Audio backend: a steady tone in, recorded playback out.

struct ToneCapture;

impl CaptureStream for ToneCapture {
    fn read(&mut self) -> livesub::Result<Vec<i16>> {
        Ok(vec![3i16; defaults::FRAME_SAMPLES])
    }
}

struct RecordingPlayback {
    writes: Arc<Mutex<Vec<usize>>>,
}

impl PlaybackStream for RecordingPlayback {
    fn write(&mut self, pcm: &[u8]) -> livesub::Result<()> {
        self.writes.lock().unwrap().push(pcm.len());
        Ok(())
    }
    fn finish(&mut self) -> livesub::Result<()> {
        Ok(())
    }
}

struct TestBackend {
    playback_writes: Arc<Mutex<Vec<usize>>>,
}

impl AudioBackend for TestBackend {
    fn open_capture(&self, _device: Option<&str>) -> livesub::Result<Box<dyn CaptureStream>> {
        Ok(Box::new(ToneCapture))
    }

    fn open_playback(&self, _sample_rate: u32) -> livesub::Result<Box<dyn PlaybackStream>> {
        Ok(Box::new(RecordingPlayback {
            writes: Arc::clone(&self.playback_writes),
        }))
    }
}

// Recognition service: scripted incremental results.

struct ScriptedStream {
    events: Vec<RecognitionEvent>,
}

impl RecognizerStream for ScriptedStream {
    fn send_frame(&mut self, _frame: &[u8]) -> Result<(), FailureReason> {
        Ok(())
    }

    fn poll_event(&mut self) -> Result<Option<RecognitionEvent>, FailureReason> {
        Ok(if self.events.is_empty() {
            None
        } else {
            Some(self.events.remove(0))
        })
    }

    fn close(&mut self) {}
}

struct ScriptedConnector {
    opens: AtomicU32,
    panic_on_first_open: bool,
    events: Mutex<Vec<RecognitionEvent>>,
}

impl ScriptedConnector {
    fn new(events: Vec<RecognitionEvent>) -> Self {
        Self {
            opens: AtomicU32::new(0),
            panic_on_first_open: false,
            events: Mutex::new(events),
        }
    }

    fn panicking_once() -> Self {
        Self {
            opens: AtomicU32::new(0),
            panic_on_first_open: true,
            events: Mutex::new(Vec::new()),
        }
    }
}

impl RecognizerConnector for ScriptedConnector {
    fn open(&self, _request: &SessionRequest) -> Result<Box<dyn RecognizerStream>, FailureReason> {
        let attempt = self.opens.fetch_add(1, Ordering::SeqCst);
        eprintln!("DIAG open attempt={} thread={:?}", attempt, std::thread::current().id());
        if self.panic_on_first_open && attempt == 0 {
            panic!("simulated recognition worker crash");
        }
        Ok(Box::new(ScriptedStream {
            events: std::mem::take(&mut *self.events.lock().unwrap()),
        }))
    }
}

// Synthesis service: records request text, returns scripted PCM.

struct RecordingSynthesis {
    requests: Arc<Mutex<Vec<String>>>,
    chunks: Vec<Vec<u8>>,
}

#[async_trait]
impl SynthesisClient for RecordingSynthesis {
    async fn synthesize(&self, text: &str) -> livesub::Result<ByteStream> {
        self.requests.lock().unwrap().push(text.to_string());
        let chunks: Vec<livesub::Result<Vec<u8>>> = self.chunks.iter().cloned().map(Ok).collect();
        Ok(Box::pin(futures_util::stream::iter(chunks)))
    }
}

struct RecordingSynthesisFactory {
    requests: Arc<Mutex<Vec<String>>>,
    chunks: Vec<Vec<u8>>,
}

impl SynthesisClientFactory for RecordingSynthesisFactory {
    fn create(
        &self,
        _config: &livesub::config::SynthesisConfig,
        _target_language: &str,
    ) -> Arc<dyn SynthesisClient> {
        Arc::new(RecordingSynthesis {
            requests: Arc::clone(&self.requests),
            chunks: self.chunks.clone(),
        })
    }
}

#[derive(Default)]
struct RecordingUi {
    transcripts: Mutex<Vec<(String, String)>>,
    statuses: Mutex<Vec<String>>,
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

fn translation_event(words: Vec<Word>, sentence_end: bool) -> RecognitionEvent {
    let mut event = RecognitionEvent::default();
    event.translations.insert(
        "en".to_string(),
        IncrementalResult {
            words,
            is_sentence_end: sentence_end,
            stash: None,
        },
    );
    event
}

struct Fixture {
    supervisor: Arc<ServiceSupervisor>,
    ui: Arc<RecordingUi>,
    synthesis_requests: Arc<Mutex<Vec<String>>>,
    playback_writes: Arc<Mutex<Vec<usize>>>,
}

fn fixture(connector: Arc<ScriptedConnector>, tts_enabled: bool) -> Fixture {
    let mut config = Config::default();
    config.recognition.api_key = "sk-test".to_string();
    config.synthesis.api_key = "sf-test".to_string();
    config.synthesis.enabled = tts_enabled;

    let synthesis_requests = Arc::new(Mutex::new(Vec::new()));
    let playback_writes = Arc::new(Mutex::new(Vec::new()));
    let ui = Arc::new(RecordingUi::default());

    let supervisor = Arc::new(ServiceSupervisor::new(
        config,
        Arc::new(AudioDevice::new(Box::new(TestBackend {
            playback_writes: Arc::clone(&playback_writes),
        }))),
        connector,
        Box::new(RecordingSynthesisFactory {
            requests: Arc::clone(&synthesis_requests),
            chunks: vec![vec![0u8; 1000]; 10],
        }),
        Arc::clone(&ui) as Arc<dyn UiBridge>,
    ));

    Fixture {
        supervisor,
        ui,
        synthesis_requests,
        playback_writes,
    }
}

#[test]
fn pipeline_reconciles_and_speaks_only_fixed_text() {
    let events = vec![
        translation_event(
            vec![Word::fixed("The weather is nice"), Word::unfixed(" maybe")],
            false,
        ),
        translation_event(
            vec![Word::fixed("The weather is nice"), Word::fixed(".")],
            true,
        ),
    ];
    let fx = fixture(Arc::new(ScriptedConnector::new(events)), true);

    fx.supervisor.start().unwrap();
    thread::sleep(Duration::from_millis(600));
    fx.supervisor.stop();

    // The display saw the provisional text while it was current...
    let transcripts = fx.ui.transcripts.lock().unwrap();
    assert!(transcripts
        .iter()
        .any(|(lang, text)| lang == "en-US" && text == "The weather is nice maybe"));
    // ...and the closed sentence replaced it entirely.
    assert!(transcripts
        .iter()
        .any(|(lang, text)| lang == "en-US" && text == "The weather is nice."));

    // Synthesis received exactly one request, containing no unfixed text.
    let requests = fx.synthesis_requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].starts_with("The weather is nice."));
    assert!(!requests[0].contains("maybe"));

    // 10_000 streamed bytes played as two full chunks plus the remainder.
    let writes = fx.playback_writes.lock().unwrap();
    assert_eq!(writes.as_slice(), &[4096, 4096, 1808]);
}

#[test]
fn stop_then_start_cycle_leaves_no_dangling_state() {
    let fx = fixture(Arc::new(ScriptedConnector::new(Vec::new())), false);

    fx.supervisor.start().unwrap();
    thread::sleep(Duration::from_millis(200));
    assert_eq!(fx.supervisor.device().open_captures(), 1);

    fx.supervisor.stop();
    assert_eq!(fx.supervisor.state(), PipelineState::Stopped);
    assert_eq!(fx.supervisor.device().open_captures(), 0);
    assert_eq!(fx.supervisor.device().open_playbacks(), 0);

    // A second cycle works from the clean state.
    fx.supervisor.start().unwrap();
    thread::sleep(Duration::from_millis(200));
    assert_eq!(fx.supervisor.device().open_captures(), 1);
    fx.supervisor.stop();
    assert_eq!(fx.supervisor.device().open_captures(), 0);
}

#[test]
fn health_check_recovers_from_killed_worker_without_leaking_the_device() {
    let connector = Arc::new(ScriptedConnector::panicking_once());
    let fx = fixture(Arc::clone(&connector), false);

    fx.supervisor.start().unwrap();

    // The first session attempt dies with the simulated crash.
    thread::sleep(Duration::from_millis(200));

    for i in 0..30 {
        fx.supervisor.check_and_restart();
        eprintln!("DIAG i={} opens={} state={:?}", i, connector.opens.load(Ordering::SeqCst), fx.supervisor.state());
        if connector.opens.load(Ordering::SeqCst) >= 2 { break; }
        thread::sleep(Duration::from_millis(100));
    }
    assert_eq!(fx.supervisor.state(), PipelineState::Running);
    assert!(connector.opens.load(Ordering::SeqCst) >= 2);
    assert!(fx
        .ui
        .statuses
        .lock()
        .unwrap()
        .iter()
        .any(|s| s.contains("reconnecting")));

    // Exactly one capture handle after recovery.
    thread::sleep(Duration::from_millis(200));
    assert_eq!(fx.supervisor.device().open_captures(), 1);

    fx.supervisor.stop();
    assert_eq!(fx.supervisor.device().open_captures(), 0);
}
