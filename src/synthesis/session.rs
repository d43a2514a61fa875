//! Speech synthesis worker.
//!
//! Consumes newly-fixed target-language words, batches them into
//! sentence-sized requests and plays the streamed PCM response through
//! the audio device. Spoken subtitles are best-effort: a failed request
//! drops that sentence and the loop moves on.

use crate::audio::AudioDevice;
use crate::defaults;
use crate::error::Result;
use crate::synthesis::client::SynthesisClient;
use crate::transcript::FixedWord;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Text accumulator with the two flush triggers: a sentence end, or a
/// clause-boundary punctuation mark arriving once the buffer already
/// holds more than the threshold of characters.
#[derive(Debug, Default)]
pub struct SynthesisBuffer {
    text: String,
}

impl SynthesisBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb one word; returns the request text when a flush fires.
    ///
    /// The flushed text carries the pause marker so consecutive sentences
    /// do not run into each other. A sentence end with nothing buffered
    /// flushes nothing — there is no audio to speak.
    pub fn push(&mut self, word: &FixedWord) -> Option<String> {
        let is_boundary = defaults::CLAUSE_BOUNDARIES.contains(&word.text.as_str());
        let over_threshold = self.text.chars().count() > defaults::SYNTHESIS_FLUSH_CHARS;

        if word.is_sentence_end || (is_boundary && over_threshold) {
            let mut out = std::mem::take(&mut self.text);
            out.push_str(&word.text);
            if out.is_empty() {
                return None;
            }
            out.push_str(defaults::SYNTHESIS_PAUSE_MARKER);
            Some(out)
        } else {
            self.text.push_str(&word.text);
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Synthesis worker state. `run` consumes the session on its thread.
pub struct SpeechSynthesisSession {
    device: Arc<AudioDevice>,
    client: Arc<dyn SynthesisClient>,
    queue: Receiver<FixedWord>,
    running: Arc<AtomicBool>,
    /// Runtime TTS toggle. While off the loop idles without consuming
    /// the queue, so queued words survive until re-enabled.
    enabled: Arc<AtomicBool>,
}

impl SpeechSynthesisSession {
    pub fn new(
        device: Arc<AudioDevice>,
        client: Arc<dyn SynthesisClient>,
        queue: Receiver<FixedWord>,
        running: Arc<AtomicBool>,
        enabled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            device,
            client,
            queue,
            running,
            enabled,
        }
    }

    /// Worker entry point.
    pub fn run(self) {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                log::error!("synthesis worker could not build a runtime: {}", e);
                return;
            }
        };

        let mut buffer = SynthesisBuffer::new();

        while self.running.load(Ordering::SeqCst) {
            if !self.enabled.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(100));
                continue;
            }

            match self.queue.recv_timeout(Duration::from_millis(100)) {
                Ok(word) => {
                    if let Some(text) = buffer.push(&word) {
                        log::debug!("synthesizing: {}", text);
                        if let Err(e) = self.speak(&runtime, &text) {
                            log::error!("synthesis failed, dropping sentence: {}", e);
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        log::debug!("synthesis worker exiting");
    }

    /// Send one request and play the streamed response.
    ///
    /// Bytes are written to the playback device in fixed-size chunks as
    /// soon as each chunk fills, with the remainder flushed at stream
    /// end, so playback starts before the download completes.
    fn speak(&self, runtime: &tokio::runtime::Runtime, text: &str) -> Result<()> {
        runtime.block_on(async {
            let mut stream = self.client.synthesize(text).await?;
            let mut playback = self.device.open_playback(defaults::PLAYBACK_SAMPLE_RATE)?;
            let mut pending: Vec<u8> = Vec::new();

            while let Some(chunk) = stream.next().await {
                pending.extend_from_slice(&chunk?);
                while pending.len() >= defaults::PLAYBACK_CHUNK_BYTES {
                    let ready: Vec<u8> = pending.drain(..defaults::PLAYBACK_CHUNK_BYTES).collect();
                    playback.write(&ready)?;
                }
            }

            if !pending.is_empty() {
                playback.write(&pending)?;
            }
            playback.finish()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioBackend, CaptureStream, PlaybackStream};
    use crate::error::LivesubError;
    use crate::synthesis::client::ByteStream;
    use async_trait::async_trait;
    use crossbeam_channel::bounded;
    use std::sync::Mutex;

    fn word(text: &str) -> FixedWord {
        FixedWord::word(text)
    }

    #[test]
    fn test_buffer_accumulates_without_trigger() {
        let mut buffer = SynthesisBuffer::new();
        assert!(buffer.push(&word("hello ")).is_none());
        assert!(buffer.push(&word("world")).is_none());
        assert!(!buffer.is_empty());
    }

    #[test]
    fn test_short_buffer_comma_does_not_flush() {
        // ["A", "B", "，", "C"] with a short buffer: the mid-stream comma
        // must not flush.
        let mut buffer = SynthesisBuffer::new();
        assert!(buffer.push(&word("A")).is_none());
        assert!(buffer.push(&word("B")).is_none());
        assert!(buffer.push(&word("，")).is_none());
        assert!(buffer.push(&word("C")).is_none());
    }

    #[test]
    fn test_long_buffer_comma_flushes_immediately() {
        let mut buffer = SynthesisBuffer::new();
        buffer.push(&word("一二三四五六七八九十一二三四五六")); // 16 chars
        let flushed = buffer.push(&word("，")).expect("boundary should flush");
        assert_eq!(
            flushed,
            format!(
                "一二三四五六七八九十一二三四五六，{}",
                defaults::SYNTHESIS_PAUSE_MARKER
            )
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_exactly_threshold_does_not_flush() {
        let mut buffer = SynthesisBuffer::new();
        buffer.push(&word("一二三四五六七八九十一二三四五")); // 15 chars
        assert!(buffer.push(&word("，")).is_none());
    }

    #[test]
    fn test_sentence_end_flushes_any_length() {
        let mut buffer = SynthesisBuffer::new();
        buffer.push(&word("hi"));
        let flushed = buffer
            .push(&FixedWord::sentence_end())
            .expect("sentence end flushes");
        assert_eq!(flushed, format!("hi{}", defaults::SYNTHESIS_PAUSE_MARKER));
    }

    #[test]
    fn test_sentence_end_with_empty_buffer_is_silent() {
        let mut buffer = SynthesisBuffer::new();
        assert!(buffer.push(&FixedWord::sentence_end()).is_none());
    }

    #[test]
    fn test_non_boundary_punctuation_never_flushes_early() {
        let mut buffer = SynthesisBuffer::new();
        buffer.push(&word("一二三四五六七八九十一二三四五六七八"));
        assert!(buffer.push(&word("!")).is_none());
    }

    // Worker tests with a scripted client and device backend.

    struct NoCapture;

    impl CaptureStream for NoCapture {
        fn read(&mut self) -> Result<Vec<i16>> {
            Ok(Vec::new())
        }
    }

    struct RecordingPlayback {
        writes: Arc<Mutex<Vec<usize>>>,
    }

    impl PlaybackStream for RecordingPlayback {
        fn write(&mut self, pcm: &[u8]) -> Result<()> {
            self.writes.lock().unwrap().push(pcm.len());
            Ok(())
        }
        fn finish(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct RecordingBackend {
        writes: Arc<Mutex<Vec<usize>>>,
    }

    impl AudioBackend for RecordingBackend {
        fn open_capture(&self, _device: Option<&str>) -> Result<Box<dyn CaptureStream>> {
            Ok(Box::new(NoCapture))
        }
        fn open_playback(&self, _sample_rate: u32) -> Result<Box<dyn PlaybackStream>> {
            Ok(Box::new(RecordingPlayback {
                writes: Arc::clone(&self.writes),
            }))
        }
    }

    struct ScriptedClient {
        requests: Arc<Mutex<Vec<String>>>,
        chunks: Vec<Vec<u8>>,
        fail: bool,
    }

    #[async_trait]
    impl SynthesisClient for ScriptedClient {
        async fn synthesize(&self, text: &str) -> Result<ByteStream> {
            self.requests.lock().unwrap().push(text.to_string());
            if self.fail {
                return Err(LivesubError::SynthesisStatus {
                    status: 500,
                    body: "server error".to_string(),
                });
            }
            let chunks: Vec<Result<Vec<u8>>> = self.chunks.iter().cloned().map(Ok).collect();
            Ok(Box::pin(futures_util::stream::iter(chunks)))
        }
    }

    fn run_worker(
        client: ScriptedClient,
        words: Vec<FixedWord>,
        enabled: bool,
    ) -> (Arc<Mutex<Vec<String>>>, Arc<Mutex<Vec<usize>>>) {
        let requests = Arc::clone(&client.requests);
        let writes = Arc::new(Mutex::new(Vec::new()));
        let device = Arc::new(AudioDevice::new(Box::new(RecordingBackend {
            writes: Arc::clone(&writes),
        })));

        let (tx, rx) = bounded(64);
        for w in words {
            tx.send(w).unwrap();
        }

        let running = Arc::new(AtomicBool::new(true));
        let session = SpeechSynthesisSession::new(
            device,
            Arc::new(client),
            rx,
            Arc::clone(&running),
            Arc::new(AtomicBool::new(enabled)),
        );

        let handle = std::thread::spawn(move || session.run());
        std::thread::sleep(Duration::from_millis(300));
        running.store(false, Ordering::SeqCst);
        handle.join().unwrap();

        (requests, writes)
    }

    #[test]
    fn test_worker_synthesizes_on_sentence_end() {
        let client = ScriptedClient {
            requests: Arc::new(Mutex::new(Vec::new())),
            chunks: vec![vec![0u8; 1000]; 10],
            fail: false,
        };

        let (requests, writes) = run_worker(
            client,
            vec![word("hello "), word("world"), FixedWord::sentence_end()],
            true,
        );

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0],
            format!("hello world{}", defaults::SYNTHESIS_PAUSE_MARKER)
        );

        // 10_000 bytes arrive in 1000-byte chunks: two full 4096-byte
        // writes plus the 1808-byte remainder.
        let writes = writes.lock().unwrap();
        assert_eq!(writes.as_slice(), &[4096, 4096, 1808]);
    }

    #[test]
    fn test_worker_drops_sentence_on_failure_and_continues() {
        let client = ScriptedClient {
            requests: Arc::new(Mutex::new(Vec::new())),
            chunks: Vec::new(),
            fail: true,
        };

        let (requests, writes) = run_worker(
            client,
            vec![
                word("one"),
                FixedWord::sentence_end(),
                word("two"),
                FixedWord::sentence_end(),
            ],
            true,
        );

        // Both sentences were attempted; neither produced audio.
        assert_eq!(requests.lock().unwrap().len(), 2);
        assert!(writes.lock().unwrap().is_empty());
    }

    #[test]
    fn test_worker_idles_while_disabled() {
        let client = ScriptedClient {
            requests: Arc::new(Mutex::new(Vec::new())),
            chunks: Vec::new(),
            fail: false,
        };

        let (requests, _writes) = run_worker(
            client,
            vec![word("queued"), FixedWord::sentence_end()],
            false,
        );

        assert!(
            requests.lock().unwrap().is_empty(),
            "disabled worker must not consume the queue"
        );
    }
}
