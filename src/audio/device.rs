//! Single-owner audio device with a guarded capture handle.
//!
//! [`AudioDevice`] owns the microphone capture handle and hands out
//! playback handles for synthesized speech. The capture handle is only
//! ever touched under one mutex, shared by the open path (session
//! startup), the read path (frame loop) and the close path (supervisor
//! stop), so a close can never race an open.

use crate::defaults;
use crate::error::{LivesubError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Source of captured samples. Implementations drain whatever the
/// hardware delivered since the last call; an empty vec is a normal
/// result while the device warms up.
pub trait CaptureStream: Send {
    fn read(&mut self) -> Result<Vec<i16>>;
}

/// Sink for synthesized PCM16 audio.
pub trait PlaybackStream: Send {
    /// Queue PCM16 little-endian bytes for playback.
    fn write(&mut self, pcm: &[u8]) -> Result<()>;

    /// Block until everything queued has been played.
    fn finish(&mut self) -> Result<()>;
}

/// Factory for the native stream handles. The cpal implementation lives
/// in [`crate::audio::CpalBackend`]; tests substitute their own.
pub trait AudioBackend: Send + Sync {
    fn open_capture(&self, device: Option<&str>) -> Result<Box<dyn CaptureStream>>;
    fn open_playback(&self, sample_rate: u32) -> Result<Box<dyn PlaybackStream>>;
}

/// Outcome of a frame read attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum FrameRead {
    /// A full 3200-byte PCM16 frame.
    Frame(Vec<u8>),
    /// The device is open but has not produced a full frame yet.
    Empty,
    /// The capture handle is not open.
    Closed,
}

/// Exclusive owner of the native capture/playback handles.
pub struct AudioDevice {
    backend: Box<dyn AudioBackend>,
    /// Guards the capture handle and its pending-sample buffer.
    capture: Mutex<CaptureState>,
    open_captures: AtomicUsize,
    open_playbacks: AtomicUsize,
}

struct CaptureState {
    stream: Option<Box<dyn CaptureStream>>,
    pending: Vec<i16>,
}

impl AudioDevice {
    pub fn new(backend: Box<dyn AudioBackend>) -> Self {
        Self {
            backend,
            capture: Mutex::new(CaptureState {
                stream: None,
                pending: Vec::new(),
            }),
            open_captures: AtomicUsize::new(0),
            open_playbacks: AtomicUsize::new(0),
        }
    }

    /// Open the capture handle. A second open while already open is a
    /// no-op, so a racing session restart cannot double-claim the mic.
    pub fn open_capture(&self, device: Option<&str>) -> Result<()> {
        let mut state = self.lock_capture()?;
        if state.stream.is_some() {
            return Ok(());
        }

        let stream = self.backend.open_capture(device)?;
        state.stream = Some(stream);
        state.pending.clear();
        self.open_captures.fetch_add(1, Ordering::SeqCst);
        log::debug!("capture handle opened");
        Ok(())
    }

    /// Close the capture handle if open. Pending samples are discarded so
    /// stale audio cannot leak into the next session.
    pub fn close_capture(&self) {
        let mut state = match self.lock_capture() {
            Ok(state) => state,
            Err(e) => {
                log::error!("close_capture: {}", e);
                return;
            }
        };
        if state.stream.take().is_some() {
            self.open_captures.fetch_sub(1, Ordering::SeqCst);
            log::debug!("capture handle closed");
        }
        state.pending.clear();
    }

    pub fn is_capture_open(&self) -> bool {
        self.lock_capture()
            .map(|state| state.stream.is_some())
            .unwrap_or(false)
    }

    /// Number of currently open capture handles (0 or 1).
    pub fn open_captures(&self) -> usize {
        self.open_captures.load(Ordering::SeqCst)
    }

    /// Number of currently open playback handles.
    pub fn open_playbacks(&self) -> usize {
        self.open_playbacks.load(Ordering::SeqCst)
    }

    /// Read one 3200-byte frame (100ms at 16kHz mono PCM16).
    ///
    /// Blocks up to roughly two frame durations while samples accumulate,
    /// releasing the device lock between polls so a concurrent stop can
    /// close the handle. Returns [`FrameRead::Closed`] when the handle is
    /// not open and [`FrameRead::Empty`] when the deadline passes without
    /// a full frame.
    pub fn read_frame(&self) -> Result<FrameRead> {
        let deadline = Instant::now() + Duration::from_millis(200);

        loop {
            {
                let mut state = self.lock_capture()?;
                let stream = match state.stream.as_mut() {
                    Some(stream) => stream,
                    None => return Ok(FrameRead::Closed),
                };

                let fresh = stream.read()?;
                state.pending.extend(fresh);

                if state.pending.len() >= defaults::FRAME_SAMPLES {
                    let samples: Vec<i16> =
                        state.pending.drain(..defaults::FRAME_SAMPLES).collect();
                    let mut bytes = Vec::with_capacity(defaults::FRAME_BYTES);
                    for sample in samples {
                        bytes.extend_from_slice(&sample.to_le_bytes());
                    }
                    return Ok(FrameRead::Frame(bytes));
                }
            }

            if Instant::now() >= deadline {
                return Ok(FrameRead::Empty);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Open a playback handle for one synthesis response.
    pub fn open_playback(&self, sample_rate: u32) -> Result<PlaybackHandle<'_>> {
        let stream = self.backend.open_playback(sample_rate)?;
        self.open_playbacks.fetch_add(1, Ordering::SeqCst);
        Ok(PlaybackHandle {
            stream,
            counter: &self.open_playbacks,
            closed: false,
        })
    }

    fn lock_capture(&self) -> Result<std::sync::MutexGuard<'_, CaptureState>> {
        self.capture.lock().map_err(|e| LivesubError::AudioCapture {
            message: format!("Failed to lock capture state: {}", e),
        })
    }
}

/// Playback handle scoped to one synthesis response. Dropping it releases
/// the device slot even if `finish` was never reached.
pub struct PlaybackHandle<'a> {
    stream: Box<dyn PlaybackStream>,
    counter: &'a AtomicUsize,
    closed: bool,
}

impl PlaybackHandle<'_> {
    pub fn write(&mut self, pcm: &[u8]) -> Result<()> {
        self.stream.write(pcm)
    }

    /// Drain queued audio and release the handle.
    pub fn finish(mut self) -> Result<()> {
        let result = self.stream.finish();
        self.counter.fetch_sub(1, Ordering::SeqCst);
        self.closed = true;
        result
    }
}

impl Drop for PlaybackHandle<'_> {
    fn drop(&mut self) {
        if !self.closed {
            self.counter.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
