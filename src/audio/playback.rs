//! Speaker playback for synthesized speech using CPAL.

use crate::audio::device::PlaybackStream;
use crate::error::{LivesubError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Wrapper for cpal::Stream to make it Send. See capture.rs.
struct SendableStream(#[allow(dead_code)] cpal::Stream);

unsafe impl Send for SendableStream {}

/// Upper bound on waiting for queued audio to drain in finish().
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Playback stream writing mono PCM16 to the default output device.
///
/// Incoming bytes are queued; the cpal callback pops samples from the
/// queue and fills the rest of each period with silence, so playback
/// starts as soon as the first chunk arrives.
pub struct CpalPlayback {
    _stream: SendableStream,
    queue: Arc<Mutex<VecDeque<i16>>>,
}

impl CpalPlayback {
    /// Open the output stream at the given sample rate and start it.
    pub fn open(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();
        let device =
            host.default_output_device()
                .ok_or_else(|| LivesubError::AudioDeviceNotFound {
                    device: "default output".to_string(),
                })?;

        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let queue: Arc<Mutex<VecDeque<i16>>> = Arc::new(Mutex::new(VecDeque::new()));
        let stream = Self::build_stream(&device, &config, Arc::clone(&queue))?;

        stream.play().map_err(|e| LivesubError::AudioPlayback {
            message: format!("Failed to start playback stream: {}", e),
        })?;

        Ok(Self {
            _stream: SendableStream(stream),
            queue,
        })
    }

    fn build_stream(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        queue: Arc<Mutex<VecDeque<i16>>>,
    ) -> Result<cpal::Stream> {
        let err_callback = |err| {
            log::error!("playback stream error: {}", err);
        };

        // Try i16 output first, then fall back to f32 conversion.
        let q = Arc::clone(&queue);
        if let Ok(stream) = device.build_output_stream(
            config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                let mut queue = match q.lock() {
                    Ok(queue) => queue,
                    Err(_) => return,
                };
                for slot in data.iter_mut() {
                    *slot = queue.pop_front().unwrap_or(0);
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        let q = Arc::clone(&queue);
        device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut queue = match q.lock() {
                        Ok(queue) => queue,
                        Err(_) => return,
                    };
                    for slot in data.iter_mut() {
                        let sample = queue.pop_front().unwrap_or(0);
                        *slot = sample as f32 / i16::MAX as f32;
                    }
                },
                err_callback,
                None,
            )
            .map_err(|e| LivesubError::AudioPlayback {
                message: format!("Failed to build output stream: {}", e),
            })
    }

    fn queue_len(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }
}

impl PlaybackStream for CpalPlayback {
    fn write(&mut self, pcm: &[u8]) -> Result<()> {
        let mut queue = self.queue.lock().map_err(|e| LivesubError::AudioPlayback {
            message: format!("Failed to lock playback queue: {}", e),
        })?;

        // PCM16 little-endian; a trailing odd byte is dropped.
        for pair in pcm.chunks_exact(2) {
            queue.push_back(i16::from_le_bytes([pair[0], pair[1]]));
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let deadline = Instant::now() + DRAIN_TIMEOUT;
        while self.queue_len() > 0 {
            if Instant::now() >= deadline {
                return Err(LivesubError::AudioPlayback {
                    message: "timed out draining playback queue".to_string(),
                });
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        Ok(())
    }
}
