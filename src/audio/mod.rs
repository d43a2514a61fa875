//! Audio capture and playback.
//!
//! [`AudioDevice`] is the single owner of the native stream handles; the
//! cpal-backed implementations live in [`capture`] and [`playback`].

pub mod capture;
pub mod device;
pub mod playback;

pub use capture::{list_devices, suppress_audio_warnings};
pub use device::{AudioBackend, AudioDevice, CaptureStream, FrameRead, PlaybackStream};

use crate::error::Result;

/// cpal-backed [`AudioBackend`] used by the binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl AudioBackend for CpalBackend {
    fn open_capture(&self, device: Option<&str>) -> Result<Box<dyn CaptureStream>> {
        Ok(Box::new(capture::CpalCapture::open(device)?))
    }

    fn open_playback(&self, sample_rate: u32) -> Result<Box<dyn PlaybackStream>> {
        Ok(Box::new(playback::CpalPlayback::open(sample_rate)?))
    }
}
