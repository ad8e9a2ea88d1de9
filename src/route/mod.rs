//! Route resynchronization - forcing the platform to re-bind audio output
//!
//! After an output device change the platform routing layer can keep
//! sending audio to a stale endpoint. The nudge here makes it re-evaluate:
//! - Volume perturbation: read the media stream volume and write it back
//! - Silent playback: open, fill, start, stop and release a throwaway stream
//!
//! Both steps are best effort. Failures are logged and absorbed, and the
//! transient stream is released on every path.

pub mod coalesce;
pub mod resync;
pub mod silence;

pub use coalesce::CoalescingResynchronizer;
pub use resync::{ResyncOutcome, ResyncStep, RouteResynchronizer, StepStatus};
pub use silence::SilentBuffer;

/// Sample rate of the silent stream in Hz
pub const SAMPLE_RATE_HZ: u32 = 44_100;

/// Interleaved channel count of the silent stream (stereo)
pub const CHANNEL_COUNT: u16 = 2;

/// Linear PCM bit depth of the silent stream
pub const BITS_PER_SAMPLE: u16 = 16;

/// Default silent buffer length; long enough for the platform to commit to a route
pub const SILENCE_DURATION_MS: u64 = 100;

/// Shortest silent buffer accepted by configuration
pub const MIN_SILENCE_DURATION_MS: u64 = 50;

/// Longest silent buffer accepted by configuration
pub const MAX_SILENCE_DURATION_MS: u64 = 200;

/// Longest settle delay accepted by configuration; keeps a call short
pub const MAX_PRE_DELAY_MS: u64 = 500;

/// PCM format of a transient output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl StreamFormat {
    /// Standard media content: stereo, 16-bit PCM, 44.1 kHz.
    pub const MEDIA: StreamFormat = StreamFormat {
        sample_rate: SAMPLE_RATE_HZ,
        channels: CHANNEL_COUNT,
        bits_per_sample: BITS_PER_SAMPLE,
    };

    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }
}

impl Default for StreamFormat {
    fn default() -> Self {
        Self::MEDIA
    }
}
