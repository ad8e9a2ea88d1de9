//! Zero-valued PCM buffer played through the transient stream.

use std::time::Duration;

use super::StreamFormat;

/// Interleaved block of silent 16-bit samples.
///
/// Built fresh for each nudge and dropped before the nudge returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SilentBuffer {
    format: StreamFormat,
    samples: Vec<i16>,
}

impl SilentBuffer {
    /// Allocate enough silence to cover `duration` at the format's sample rate.
    ///
    /// Partial frames are truncated, so 100 ms at 44.1 kHz yields 4410 frames.
    pub fn new(format: StreamFormat, duration: Duration) -> Self {
        let frames = (format.sample_rate as u128 * duration.as_millis() / 1000) as usize;
        Self {
            format,
            samples: vec![0; frames * format.channels as usize],
        }
    }

    pub fn format(&self) -> &StreamFormat {
        &self.format
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn frames(&self) -> usize {
        match self.format.channels {
            0 => 0,
            channels => self.samples.len() / channels as usize,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.frames() * self.format.bytes_per_frame()
    }

    /// Playback time of the buffer at its sample rate.
    pub fn duration(&self) -> Duration {
        if self.format.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.frames() as u64 * 1_000_000 / self.format.sample_rate as u64)
    }

    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|&sample| sample == 0)
    }
}
