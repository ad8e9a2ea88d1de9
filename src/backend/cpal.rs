//! CPAL-based audio service for desktop platforms (Linux, macOS, Windows)
//!
//! Desktop hosts expose no per-stream media volume, so only the silent
//! playback cycle applies here. Opening a stream on the default output device
//! makes the host resolve the current default route.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use serde::Serialize;

use crate::error::{PlaybackStage, ResyncError};
use crate::route::StreamFormat;

use super::{AudioService, OutputStream};

const BUILD_STREAM_TIMEOUT: Duration = Duration::from_secs(2);

/// Audio service backed by the default CPAL host.
///
/// Holds no device handles; each stream resolves the default output device
/// at open time so a changed default is always picked up.
#[derive(Default)]
pub struct CpalAudioService {
    _unit: (),
}

impl CpalAudioService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioService for CpalAudioService {
    fn media_volume(&self) -> Result<i32, ResyncError> {
        Err(ResyncError::Unsupported {
            operation: "media volume query",
        })
    }

    fn set_media_volume(&self, _level: i32) -> Result<(), ResyncError> {
        Err(ResyncError::Unsupported {
            operation: "media volume update",
        })
    }

    fn open_output_stream(
        &self,
        format: &StreamFormat,
    ) -> Result<Box<dyn OutputStream + '_>, ResyncError> {
        if format.bits_per_sample != 16 {
            return Err(ResyncError::StreamOpenFailed {
                reason: format!("{}-bit output is not supported", format.bits_per_sample),
            });
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| ResyncError::ServiceUnavailable {
                reason: "No default output device found".to_string(),
            })?;

        let config = cpal::StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let pending: Arc<Mutex<VecDeque<i16>>> = Arc::new(Mutex::new(VecDeque::new()));
        let queue = Arc::clone(&pending);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| match queue.try_lock() {
                    Ok(mut samples) => {
                        for sample in data.iter_mut() {
                            *sample = samples.pop_front().unwrap_or(0);
                        }
                    }
                    Err(_) => data.fill(0),
                },
                |err| tracing::warn!("[RouteResync] Silent stream error: {}", err),
                Some(BUILD_STREAM_TIMEOUT),
            )
            .map_err(|e| ResyncError::StreamOpenFailed {
                reason: format!("{:?}", e),
            })?;

        Ok(Box::new(CpalSilentStream { stream, pending }))
    }
}

struct CpalSilentStream {
    stream: cpal::Stream,
    pending: Arc<Mutex<VecDeque<i16>>>,
}

impl OutputStream for CpalSilentStream {
    fn write(&mut self, samples: &[i16]) -> Result<usize, ResyncError> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(samples.iter().copied());
        Ok(samples.len())
    }

    fn start(&mut self) -> Result<(), ResyncError> {
        self.stream
            .play()
            .map_err(|e| ResyncError::PlaybackFailed {
                stage: PlaybackStage::Start,
                reason: e.to_string(),
            })
    }

    fn stop(&mut self) -> Result<(), ResyncError> {
        self.stream
            .pause()
            .map_err(|e| ResyncError::PlaybackFailed {
                stage: PlaybackStage::Stop,
                reason: e.to_string(),
            })
    }
}

/// Output device summary for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct OutputDeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub default_config: Option<String>,
}

/// Enumerate output devices on the default host.
pub fn output_devices() -> Result<Vec<OutputDeviceInfo>, ResyncError> {
    let host = cpal::default_host();
    let default_name = host
        .default_output_device()
        .and_then(|device| device.name().ok());

    let devices = host
        .output_devices()
        .map_err(|e| ResyncError::ServiceUnavailable {
            reason: e.to_string(),
        })?;

    Ok(devices
        .map(|device| {
            let name = device.name().unwrap_or_else(|_| "<unknown>".to_string());
            let default_config = device
                .default_output_config()
                .ok()
                .map(|config| format!("{:?}", config));
            OutputDeviceInfo {
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
                default_config,
            }
        })
        .collect())
}
