// Route resynchronization error types and constants

use crate::error::ErrorCode;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Route resync error code constants
///
/// Error code range: 3001-3008
pub struct ResyncErrorCodes {}

impl ResyncErrorCodes {
    /// Platform audio service could not be obtained or is unusable
    pub const SERVICE_UNAVAILABLE: i32 = 3001;

    /// Android context was not initialized before the service was requested
    pub const CONTEXT_NOT_INITIALIZED: i32 = 3002;

    /// Reading the media stream volume failed
    pub const VOLUME_QUERY_FAILED: i32 = 3003;

    /// Writing the media stream volume back failed
    pub const VOLUME_UPDATE_FAILED: i32 = 3004;

    /// The transient output stream could not be allocated
    pub const STREAM_OPEN_FAILED: i32 = 3005;

    /// Write, start or stop of the silent stream failed
    pub const PLAYBACK_FAILED: i32 = 3006;

    /// The platform has no API for the requested operation
    pub const UNSUPPORTED: i32 = 3007;

    /// JNI call or thread attachment failed
    pub const JNI_FAILED: i32 = 3008;
}

/// Stage of the silent playback cycle that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStage {
    Write,
    Start,
    Stop,
}

impl fmt::Display for PlaybackStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackStage::Write => "write",
            PlaybackStage::Start => "start",
            PlaybackStage::Stop => "stop",
        };
        f.write_str(name)
    }
}

/// Log an absorbed resync error with structured context
///
/// Failures of the nudge are expected on some platform/device combinations,
/// so they are logged at warn level. Operations the platform simply does not
/// offer are logged at debug level.
pub fn log_resync_error(err: &ResyncError, context: &str) {
    if matches!(err, ResyncError::Unsupported { .. }) {
        debug!(
            "[RouteResync] {} skipped: code={}, message={}",
            context,
            err.code(),
            err.message()
        );
        return;
    }

    warn!(
        "[RouteResync] {} failed: code={}, component=RouteResynchronizer, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised by platform audio services
///
/// These map onto the three failure classes of the nudge: the service is
/// unavailable, the transient stream cannot be allocated, or playback fails
/// partway through.
#[derive(Debug, Clone, PartialEq)]
pub enum ResyncError {
    /// Platform audio service could not be obtained
    ServiceUnavailable { reason: String },

    /// Android context was not registered (RouteResync.nativeInit has not run)
    ContextNotInitialized,

    /// Reading the media stream volume failed
    VolumeQueryFailed { reason: String },

    /// Writing the media stream volume failed
    VolumeUpdateFailed { level: i32, reason: String },

    /// The transient output stream could not be allocated
    StreamOpenFailed { reason: String },

    /// A stage of the silent playback cycle failed
    PlaybackFailed { stage: PlaybackStage, reason: String },

    /// The platform has no API for this operation
    Unsupported { operation: &'static str },

    /// JNI call or thread attachment failed
    Jni { reason: String },
}

impl ErrorCode for ResyncError {
    fn code(&self) -> i32 {
        match self {
            ResyncError::ServiceUnavailable { .. } => ResyncErrorCodes::SERVICE_UNAVAILABLE,
            ResyncError::ContextNotInitialized => ResyncErrorCodes::CONTEXT_NOT_INITIALIZED,
            ResyncError::VolumeQueryFailed { .. } => ResyncErrorCodes::VOLUME_QUERY_FAILED,
            ResyncError::VolumeUpdateFailed { .. } => ResyncErrorCodes::VOLUME_UPDATE_FAILED,
            ResyncError::StreamOpenFailed { .. } => ResyncErrorCodes::STREAM_OPEN_FAILED,
            ResyncError::PlaybackFailed { .. } => ResyncErrorCodes::PLAYBACK_FAILED,
            ResyncError::Unsupported { .. } => ResyncErrorCodes::UNSUPPORTED,
            ResyncError::Jni { .. } => ResyncErrorCodes::JNI_FAILED,
        }
    }

    fn message(&self) -> String {
        match self {
            ResyncError::ServiceUnavailable { reason } => {
                format!("Audio service unavailable: {}", reason)
            }
            ResyncError::ContextNotInitialized => {
                "Android context not initialized. RouteResync.nativeInit(Context) must run first."
                    .to_string()
            }
            ResyncError::VolumeQueryFailed { reason } => {
                format!("Failed to read media volume: {}", reason)
            }
            ResyncError::VolumeUpdateFailed { level, reason } => {
                format!("Failed to restore media volume {}: {}", level, reason)
            }
            ResyncError::StreamOpenFailed { reason } => {
                format!("Failed to open silent output stream: {}", reason)
            }
            ResyncError::PlaybackFailed { stage, reason } => {
                format!("Silent playback {} failed: {}", stage, reason)
            }
            ResyncError::Unsupported { operation } => {
                format!("{} is not supported on this platform", operation)
            }
            ResyncError::Jni { reason } => format!("JNI call failed: {}", reason),
        }
    }
}

impl fmt::Display for ResyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ResyncError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ResyncError {}
