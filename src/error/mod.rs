// Error types for the route resynchronizer
//
// Errors here never cross the public `resync` entry points. They travel
// between platform backends and the resynchronizer, where each one is logged
// and absorbed at the step boundary it occurred in.

mod route;

pub use route::{log_resync_error, PlaybackStage, ResyncError, ResyncErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, so log lines and telemetry events carry the
/// same numeric code.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
