//! Configuration for the route resynchronizer
//!
//! The nudge is parameterless for callers; these values only tune how it
//! runs. Defaults reproduce the fixed behavior (100 ms of silence, drained
//! before stop, no delay, no coalescing) and are used whenever the config
//! file is missing or invalid.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::route::{
    MAX_PRE_DELAY_MS, MAX_SILENCE_DURATION_MS, MIN_SILENCE_DURATION_MS, SILENCE_DURATION_MS,
};

/// Route resynchronizer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResyncConfig {
    /// Master switch; a disabled resynchronizer logs and returns immediately
    pub enabled: bool,
    /// Delay before the nudge starts, giving a just-connected device time to settle
    pub pre_delay_ms: u64,
    /// Length of the silent buffer in milliseconds
    pub silence_duration_ms: u64,
    /// Let the silent buffer play out before stopping the stream
    pub drain_before_stop: bool,
    /// Calls landing within this window after a completed nudge are coalesced
    pub coalesce_window_ms: u64,
}

impl Default for ResyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pre_delay_ms: 0,
            silence_duration_ms: SILENCE_DURATION_MS,
            drain_before_stop: true,
            coalesce_window_ms: 0,
        }
    }
}

impl ResyncConfig {
    /// Return a copy with out-of-range values clamped.
    ///
    /// The silence duration must stay long enough for the platform to commit
    /// to a route and short enough to be imperceptible. The settle delay is
    /// capped so a call never blocks its caller for long.
    pub fn validated(mut self) -> Self {
        let clamped = self
            .silence_duration_ms
            .clamp(MIN_SILENCE_DURATION_MS, MAX_SILENCE_DURATION_MS);
        if clamped != self.silence_duration_ms {
            log::warn!(
                "[Config] silence_duration_ms {} out of range, clamped to {}",
                self.silence_duration_ms,
                clamped
            );
            self.silence_duration_ms = clamped;
        }
        if self.pre_delay_ms > MAX_PRE_DELAY_MS {
            log::warn!(
                "[Config] pre_delay_ms {} too long, clamped to {}",
                self.pre_delay_ms,
                MAX_PRE_DELAY_MS
            );
            self.pre_delay_ms = MAX_PRE_DELAY_MS;
        }
        self
    }

    pub fn silence_duration(&self) -> Duration {
        Duration::from_millis(self.silence_duration_ms)
    }

    pub fn pre_delay(&self) -> Duration {
        Duration::from_millis(self.pre_delay_ms)
    }

    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }

    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The loaded and validated configuration, or the defaults if the file
    /// doesn't exist or the JSON is invalid.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<ResyncConfig>(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config.validated()
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Android builds ship no config file; the defaults apply.
    #[cfg(target_os = "android")]
    pub fn load() -> Self {
        log::info!("[Config] Using default route resync configuration");
        Self::default()
    }

    /// Load configuration for non-Android platforms
    #[cfg(not(target_os = "android"))]
    pub fn load() -> Self {
        Self::load_from_file("assets/route_resync.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ResyncConfig::default();
        assert!(config.enabled);
        assert_eq!(config.pre_delay_ms, 0);
        assert_eq!(config.silence_duration_ms, 100);
        assert!(config.drain_before_stop);
        assert_eq!(config.coalesce_window_ms, 0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let parsed: ResyncConfig =
            serde_json::from_str(r#"{ "pre_delay_ms": 250 }"#).unwrap();
        assert_eq!(parsed.pre_delay_ms, 250);
        assert_eq!(parsed.silence_duration_ms, 100);
        assert!(parsed.enabled);
    }

    #[test]
    fn test_validated_clamps_silence_duration() {
        let short = ResyncConfig {
            silence_duration_ms: 5,
            ..ResyncConfig::default()
        }
        .validated();
        assert_eq!(short.silence_duration_ms, MIN_SILENCE_DURATION_MS);

        let long = ResyncConfig {
            silence_duration_ms: 5_000,
            ..ResyncConfig::default()
        }
        .validated();
        assert_eq!(long.silence_duration_ms, MAX_SILENCE_DURATION_MS);
    }

    #[test]
    fn test_validated_clamps_pre_delay() {
        let parsed: ResyncConfig =
            serde_json::from_str(r#"{ "pre_delay_ms": 3600000 }"#).unwrap();
        assert_eq!(parsed.validated().pre_delay_ms, MAX_PRE_DELAY_MS);

        let short = ResyncConfig {
            pre_delay_ms: 250,
            ..ResyncConfig::default()
        }
        .validated();
        assert_eq!(short.pre_delay_ms, 250);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = ResyncConfig::load_from_file("/nonexistent/route_resync.json");
        assert_eq!(config, ResyncConfig::default());
    }

    #[test]
    fn test_load_from_file_validates() {
        let path = std::env::temp_dir().join(format!(
            "route-resync-config-{}.json",
            std::process::id()
        ));
        fs::write(&path, r#"{ "silence_duration_ms": 1, "enabled": false }"#).unwrap();

        let config = ResyncConfig::load_from_file(&path);
        assert!(!config.enabled);
        assert_eq!(config.silence_duration_ms, MIN_SILENCE_DURATION_MS);

        let _ = fs::remove_file(&path);
    }
}
