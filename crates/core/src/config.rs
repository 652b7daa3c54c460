//! Monitor configuration loaded once at startup.
//!
//! The on-disk format is a flat JSON object. Every key is optional: missing
//! keys fall back to the defaults below and unknown keys are ignored, so a
//! config file only needs to name what it overrides.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Path used when neither a CLI argument nor `FORKWATCH_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/forkwatch/config.json";

pub const DEFAULT_UDP_LISTEN_PORT: u16 = 5005;
pub const DEFAULT_UDP_LISTEN_HOST: &str = "0.0.0.0";
pub const DEFAULT_DISTANCE_THRESHOLD_CM: f64 = 80.0;
pub const DEFAULT_PAUSE_DURATION_SECS: f64 = 120.0;
pub const DEFAULT_ALERT_WAV_PATH: &str = "/usr/share/forkwatch/alert.wav";
pub const DEFAULT_AUDIO_PLAYER: &str = "aplay";
pub const DEFAULT_AUDIO_TIMEOUT_SECS: f64 = 10.0;
pub const DEFAULT_PAUSE_BUTTON_GPIO: u32 = 17;
pub const DEFAULT_MIN_ALERT_INTERVAL_SECS: f64 = 1.0;
pub const DEFAULT_FRESHNESS_TIMEOUT_SECS: f64 = 2.0;
pub const DEFAULT_STATUS_INTERVAL_SECS: f64 = 5.0;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Upper bound for every seconds-valued key (one year).
pub const MAX_DURATION_SECS: f64 = 365.0 * 24.0 * 3600.0;
/// Upper bound for `poll_interval_ms`.
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;

// ---------------------------------------------------------------------------
// MonitorConfig
// ---------------------------------------------------------------------------

/// Resolved configuration for the fork-height monitor.
///
/// Treated as immutable after [`MonitorConfig::load`] returns; the agent
/// shares it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// UDP port the telemetry listener binds to.
    pub udp_listen_port: u16,
    /// Interface address the telemetry listener binds to.
    pub udp_listen_host: String,
    /// Readings strictly below this distance (cm) sound the horn.
    pub distance_threshold_cm: f64,
    /// How long a press of the pause button silences alerts.
    pub pause_duration_seconds: f64,
    /// WAV file played as the horn warning.
    pub alert_wav_path: String,
    /// Command used to play `alert_wav_path` (receives the path as its
    /// only argument).
    pub audio_player: String,
    /// Playback is killed if it runs longer than this.
    pub audio_timeout_sec: f64,
    /// BCM GPIO line the pause button is wired to.
    pub pause_button_gpio: u32,
    /// Minimum gap between two audible horn activations.
    pub min_interval_between_alerts_sec: f64,
    /// Telemetry older than this is reported as stale.
    pub data_freshness_timeout_sec: f64,
    /// Wall time between two status reports.
    pub status_interval_sec: f64,
    /// Decision loop period.
    pub poll_interval_ms: u64,
    /// Sound the horn once at startup so operators can hear it works.
    pub startup_self_test: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            udp_listen_port: DEFAULT_UDP_LISTEN_PORT,
            udp_listen_host: DEFAULT_UDP_LISTEN_HOST.to_string(),
            distance_threshold_cm: DEFAULT_DISTANCE_THRESHOLD_CM,
            pause_duration_seconds: DEFAULT_PAUSE_DURATION_SECS,
            alert_wav_path: DEFAULT_ALERT_WAV_PATH.to_string(),
            audio_player: DEFAULT_AUDIO_PLAYER.to_string(),
            audio_timeout_sec: DEFAULT_AUDIO_TIMEOUT_SECS,
            pause_button_gpio: DEFAULT_PAUSE_BUTTON_GPIO,
            min_interval_between_alerts_sec: DEFAULT_MIN_ALERT_INTERVAL_SECS,
            data_freshness_timeout_sec: DEFAULT_FRESHNESS_TIMEOUT_SECS,
            status_interval_sec: DEFAULT_STATUS_INTERVAL_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            startup_self_test: true,
        }
    }
}

impl MonitorConfig {
    /// Load the config from `path`, merging it over the defaults.
    ///
    /// A missing file is not an error: the defaults are returned and a
    /// warning is logged. A file that exists but cannot be read or is not
    /// a valid JSON object is fatal, as is any value rejected by
    /// [`validate`](Self::validate).
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let path_str = path.display().to_string();

        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %path_str,
                    "Config file not found -- using defaults",
                );
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(CoreError::Config {
                    path: path_str,
                    message: e.to_string(),
                });
            }
        };

        let config = Self::from_json(&raw).map_err(|e| match e {
            CoreError::Config { message, .. } => CoreError::Config {
                path: path_str.clone(),
                message,
            },
            other => other,
        })?;

        tracing::info!(path = %path_str, "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate a JSON document.
    pub fn from_json(raw: &str) -> Result<Self, CoreError> {
        let config: Self = serde_json::from_str(raw).map_err(|e| CoreError::Config {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the decision engine cannot operate with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.udp_listen_port == 0 {
            return Err(CoreError::Validation(
                "udp_listen_port must be non-zero".to_string(),
            ));
        }
        validate_positive(self.distance_threshold_cm, "distance_threshold_cm")?;
        validate_seconds(self.pause_duration_seconds, "pause_duration_seconds", true)?;
        validate_seconds(
            self.min_interval_between_alerts_sec,
            "min_interval_between_alerts_sec",
            true,
        )?;
        validate_seconds(self.audio_timeout_sec, "audio_timeout_sec", false)?;
        validate_seconds(
            self.data_freshness_timeout_sec,
            "data_freshness_timeout_sec",
            false,
        )?;
        validate_seconds(self.status_interval_sec, "status_interval_sec", false)?;
        if self.poll_interval_ms == 0 || self.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            return Err(CoreError::Validation(format!(
                "poll_interval_ms must be between 1 and {MAX_POLL_INTERVAL_MS}, got {}",
                self.poll_interval_ms
            )));
        }
        if self.audio_player.trim().is_empty() {
            return Err(CoreError::Validation(
                "audio_player must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn pause_duration(&self) -> Duration {
        Duration::from_secs_f64(self.pause_duration_seconds)
    }

    pub fn min_alert_interval(&self) -> Duration {
        Duration::from_secs_f64(self.min_interval_between_alerts_sec)
    }

    pub fn freshness_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.data_freshness_timeout_sec)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs_f64(self.status_interval_sec)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn audio_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.audio_timeout_sec)
    }
}

fn validate_positive(value: f64, name: &str) -> Result<(), CoreError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(CoreError::Validation(format!(
            "{name} must be a positive number, got {value}"
        )));
    }
    Ok(())
}

/// Durations are converted with `Duration::from_secs_f64`, which panics on
/// values it cannot represent, so they are bounded here.
fn validate_seconds(value: f64, name: &str, allow_zero: bool) -> Result<(), CoreError> {
    let in_range = if allow_zero { value >= 0.0 } else { value > 0.0 };
    if !value.is_finite() || !in_range || value > MAX_DURATION_SECS {
        let lower = if allow_zero { "zero or greater" } else { "positive" };
        return Err(CoreError::Validation(format!(
            "{name} must be {lower} and at most {MAX_DURATION_SECS} seconds, got {value}"
        )));
    }
    Ok(())
}
