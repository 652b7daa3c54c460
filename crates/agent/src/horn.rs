//! Horn warning playback.
//!
//! [`AudioHorn`] is the production [`AlertAction`]: it launches the
//! configured player (`aplay` by default) on the alert WAV file in a
//! background task and returns immediately. The decision loop never waits
//! for the sound to finish.
//!
//! A request is refused (returns `false`) when the WAV file is missing,
//! when a previous playback is still running, or when the inter-alert
//! [`AlertThrottle`] has not yet reopened.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use forkwatch_core::config::MonitorConfig;
use forkwatch_core::throttle::AlertThrottle;
use forkwatch_core::traits::AlertAction;
use tokio::process::Command;

use crate::error::AgentError;

/// Outcome of one player invocation.
#[derive(Debug, Clone)]
pub struct PlaybackResult {
    pub success: bool,
    pub message: String,
    pub duration_ms: u64,
}

pub struct AudioHorn {
    wav_path: PathBuf,
    player: String,
    timeout: Duration,
    throttle: AlertThrottle,
    in_flight: Arc<AtomicBool>,
}

impl AudioHorn {
    pub fn new(
        wav_path: impl Into<PathBuf>,
        player: impl Into<String>,
        timeout: Duration,
        min_interval: Duration,
    ) -> Self {
        Self {
            wav_path: wav_path.into(),
            player: player.into(),
            timeout,
            throttle: AlertThrottle::new(min_interval),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(
            &config.alert_wav_path,
            &config.audio_player,
            config.audio_timeout(),
            config.min_alert_interval(),
        )
    }

    /// `true` while a launched playback has not finished yet.
    pub fn is_playing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }
}

impl AlertAction for AudioHorn {
    fn play(&mut self) -> bool {
        if !self.wav_path.exists() {
            tracing::warn!(path = %self.wav_path.display(), "Alert WAV file not found");
            return false;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(error = %e, "No async runtime available for horn playback");
                return false;
            }
        };

        if self.in_flight.load(Ordering::SeqCst) {
            tracing::debug!("Horn still playing -- request skipped");
            return false;
        }

        if !self.throttle.try_fire() {
            tracing::debug!(
                min_interval_ms = self.throttle.min_interval().as_millis() as u64,
                "Horn throttled",
            );
            return false;
        }

        self.in_flight.store(true, Ordering::SeqCst);
        let in_flight = Arc::clone(&self.in_flight);
        let player = self.player.clone();
        let wav_path = self.wav_path.clone();
        let timeout = self.timeout;

        runtime.spawn(async move {
            let result = play_file(&player, &wav_path, timeout).await;
            in_flight.store(false, Ordering::SeqCst);
            if result.success {
                tracing::info!(elapsed_ms = result.duration_ms, "Horn triggered");
            } else {
                tracing::error!(elapsed_ms = result.duration_ms, error = %result.message, "Horn playback failed");
            }
        });

        true
    }
}

/// Run `<player> <wav_path>` to completion, killing it after `timeout`.
pub async fn play_file(player: &str, wav_path: &Path, timeout: Duration) -> PlaybackResult {
    let start = std::time::Instant::now();

    let outcome = run_player(player, wav_path, timeout).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(()) => PlaybackResult {
            success: true,
            message: format!("Played '{}'", wav_path.display()),
            duration_ms,
        },
        Err(e) => PlaybackResult {
            success: false,
            message: e.to_string(),
            duration_ms,
        },
    }
}

async fn run_player(player: &str, wav_path: &Path, timeout: Duration) -> Result<(), AgentError> {
    let result = tokio::time::timeout(
        timeout,
        Command::new(player)
            .arg(wav_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output(),
    )
    .await;

    match result {
        Ok(Ok(output)) if output.status.success() => Ok(()),
        Ok(Ok(output)) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(AgentError::Audio(format!(
                "'{player}' exited with {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim(),
            )))
        }
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => Err(AgentError::Audio(format!(
            "'{player}' not found (install alsa-utils for aplay)"
        ))),
        Ok(Err(e)) => Err(AgentError::Audio(format!("failed to run '{player}': {e}"))),
        Err(_) => Err(AgentError::Audio(format!(
            "'{player}' timed out after {}s",
            timeout.as_secs_f64()
        ))),
    }
}
