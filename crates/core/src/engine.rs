//! Fork-height decision loop.
//!
//! Every poll the engine reads the latest telemetry, folds the two sensors
//! into one effective distance, applies the pause window and decides
//! whether the horn should be requested. The horn is requested only on the
//! rising edge of the alert condition; the [`AlertAction`] behind it may
//! still suppress the sound through its own throttle.
//!
//! [`DecisionEngine::step`] is a single synchronous cycle, so tests can
//! drive it directly under tokio's paused clock. [`DecisionEngine::run`]
//! wraps it in the fixed-period loop used in production.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::MonitorConfig;
use crate::pause::PauseState;
use crate::status::StatusReport;
use crate::telemetry::{TelemetryReader, TelemetryReading};
use crate::traits::AlertAction;

/// Pause before resuming after a cycle panicked.
pub const CYCLE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

/// Combine both sensors into the distance the threshold is checked against.
///
/// The second sensor only takes part when it reports a positive value. A
/// non-positive reading is the error sentinel and must never win the
/// `min`, or a failed sensor would hide a real obstruction.
pub fn effective_distance(distance_1_cm: f64, distance_2_cm: f64) -> f64 {
    if distance_2_cm > 0.0 {
        distance_1_cm.min(distance_2_cm)
    } else {
        distance_1_cm
    }
}

/// Whether a distance should sound the horn when not paused.
pub fn below_threshold(effective_cm: f64, threshold_cm: f64) -> bool {
    effective_cm > 0.0 && effective_cm < threshold_cm
}

// ---------------------------------------------------------------------------
// Settings and outcomes
// ---------------------------------------------------------------------------

/// The subset of [`MonitorConfig`] the engine needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub threshold_cm: f64,
    pub pause_duration: Duration,
    pub status_interval: Duration,
    pub poll_interval: Duration,
}

impl From<&MonitorConfig> for EngineSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            threshold_cm: config.distance_threshold_cm,
            pause_duration: config.pause_duration(),
            status_interval: config.status_interval(),
            poll_interval: config.poll_interval(),
        }
    }
}

/// What happened to the alert latch during one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDecision {
    /// Condition false, latch already clear.
    Idle,
    /// Rising edge: the alert action was invoked. `sounded` is what the
    /// action reported (`false` when throttled or playback failed).
    Triggered { sounded: bool },
    /// Condition still true, latch already set. Nothing invoked.
    Held,
    /// Condition went false, latch cleared.
    Cleared,
}

/// Result of a single [`DecisionEngine::step`].
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub reading: TelemetryReading,
    pub effective_distance_cm: f64,
    pub paused: bool,
    /// The pause button (re)started the pause window this cycle.
    pub pause_activated: bool,
    pub alert: AlertDecision,
    /// Present on cycles where a status report was due.
    pub status: Option<StatusReport>,
}

// ---------------------------------------------------------------------------
// DecisionEngine
// ---------------------------------------------------------------------------

pub struct DecisionEngine<A> {
    settings: EngineSettings,
    telemetry: TelemetryReader,
    pause: PauseState,
    alert: A,
    alert_latched: bool,
    last_status: Option<Instant>,
}

impl<A: AlertAction> DecisionEngine<A> {
    pub fn new(
        settings: EngineSettings,
        telemetry: TelemetryReader,
        pause: PauseState,
        alert: A,
    ) -> Self {
        Self {
            settings,
            telemetry,
            pause,
            alert,
            alert_latched: false,
            last_status: None,
        }
    }

    pub fn alert_latched(&self) -> bool {
        self.alert_latched
    }

    pub fn pause_state(&self) -> &PauseState {
        &self.pause
    }

    pub fn pause_state_mut(&mut self) -> &mut PauseState {
        &mut self.pause
    }

    pub fn alert_action(&self) -> &A {
        &self.alert
    }

    /// Sound the horn once outside the decision logic, so an operator can
    /// confirm the audio path at startup. Goes through the same action (and
    /// therefore the same throttle) as real alerts.
    pub fn self_test(&mut self) -> bool {
        let sounded = self.alert.play();
        if sounded {
            tracing::info!("Startup horn self-test played");
        } else {
            tracing::warn!("Startup horn self-test did not play");
        }
        sounded
    }

    /// Run one decision cycle.
    pub fn step(&mut self) -> CycleOutcome {
        let reading = self.telemetry.read();
        let effective = effective_distance(reading.distance_1_cm, reading.distance_2_cm);

        // Re-arm only when the window is not already running. Holding the
        // button therefore restarts the pause on the first poll after it
        // lapses, not on every poll.
        let mut paused = self.pause.is_paused();
        let mut pause_activated = false;
        if !paused && self.pause.physical_input_active() {
            self.pause.activate(self.settings.pause_duration);
            paused = true;
            pause_activated = true;
        }

        let condition = !paused && below_threshold(effective, self.settings.threshold_cm);
        let alert = match (condition, self.alert_latched) {
            (true, false) => {
                self.alert_latched = true;
                tracing::warn!(
                    effective_cm = effective,
                    threshold_cm = self.settings.threshold_cm,
                    "Fork below threshold -- sounding horn",
                );
                let sounded = self.alert.play();
                AlertDecision::Triggered { sounded }
            }
            (true, true) => AlertDecision::Held,
            (false, true) => {
                self.alert_latched = false;
                tracing::debug!(effective_cm = effective, paused, "Alert condition cleared");
                AlertDecision::Cleared
            }
            (false, false) => AlertDecision::Idle,
        };

        let status = self.status_if_due(reading, effective, paused);

        CycleOutcome {
            reading,
            effective_distance_cm: effective,
            paused,
            pause_activated,
            alert,
            status,
        }
    }

    fn status_if_due(
        &mut self,
        reading: TelemetryReading,
        effective: f64,
        paused: bool,
    ) -> Option<StatusReport> {
        let now = Instant::now();
        let due = self
            .last_status
            .map_or(true, |last| now.saturating_duration_since(last) >= self.settings.status_interval);
        if !due {
            return None;
        }
        self.last_status = Some(now);

        let report = StatusReport {
            alert_latched: self.alert_latched,
            distance_1_cm: reading.distance_1_cm,
            distance_2_cm: reading.distance_2_cm,
            effective_distance_cm: effective,
            paused,
            data_fresh: reading.fresh,
        };
        tracing::info!(
            alert = report.alert_latched,
            d1_cm = report.distance_1_cm,
            d2_cm = report.distance_2_cm,
            effective_cm = report.effective_distance_cm,
            paused = report.paused,
            fresh = report.data_fresh,
            "{report}",
        );
        Some(report)
    }

    /// Poll on the configured period until `cancel` fires.
    ///
    /// A panicking cycle is logged, followed by [`CYCLE_ERROR_BACKOFF`],
    /// and the loop carries on. Only cancellation ends it.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            poll_ms = self.settings.poll_interval.as_millis() as u64,
            threshold_cm = self.settings.threshold_cm,
            "Decision loop started",
        );

        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                self.step();
            }));
            if let Err(panic) = result {
                let message = panic_message(panic.as_ref());
                tracing::error!(error = %message, "Decision cycle failed -- backing off");

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(CYCLE_ERROR_BACKOFF) => {}
                }
                ticker.reset();
            }
        }

        tracing::info!("Decision loop stopped");
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_of_two_positive_readings() {
        assert_eq!(effective_distance(45.0, 67.0), 45.0);
        assert_eq!(effective_distance(90.0, 30.0), 30.0);
    }

    #[test]
    fn non_positive_second_reading_is_ignored() {
        assert_eq!(effective_distance(45.0, -1.0), 45.0);
        assert_eq!(effective_distance(45.0, 0.0), 45.0);
        assert_eq!(effective_distance(120.0, -500.0), 120.0);
    }

    #[test]
    fn first_reading_passes_through_even_when_invalid() {
        assert_eq!(effective_distance(-1.0, -1.0), -1.0);
        // A failed first sensor is not rescued by a valid second one.
        assert_eq!(effective_distance(-1.0, 30.0), -1.0);
    }

    #[test]
    fn threshold_is_strict_and_requires_positive() {
        assert!(below_threshold(79.9, 80.0));
        assert!(!below_threshold(80.0, 80.0));
        assert!(!below_threshold(0.0, 80.0));
        assert!(!below_threshold(-1.0, 80.0));
    }

    #[test]
    fn settings_follow_config() {
        let config = MonitorConfig::default();
        let settings = EngineSettings::from(&config);
        assert_eq!(settings.threshold_cm, 80.0);
        assert_eq!(settings.pause_duration, Duration::from_secs(120));
        assert_eq!(settings.status_interval, Duration::from_secs(5));
        assert_eq!(settings.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn panic_message_extracts_strings() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
    }
}
