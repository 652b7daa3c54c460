//! Manual alert silencing.
//!
//! A pause is a single absolute deadline. Re-activating replaces the
//! deadline with `now + duration` rather than adding to it, so pressing the
//! button again mid-pause restarts the countdown from that moment.

use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use crate::traits::PauseInput;

pub struct PauseState {
    /// `None` until the first activation.
    paused_until: Option<Instant>,
    input: Box<dyn PauseInput>,
}

impl PauseState {
    pub fn new(input: Box<dyn PauseInput>) -> Self {
        Self {
            paused_until: None,
            input,
        }
    }

    /// Silence alerts for `duration` starting now, overwriting any existing
    /// window. Returns the new deadline.
    pub fn activate(&mut self, duration: Duration) -> Instant {
        let until = Instant::now() + duration;
        self.paused_until = Some(until);

        let wall_until = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d))
            .map(|t| t.to_rfc3339());
        tracing::info!(
            minutes = duration.as_secs_f64() / 60.0,
            until = wall_until.as_deref().unwrap_or("unknown"),
            "Alerts paused",
        );

        until
    }

    pub fn is_paused(&self) -> bool {
        self.paused_until
            .is_some_and(|until| Instant::now() < until)
    }

    /// Time left in the current window, zero when not paused.
    pub fn remaining(&self) -> Duration {
        self.paused_until
            .map(|until| until.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    /// Level state of the physical pause button.
    pub fn physical_input_active(&self) -> bool {
        self.input.pressed()
    }
}

impl std::fmt::Debug for PauseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PauseState")
            .field("paused_until", &self.paused_until)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::traits::NeverPressed;

    struct Button(Arc<AtomicBool>);

    impl PauseInput for Button {
        fn pressed(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn not_paused_initially() {
        let pause = PauseState::new(Box::new(NeverPressed));
        assert!(!pause.is_paused());
        assert_eq!(pause.remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn activate_then_expire() {
        let mut pause = PauseState::new(Box::new(NeverPressed));
        pause.activate(Duration::from_secs(120));
        assert!(pause.is_paused());

        tokio::time::advance(Duration::from_secs(119)).await;
        assert!(pause.is_paused());

        tokio::time::advance(Duration::from_millis(1001)).await;
        assert!(!pause.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn reactivation_replaces_rather_than_extends() {
        let mut pause = PauseState::new(Box::new(NeverPressed));
        pause.activate(Duration::from_secs(120));

        tokio::time::advance(Duration::from_secs(100)).await;
        pause.activate(Duration::from_secs(120));
        assert_eq!(pause.remaining(), Duration::from_secs(120));

        // Additive stacking would still be paused at 100 + 230.
        tokio::time::advance(Duration::from_secs(121)).await;
        assert!(!pause.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn window_past_calendar_range_still_activates() {
        // Beyond chrono's representable dates; only the log line degrades.
        let mut pause = PauseState::new(Box::new(NeverPressed));
        pause.activate(Duration::from_secs(10_000_000_000_000));
        assert!(pause.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn physical_input_is_level_state() {
        let flag = Arc::new(AtomicBool::new(false));
        let pause = PauseState::new(Box::new(Button(Arc::clone(&flag))));
        assert!(!pause.physical_input_active());

        flag.store(true, Ordering::SeqCst);
        assert!(pause.physical_input_active());
        assert!(pause.physical_input_active());
    }
}
