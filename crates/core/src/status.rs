//! Periodic operator-facing status line.

use std::fmt;

use serde::Serialize;

/// Snapshot of the decision state at one poll. Produced for logging only;
/// nothing reads it back into the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatusReport {
    pub alert_latched: bool,
    pub distance_1_cm: f64,
    pub distance_2_cm: f64,
    pub effective_distance_cm: f64,
    pub paused: bool,
    pub data_fresh: bool,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.alert_latched { "[ALERT]" } else { "[OK]" };
        write!(
            f,
            "{state} D1={:6.1}cm D2={:6.1}cm Min={:6.1}cm",
            self.distance_1_cm, self.distance_2_cm, self.effective_distance_cm,
        )?;
        if self.paused {
            f.write_str(" [PAUSED]")?;
        }
        if self.data_fresh {
            f.write_str(" [Data OK]")
        } else {
            f.write_str(" [Data STALE]")
        }
    }
}
