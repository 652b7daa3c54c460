//! Latest distance telemetry shared between the ingestion task and the
//! decision loop.
//!
//! The store is a [`tokio::sync::watch`] channel: [`TelemetryWriter`] is the
//! single writer (the UDP listener), [`TelemetryReader`] the single reader
//! (the decision engine). Every read is a consistent snapshot of both
//! readings and the receive timestamp.
//!
//! # Wire format
//!
//! One UTF-8 line per datagram: `D1:<float>,D2:<float>`, optionally
//! followed by whitespace. Each field is independent -- a missing or
//! malformed field leaves the previous value in place.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;

/// Reading reported by a sensor that timed out or failed. Any non-positive
/// value is treated the same way.
pub const SENSOR_ERROR_CM: f64 = -1.0;

const FIELD_D1: &str = "D1";
const FIELD_D2: &str = "D2";

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Fields recovered from one telemetry line. `None` means "leave the prior
/// value unchanged".
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParsedReadings {
    pub d1: Option<f64>,
    pub d2: Option<f64>,
}

impl ParsedReadings {
    pub fn is_empty(&self) -> bool {
        self.d1.is_none() && self.d2.is_none()
    }
}

/// Parse a `D1:<float>,D2:<float>` line.
///
/// Never fails: unknown keys, missing separators and values that are not
/// finite floats are dropped field by field.
pub fn parse_packet(message: &str) -> ParsedReadings {
    let mut parsed = ParsedReadings::default();

    for field in message.trim().split(',') {
        let Some((key, value)) = field.split_once(':') else {
            continue;
        };
        let Some(value) = parse_distance(value) else {
            continue;
        };
        match key.trim() {
            FIELD_D1 => parsed.d1 = Some(value),
            FIELD_D2 => parsed.d2 = Some(value),
            _ => {}
        }
    }

    parsed
}

fn parse_distance(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

// ---------------------------------------------------------------------------
// TelemetrySample
// ---------------------------------------------------------------------------

/// Most recent readings from both sensors, in centimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    pub distance_1_cm: f64,
    pub distance_2_cm: f64,
    /// When the last datagram was received. `None` until the first one.
    pub last_update: Option<Instant>,
}

impl Default for TelemetrySample {
    fn default() -> Self {
        Self {
            distance_1_cm: 0.0,
            distance_2_cm: 0.0,
            last_update: None,
        }
    }
}

/// What the decision loop sees on each poll.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetryReading {
    pub distance_1_cm: f64,
    pub distance_2_cm: f64,
    /// Data was received within the freshness window.
    pub fresh: bool,
}

/// Create a connected writer/reader pair holding a zeroed sample.
pub fn channel(freshness_timeout: Duration) -> (TelemetryWriter, TelemetryReader) {
    let (tx, rx) = watch::channel(TelemetrySample::default());
    (
        TelemetryWriter { tx },
        TelemetryReader {
            rx,
            freshness_timeout,
        },
    )
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Ingestion side of the telemetry store.
#[derive(Debug)]
pub struct TelemetryWriter {
    tx: watch::Sender<TelemetrySample>,
}

impl TelemetryWriter {
    /// Record both readings and stamp the receive time.
    pub fn update(&self, distance_1_cm: f64, distance_2_cm: f64) {
        self.apply(ParsedReadings {
            d1: Some(distance_1_cm),
            d2: Some(distance_2_cm),
        });
    }

    /// Merge whichever fields are present and stamp the receive time.
    ///
    /// The timestamp moves even when no field parsed: a datagram arrived,
    /// so the link itself is alive.
    pub fn apply(&self, readings: ParsedReadings) {
        let now = Instant::now();
        self.tx.send_modify(|sample| {
            if let Some(d1) = readings.d1 {
                sample.distance_1_cm = d1;
            }
            if let Some(d2) = readings.d2 {
                sample.distance_2_cm = d2;
            }
            // Instant is monotonic, but keep the invariant explicit.
            sample.last_update = Some(match sample.last_update {
                Some(prev) if prev > now => prev,
                _ => now,
            });
        });
    }

    /// Parse one inbound line and merge it.
    pub fn ingest(&self, message: &str) -> ParsedReadings {
        let parsed = parse_packet(message);
        self.apply(parsed);
        parsed
    }

    pub fn snapshot(&self) -> TelemetrySample {
        *self.tx.borrow()
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Decision-loop side of the telemetry store.
#[derive(Debug, Clone)]
pub struct TelemetryReader {
    rx: watch::Receiver<TelemetrySample>,
    freshness_timeout: Duration,
}

impl TelemetryReader {
    /// Latest readings plus whether they arrived within the freshness window.
    pub fn read(&self) -> TelemetryReading {
        let sample = *self.rx.borrow();
        TelemetryReading {
            distance_1_cm: sample.distance_1_cm,
            distance_2_cm: sample.distance_2_cm,
            fresh: self.is_fresh(&sample, Instant::now()),
        }
    }

    fn is_fresh(&self, sample: &TelemetrySample, now: Instant) -> bool {
        sample
            .last_update
            .is_some_and(|at| now.saturating_duration_since(at) < self.freshness_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_fields() {
        let parsed = parse_packet("D1:45.3,D2:67.8");
        assert_eq!(parsed.d1, Some(45.3));
        assert_eq!(parsed.d2, Some(67.8));
    }

    #[test]
    fn tolerates_trailing_newline_and_spaces() {
        let parsed = parse_packet("D1: 12.0 , D2:-1.0\r\n");
        assert_eq!(parsed.d1, Some(12.0));
        assert_eq!(parsed.d2, Some(SENSOR_ERROR_CM));
    }

    #[test]
    fn missing_field_is_none() {
        let parsed = parse_packet("D1:45.3");
        assert_eq!(parsed.d1, Some(45.3));
        assert_eq!(parsed.d2, None);
    }

    #[test]
    fn malformed_field_does_not_spoil_the_other() {
        let parsed = parse_packet("D1:abc,D2:30.5");
        assert_eq!(parsed.d1, None);
        assert_eq!(parsed.d2, Some(30.5));
    }

    #[test]
    fn garbage_yields_nothing() {
        assert!(parse_packet("garbage").is_empty());
        assert!(parse_packet("").is_empty());
        assert!(parse_packet("D1:1:2,D3:4").is_empty());
    }

    #[test]
    fn non_finite_values_are_dropped() {
        assert!(parse_packet("D1:NaN,D2:inf").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_field_keeps_prior_value() {
        let (writer, reader) = channel(Duration::from_secs(2));
        writer.ingest("D1:45.3,D2:67.8");
        writer.ingest("D1:20.0");

        let reading = reader.read();
        assert_eq!(reading.distance_1_cm, 20.0);
        assert_eq!(reading.distance_2_cm, 67.8);
    }

    #[tokio::test(start_paused = true)]
    async fn garbage_leaves_values_unchanged() {
        let (writer, reader) = channel(Duration::from_secs(2));
        writer.update(45.3, 67.8);
        writer.ingest("garbage");

        let reading = reader.read();
        assert_eq!(reading.distance_1_cm, 45.3);
        assert_eq!(reading.distance_2_cm, 67.8);
    }

    #[tokio::test(start_paused = true)]
    async fn starts_zeroed_and_stale() {
        let (_writer, reader) = channel(Duration::from_secs(2));
        let reading = reader.read();
        assert_eq!(reading.distance_1_cm, 0.0);
        assert_eq!(reading.distance_2_cm, 0.0);
        assert!(!reading.fresh);
    }

    #[tokio::test(start_paused = true)]
    async fn freshness_expires_and_recovers() {
        let (writer, reader) = channel(Duration::from_secs(2));
        writer.update(100.0, 100.0);
        assert!(reader.read().fresh);

        tokio::time::advance(Duration::from_millis(1999)).await;
        assert!(reader.read().fresh);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!reader.read().fresh);

        writer.update(100.0, 100.0);
        assert!(reader.read().fresh);
    }

    #[tokio::test(start_paused = true)]
    async fn timestamp_never_moves_backwards() {
        let (writer, _reader) = channel(Duration::from_secs(2));
        writer.update(1.0, 1.0);
        let first = writer.snapshot().last_update.unwrap();

        tokio::time::advance(Duration::from_millis(50)).await;
        writer.ingest("garbage");
        let second = writer.snapshot().last_update.unwrap();
        assert!(second >= first);
    }
}
