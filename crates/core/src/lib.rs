//! `forkwatch-core` -- fork-height alert decision and timing engine.
//!
//! Holds everything that decides *whether* the horn sounds: telemetry
//! snapshots, the pause window, the inter-alert throttle and the
//! polling [`engine`]. Hardware and socket I/O live in `forkwatch-agent`
//! behind the capability traits in [`traits`].

pub mod config;
pub mod engine;
pub mod error;
pub mod pause;
pub mod status;
pub mod telemetry;
pub mod throttle;
pub mod traits;
