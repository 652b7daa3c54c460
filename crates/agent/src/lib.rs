//! `forkwatch-agent` library crate.
//!
//! Hardware and network collaborators for the fork-height monitor. The
//! binary entrypoint lives in `main.rs`; modules are re-exported here for
//! integration testing.

pub mod button;
pub mod error;
pub mod horn;
pub mod listener;
pub mod shutdown;
