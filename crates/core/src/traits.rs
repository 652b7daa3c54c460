//! Capability seams between the decision core and the hardware.
//!
//! The engine only ever talks to the horn and the pause button through
//! these traits, so tests drive it with in-memory fakes.

/// Something that can sound the horn.
pub trait AlertAction: Send {
    /// Request one horn activation.
    ///
    /// Fire-and-forget: implementations must return promptly and report
    /// failure (throttled, missing sound file, player error) as `false`
    /// rather than panicking or blocking the caller.
    fn play(&mut self) -> bool;
}

/// Instantaneous, debounced state of the physical pause input.
pub trait PauseInput: Send + Sync {
    /// `true` while the button is held down (level, not edge).
    fn pressed(&self) -> bool;
}

/// Pause input used when the button hardware is unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverPressed;

impl PauseInput for NeverPressed {
    fn pressed(&self) -> bool {
        false
    }
}
