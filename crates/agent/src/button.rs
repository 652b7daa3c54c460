//! Pause button on a Raspberry Pi GPIO line.
//!
//! The button is wired between the GPIO line and ground with the internal
//! pull-up enabled (`gpio=17=ip,pu` in `config.txt`), so the line reads `0`
//! while pressed. The line is read through the sysfs GPIO interface.
//!
//! [`GpioButton::open`] spawns a sampler task that debounces the raw level
//! and publishes it through an atomic flag. [`PauseInput::pressed`] just
//! loads that flag, so the decision loop never touches the filesystem.
//!
//! GPIO access is **gracefully optional**: if the line cannot be exported
//! or read (not a Pi, no permissions), `open` returns an error which the
//! caller logs once before falling back to a button that is never pressed.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use forkwatch_core::traits::PauseInput;
use tokio_util::sync::CancellationToken;

use crate::error::AgentError;

pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// How often the raw line level is sampled.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(10);

/// Consecutive identical samples needed before a level change is accepted.
pub const DEBOUNCE_SAMPLES: u32 = 5;

/// Time for udev to apply permissions after exporting a line.
const EXPORT_SETTLE: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Debouncer
// ---------------------------------------------------------------------------

/// Level change accepted by the [`Debouncer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEdge {
    Pressed,
    Released,
}

/// Accepts a new level only after it has been seen `required` times in a
/// row.
#[derive(Debug)]
pub struct Debouncer {
    stable: bool,
    candidate: bool,
    count: u32,
    required: u32,
}

impl Debouncer {
    pub fn new(required: u32) -> Self {
        Self {
            stable: false,
            candidate: false,
            count: 0,
            required: required.max(1),
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.stable
    }

    /// Feed one raw sample. Returns the edge when the stable level flips.
    pub fn update(&mut self, raw_pressed: bool) -> Option<ButtonEdge> {
        if raw_pressed == self.stable {
            self.count = 0;
            return None;
        }

        if raw_pressed == self.candidate && self.count > 0 {
            self.count += 1;
        } else {
            self.candidate = raw_pressed;
            self.count = 1;
        }

        if self.count < self.required {
            return None;
        }

        self.stable = raw_pressed;
        self.count = 0;
        Some(if raw_pressed {
            ButtonEdge::Pressed
        } else {
            ButtonEdge::Released
        })
    }
}

// ---------------------------------------------------------------------------
// Sysfs line access
// ---------------------------------------------------------------------------

/// Find the sysfs number of BCM offset `offset`.
///
/// On a Pi 5 the RP1 header bank is not at base 0, so the base of the
/// `pinctrl-*` chip is added. Falls back to the raw offset when no such
/// chip is listed.
pub async fn resolve_line(root: &Path, offset: u32) -> u32 {
    let Ok(mut entries) = tokio::fs::read_dir(root).await else {
        return offset;
    };

    let mut best: Option<u32> = None;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_chip = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("gpiochip"));
        if !is_chip {
            continue;
        }

        let label = tokio::fs::read_to_string(path.join("label"))
            .await
            .unwrap_or_default();
        if !label.trim().starts_with("pinctrl") {
            continue;
        }
        let base = read_number(&path.join("base")).await;
        let ngpio = read_number(&path.join("ngpio")).await.unwrap_or(u32::MAX);

        if let Some(base) = base {
            if offset < ngpio && best.map_or(true, |b| base < b) {
                best = Some(base);
            }
        }
    }

    best.map_or(offset, |base| base + offset)
}

async fn read_number(path: &Path) -> Option<u32> {
    tokio::fs::read_to_string(path)
        .await
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
}

/// Parse a sysfs `value` file. Active-low: `0` means pressed.
pub fn parse_level(raw: &str) -> Option<bool> {
    match raw.trim() {
        "0" => Some(true),
        "1" => Some(false),
        _ => None,
    }
}

async fn export_line(root: &Path, line: u32) -> Result<PathBuf, AgentError> {
    let line_dir = root.join(format!("gpio{line}"));
    let gpio_err = |message: String| AgentError::Gpio { line, message };

    if !tokio::fs::try_exists(&line_dir).await.unwrap_or(false) {
        tokio::fs::write(root.join("export"), line.to_string())
            .await
            .map_err(|e| gpio_err(format!("export failed: {e}")))?;
        tokio::time::sleep(EXPORT_SETTLE).await;
    }

    tokio::fs::write(line_dir.join("direction"), "in")
        .await
        .map_err(|e| gpio_err(format!("setting direction failed: {e}")))?;

    Ok(line_dir.join("value"))
}

async fn read_level(value_path: &Path, line: u32) -> Result<bool, AgentError> {
    let raw = tokio::fs::read_to_string(value_path)
        .await
        .map_err(|e| AgentError::Gpio {
            line,
            message: format!("read failed: {e}"),
        })?;
    parse_level(&raw).ok_or_else(|| AgentError::Gpio {
        line,
        message: format!("unexpected value {:?}", raw.trim()),
    })
}

// ---------------------------------------------------------------------------
// GpioButton
// ---------------------------------------------------------------------------

/// Debounced pause button backed by a sysfs GPIO line.
#[derive(Debug, Clone)]
pub struct GpioButton {
    pressed: Arc<AtomicBool>,
}

impl GpioButton {
    /// Export BCM line `offset`, verify it can be read, and start sampling
    /// until `cancel` fires.
    pub async fn open(offset: u32, cancel: CancellationToken) -> Result<Self, AgentError> {
        Self::open_at(Path::new(SYSFS_GPIO_ROOT), offset, cancel).await
    }

    /// Same as [`open`](Self::open) against an arbitrary sysfs root.
    pub async fn open_at(
        root: &Path,
        offset: u32,
        cancel: CancellationToken,
    ) -> Result<Self, AgentError> {
        let line = resolve_line(root, offset).await;
        let value_path = export_line(root, line).await?;
        let initial = read_level(&value_path, line).await?;

        tracing::info!(gpio = offset, line, "Pause button initialised");

        let pressed = Arc::new(AtomicBool::new(false));
        let button = Self {
            pressed: Arc::clone(&pressed),
        };

        tokio::spawn(sample_loop(value_path, line, initial, pressed, cancel));
        Ok(button)
    }
}

impl PauseInput for GpioButton {
    fn pressed(&self) -> bool {
        self.pressed.load(Ordering::SeqCst)
    }
}

async fn sample_loop(
    value_path: PathBuf,
    line: u32,
    initial: bool,
    pressed: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let mut debouncer = Debouncer::new(DEBOUNCE_SAMPLES);
    debouncer.update(initial);
    let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
    let mut read_failing = false;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let raw = match read_level(&value_path, line).await {
            Ok(level) => {
                if read_failing {
                    tracing::info!(line, "Pause button readable again");
                    read_failing = false;
                }
                level
            }
            Err(e) => {
                if !read_failing {
                    tracing::error!(error = %e, "Pause button read failed -- treating as released");
                    read_failing = true;
                }
                false
            }
        };

        match debouncer.update(raw) {
            Some(ButtonEdge::Pressed) => tracing::info!(line, "Pause button pressed"),
            Some(ButtonEdge::Released) => tracing::debug!(line, "Pause button released"),
            None => {}
        }
        pressed.store(debouncer.is_pressed(), Ordering::SeqCst);
    }

    pressed.store(false, Ordering::SeqCst);
    tracing::debug!(line, "Pause button sampler stopped");
}
