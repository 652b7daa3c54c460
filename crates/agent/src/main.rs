//! `forkwatch-agent` -- forklift fork-height warning daemon.
//!
//! Runs on the Raspberry Pi at the workbench. Receives distance telemetry
//! from the ESP32 sensor node over UDP, sounds the horn through the USB
//! audio adapter when the forks drop below the threshold, and honours the
//! pause button.
//!
//! # Configuration
//!
//! The JSON config path is taken from, in order: the first CLI argument,
//! `FORKWATCH_CONFIG`, then `/etc/forkwatch/config.json`. A missing file
//! runs on defaults. Log filtering follows `RUST_LOG`.

use std::path::PathBuf;
use std::time::Duration;

use forkwatch_agent::button::GpioButton;
use forkwatch_agent::horn::AudioHorn;
use forkwatch_agent::listener::{self, TelemetryListener};
use forkwatch_agent::shutdown;
use forkwatch_core::config::{MonitorConfig, DEFAULT_CONFIG_PATH};
use forkwatch_core::engine::{DecisionEngine, EngineSettings};
use forkwatch_core::pause::PauseState;
use forkwatch_core::telemetry;
use forkwatch_core::traits::{NeverPressed, PauseInput};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long each task gets to wind down after cancellation.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forkwatch_agent=info,forkwatch_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path: PathBuf = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("FORKWATCH_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
        .into();

    let config = MonitorConfig::load(&config_path).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Cannot start without a usable configuration");
        std::process::exit(1);
    });

    tracing::info!(
        udp_port = config.udp_listen_port,
        threshold_cm = config.distance_threshold_cm,
        pause_secs = config.pause_duration_seconds,
        alert_wav = %config.alert_wav_path,
        pause_gpio = config.pause_button_gpio,
        min_alert_interval_secs = config.min_interval_between_alerts_sec,
        "Starting forkwatch-agent",
    );

    let cancel = CancellationToken::new();

    // --- Telemetry ---
    let (writer, reader) = telemetry::channel(config.freshness_timeout());

    let addr = listener::listen_addr(&config).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid telemetry listen address");
        std::process::exit(1);
    });
    let telemetry_listener = TelemetryListener::bind(addr, writer)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Cannot start telemetry listener");
            std::process::exit(1);
        });

    // --- Pause button ---
    let pause_input: Box<dyn PauseInput> =
        match GpioButton::open(config.pause_button_gpio, cancel.clone()).await {
            Ok(button) => Box::new(button),
            Err(e) => {
                tracing::warn!(error = %e, "Pause button unavailable -- pausing disabled");
                Box::new(NeverPressed)
            }
        };

    // --- Decision engine ---
    let horn = AudioHorn::from_config(&config);
    let mut engine = DecisionEngine::new(
        EngineSettings::from(&config),
        reader,
        PauseState::new(pause_input),
        horn,
    );

    if config.startup_self_test {
        engine.self_test();
    }

    let listener_handle = tokio::spawn(telemetry_listener.run(cancel.clone()));
    let engine_handle = tokio::spawn(engine.run(cancel.clone()));

    tracing::info!("System ready -- monitoring forks");

    let signal = shutdown::shutdown_signal().await;
    cancel.cancel();

    if tokio::time::timeout(SHUTDOWN_GRACE, listener_handle).await.is_err() {
        tracing::warn!("Telemetry listener did not stop in time");
    }
    if tokio::time::timeout(SHUTDOWN_GRACE, engine_handle).await.is_err() {
        tracing::warn!("Decision loop did not stop in time");
    }

    tracing::info!(%signal, "forkwatch-agent stopped");
}
