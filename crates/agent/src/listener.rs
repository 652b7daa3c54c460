//! UDP telemetry ingestion.
//!
//! The ESP32 sensor node pushes one `D1:<cm>,D2:<cm>` datagram roughly
//! every 100 ms. There is no acknowledgement or sequencing: each datagram
//! simply overwrites whichever fields it carries, and a dropped or garbled
//! one is corrected by the next.

use std::net::SocketAddr;
use std::time::Duration;

use forkwatch_core::config::MonitorConfig;
use forkwatch_core::telemetry::TelemetryWriter;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::error::AgentError;

/// Upper bound on a single receive, so shutdown is observed even on a
/// silent network.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Delay after a socket error before receiving again.
const RECV_ERROR_DELAY: Duration = Duration::from_millis(100);

const MAX_DATAGRAM: usize = 1024;

/// Resolve `udp_listen_host:udp_listen_port` from the config.
pub fn listen_addr(config: &MonitorConfig) -> Result<SocketAddr, AgentError> {
    let raw = format!("{}:{}", config.udp_listen_host, config.udp_listen_port);
    raw.parse().map_err(|_| AgentError::ListenAddress(raw))
}

pub struct TelemetryListener {
    socket: UdpSocket,
    writer: TelemetryWriter,
}

impl TelemetryListener {
    pub async fn bind(addr: SocketAddr, writer: TelemetryWriter) -> Result<Self, AgentError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| AgentError::Bind { addr, source })?;
        tracing::info!(addr = %addr, "Listening for telemetry");
        Ok(Self { socket, writer })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive datagrams until `cancel` fires.
    ///
    /// Socket errors are logged and receiving continues; only cancellation
    /// ends the loop.
    pub async fn run(self, cancel: CancellationToken) {
        let mut buf = [0u8; MAX_DATAGRAM];

        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                r = tokio::time::timeout(RECV_TIMEOUT, self.socket.recv_from(&mut buf)) => r,
            };

            match received {
                // Quiet link; loop to re-check cancellation.
                Err(_elapsed) => {}
                Ok(Ok((len, peer))) => {
                    let message = String::from_utf8_lossy(&buf[..len]);
                    let parsed = self.writer.ingest(&message);
                    if parsed.is_empty() {
                        tracing::debug!(%peer, raw = %message.trim(), "Telemetry datagram had no usable fields");
                    } else {
                        tracing::trace!(%peer, d1 = ?parsed.d1, d2 = ?parsed.d2, "Telemetry received");
                    }
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Telemetry receive error");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RECV_ERROR_DELAY) => {}
                    }
                }
            }
        }

        tracing::info!("Telemetry listener stopped");
    }
}
