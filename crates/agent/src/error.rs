use std::net::SocketAddr;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Failed to bind telemetry socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("Invalid listen address '{0}'")]
    ListenAddress(String),

    #[error("GPIO {line} unavailable: {message}")]
    Gpio { line: u32, message: String },

    #[error("Audio playback failed: {0}")]
    Audio(String),
}
