//! Error types for the arena server.

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Socket binding, accept or channel failures
    #[error("Network error: {0}")]
    Network(String),

    /// A peer connected but never completed the WebSocket upgrade
    #[error("WebSocket handshake failed: {0}")]
    Handshake(String),

    /// Rejected startup configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Network(err.to_string())
    }
}
