use std::io;
use thiserror::Error;

/// Main error type for upsocket
#[derive(Error, Debug)]
pub enum UpsocketError {
    /// WebSocket protocol or I/O error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The remote end refused the connection
    ///
    /// Expected while the server is down; the connection retries on its own
    /// and never publishes these.
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// Connection closed unexpectedly
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// A payload was handed to a transport that is not open
    #[error("Transport is not open")]
    NotOpen,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Channel send error
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Generic error
    #[error("Error: {0}")]
    Other(String),
}

impl UpsocketError {
    /// Whether this is a "connection refused"-class failure
    pub fn is_connection_refused(&self) -> bool {
        matches!(self, UpsocketError::ConnectionRefused(_))
    }
}

impl From<io::Error> for UpsocketError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => UpsocketError::ConnectionRefused(err.to_string()),
            _ => UpsocketError::WebSocket(err.to_string()),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for UpsocketError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match err {
            WsError::Io(io_err) => io_err.into(),
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                UpsocketError::ConnectionClosed(err.to_string())
            }
            other => UpsocketError::WebSocket(other.to_string()),
        }
    }
}

/// Result type for upsocket operations
pub type Result<T> = std::result::Result<T, UpsocketError>;
