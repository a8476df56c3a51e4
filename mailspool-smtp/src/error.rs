//! Errors raised while handing a payload to a relay.

use std::io;

use thiserror::Error;

/// Everything that can go wrong during a single delivery.
///
/// The spooler never inspects these beyond logging them; they are classified
/// only so log lines can say whether trying again later might help.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// No endpoint has been configured.
    #[error("No relay endpoint configured")]
    NoEndpoint,

    /// The message has an empty recipient list.
    #[error("Message has no recipients")]
    NoRecipients,

    /// Failed to establish the TCP connection.
    #[error("Failed to connect to {endpoint}: {source}")]
    Connection {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// IO error on an established connection.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The peer went away mid-conversation.
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// A step did not complete within its configured timeout.
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    /// TLS was required but unavailable, or the handshake failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The server answered a command with an unexpected status.
    #[error("{stage} rejected: {code} {message}")]
    Rejected {
        stage: &'static str,
        code: u16,
        message: String,
    },

    /// Authentication was refused or could not be attempted.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The server's reply could not be understood.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl DeliveryError {
    /// Whether the same delivery could plausibly succeed later.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::Io(_) | Self::ConnectionClosed | Self::Timeout(_) => {
                true
            }
            Self::Rejected { code, .. } => *code >= 400 && *code < 500,
            Self::NoEndpoint
            | Self::NoRecipients
            | Self::Tls(_)
            | Self::Authentication(_)
            | Self::Protocol(_) => false,
        }
    }
}

impl From<std::str::Utf8Error> for DeliveryError {
    fn from(e: std::str::Utf8Error) -> Self {
        Self::Protocol(format!("Reply is not valid UTF-8: {e}"))
    }
}
