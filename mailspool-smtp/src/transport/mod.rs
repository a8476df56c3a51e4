//! The seam between the spooler and the network.

mod memory;
mod smtp;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

pub use memory::{Delivery, MemoryTransport};
pub use smtp::{SmtpTimeouts, SmtpTransport};

use crate::{credentials::Credentials, error::DeliveryError};

/// Hands one rendered message to a relay.
///
/// Implementations own every network concern, timeouts included: a call that
/// never returns stalls the worker that made it.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Deliver `payload` from the envelope sender `from` to every address in
    /// `to`, authenticating with `credentials` when given, via `endpoint`
    /// (`host:port`).
    ///
    /// # Errors
    ///
    /// Any [`DeliveryError`]; the caller decides what to do with it.
    async fn deliver(
        &self,
        payload: &[u8],
        from: &str,
        to: &[String],
        credentials: Option<&Credentials>,
        endpoint: &str,
    ) -> Result<(), DeliveryError>;
}

/// Runtime selection of the transport.
///
/// SMTP relay in RON config:
/// ```ron
/// transport: Smtp((
///     helo: "mailer.example.com",
///     require_tls: true,
/// )),
/// ```
///
/// Record deliveries in memory instead of sending them:
/// ```ron
/// transport: Memory,
/// ```
#[derive(Debug, Clone, Deserialize)]
pub enum TransportConfig {
    Smtp(SmtpTransport),
    Memory,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Smtp(SmtpTransport::default())
    }
}

impl TransportConfig {
    #[must_use]
    pub fn into_transport(self) -> Arc<dyn Transport> {
        match self {
            Self::Smtp(transport) => Arc::new(transport),
            Self::Memory => Arc::new(MemoryTransport::new()),
        }
    }
}
