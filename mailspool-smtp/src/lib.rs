//! Delivery side of mailspool.
//!
//! This crate provides:
//! - A small SMTP client (plain TCP, STARTTLS, AUTH PLAIN/LOGIN)
//! - The [`Transport`] seam the spooler delivers through, with an SMTP and an
//!   in-memory implementation
//! - [`send`], which renders and delivers a single message immediately

pub mod client;
mod credentials;
mod error;
mod send;
pub mod transport;

pub use credentials::{AuthMechanism, Credentials};
pub use error::DeliveryError;
pub use send::{SendError, envelope, send};
pub use transport::{
    Delivery, MemoryTransport, SmtpTimeouts, SmtpTransport, Transport, TransportConfig,
};
