//! Spool outgoing mail and deliver it in the background.
//!
//! This crate re-exports the pieces most callers need:
//! - [`Email`] and [`Mailbox`] to compose messages, or your own [`Message`]
//! - [`Spooler`] and the process-wide default in [`global`]
//! - [`SmtpTransport`] and [`Credentials`] to reach a relay
//!
//! The member crates remain available as [`common`], [`smtp`] and [`spool`].

pub use mailspool_common as common;
pub use mailspool_smtp as smtp;
pub use mailspool_spool as spool;

pub use mailspool_common::{
    Email, EmailBuilder, Mailbox, MailboxList, MalformedMessageError, Message, RenderError,
    logging, render,
};
pub use mailspool_smtp::{
    AuthMechanism, Credentials, DeliveryError, MemoryTransport, SendError, SmtpTransport,
    Transport, TransportConfig, send,
};
pub use mailspool_spool::{
    ConfigError, DEFAULT_SPOOL_LENGTH, Spooler, SpoolerConfig, WorkerState, global,
};
