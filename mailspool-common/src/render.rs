//! Serialise a [`Message`] into the bytes handed to a relay.
//!
//! The payload is a header block in a fixed order, a blank line and the body
//! exactly as the message produced it:
//!
//! ```text
//! From: "Sender" <sender@example.com>\r\n
//! To: "One" <one@example.com>, <two@example.com>\r\n
//! Subject: Hello\r\n
//! MIME-Version: 1.0\r\n
//! Content-Type: text/plain; charset=utf-8\r\n
//! Date: Sat, 29 Mar 2014 02:32:17 +0000\r\n
//! \r\n
//! <body>
//! ```

use std::fmt::Write;

use chrono::{DateTime, FixedOffset};
use thiserror::Error;

use crate::{
    address::{AddressError, Joined, Mailbox},
    message::{BodyError, Message},
};

/// Header names in the order they are emitted.
pub const HEADER_ORDER: [&str; 6] = [
    "From",
    "To",
    "Subject",
    "MIME-Version",
    "Content-Type",
    "Date",
];

const MIME_VERSION: &str = "1.0";

/// The message is missing addressing it cannot be sent without, or carries
/// an address that cannot go on the wire.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedMessageError {
    #[error("message has no sender")]
    MissingFrom,

    #[error("message has no recipient list")]
    MissingTo,

    #[error("message has an unusable address: {0}")]
    InvalidAddress(#[from] AddressError),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] MalformedMessageError),

    /// The body producer failed; this is its error, untouched.
    #[error(transparent)]
    Body(BodyError),
}

impl RenderError {
    /// Recover the body producer's error, if that is what failed.
    ///
    /// # Errors
    ///
    /// Hands `self` back when this is not a body failure.
    pub fn into_body_error(self) -> Result<BodyError, Self> {
        match self {
            Self::Body(error) => Ok(error),
            other => Err(other),
        }
    }
}

/// RFC 1123 with a numeric zone, e.g. `Mon, 02 Jan 2006 15:04:05 -0700`.
#[must_use]
pub fn format_date(date: &DateTime<FixedOffset>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S %z").to_string()
}

/// The sender and recipients of `message`, each address checked.
///
/// # Errors
///
/// [`MalformedMessageError`] when either is absent or any address fails
/// [`Mailbox::validate`].
pub fn addressing<M: Message + ?Sized>(
    message: &M,
) -> Result<(&Mailbox, &[Mailbox]), MalformedMessageError> {
    let from = message.from().ok_or(MalformedMessageError::MissingFrom)?;
    let to = message.to().ok_or(MalformedMessageError::MissingTo)?;

    from.validate()?;
    for mailbox in to {
        mailbox.validate()?;
    }

    Ok((from, to))
}

/// Render `message` into its wire form.
///
/// Sender and recipients are checked before the body is produced.
///
/// # Errors
///
/// [`RenderError::Malformed`] when the sender or the recipient list is
/// absent or holds an unusable address, [`RenderError::Body`] carrying the
/// body producer's own error.
pub fn render<M: Message + ?Sized>(message: &M) -> Result<Vec<u8>, RenderError> {
    let (from, to) = addressing(message)?;

    let body = message.body().map_err(RenderError::Body)?;

    let values = [
        from.to_string(),
        Joined(to).to_string(),
        message.subject().to_owned(),
        MIME_VERSION.to_owned(),
        message.content_type().to_owned(),
        format_date(&message.date()),
    ];

    let mut payload = String::with_capacity(body.len() + 256);
    for (name, value) in HEADER_ORDER.iter().zip(values) {
        // Writing into a String cannot fail
        let _ = write!(payload, "{name}: {value}\r\n");
    }
    payload.push_str("\r\n");
    payload.push_str(&body);

    Ok(payload.into_bytes())
}
