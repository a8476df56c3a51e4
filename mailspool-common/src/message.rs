use std::fmt::Debug;

use chrono::{DateTime, FixedOffset};

use crate::address::Mailbox;

/// Error produced by a message's body. It travels back to the caller
/// exactly as the body producer returned it.
pub type BodyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Anything the spooler can deliver.
///
/// Implementors produce the sender, the recipients and the body on demand;
/// nothing here is allowed to change once the message has been spooled.
/// `None` from [`Message::from`] or [`Message::to`] marks the field as absent,
/// which the renderer rejects. An empty recipient slice is *present*.
pub trait Message: Send + Sync + Debug {
    fn from(&self) -> Option<&Mailbox>;

    fn to(&self) -> Option<&[Mailbox]>;

    fn subject(&self) -> &str;

    fn content_type(&self) -> &str;

    /// Produce the body. Called at most once per render.
    ///
    /// # Errors
    ///
    /// Whatever the implementation's body generation fails with.
    fn body(&self) -> Result<String, BodyError>;

    /// When the message was composed. Stamped once, never the render time.
    fn date(&self) -> DateTime<FixedOffset>;
}

impl<M: Message + ?Sized> Message for Box<M> {
    fn from(&self) -> Option<&Mailbox> {
        (**self).from()
    }

    fn to(&self) -> Option<&[Mailbox]> {
        (**self).to()
    }

    fn subject(&self) -> &str {
        (**self).subject()
    }

    fn content_type(&self) -> &str {
        (**self).content_type()
    }

    fn body(&self) -> Result<String, BodyError> {
        (**self).body()
    }

    fn date(&self) -> DateTime<FixedOffset> {
        (**self).date()
    }
}
