//! Shared building blocks for mailspool: the message capability consumed by
//! the spooler, mailbox formatting, the wire renderer and logging.

pub mod address;
pub mod email;
pub mod logging;
pub mod message;
pub mod render;

pub use tracing;

pub use address::{AddressError, Mailbox, MailboxList};
pub use email::{DEFAULT_CONTENT_TYPE, Email, EmailBuilder};
pub use message::{BodyError, Message};
pub use render::{
    HEADER_ORDER, MalformedMessageError, RenderError, addressing, format_date, render,
};
