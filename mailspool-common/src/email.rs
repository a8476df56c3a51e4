//! The owned, ready-made [`Message`] implementation.

use chrono::{DateTime, FixedOffset, Utc};

use crate::{
    address::{Mailbox, MailboxList},
    message::{BodyError, Message},
};

pub const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// A fully materialised email.
///
/// ```
/// use mailspool_common::{Email, Mailbox};
///
/// let email = Email::builder()
///     .from(Mailbox::with_name("Sender", "sender@example.com"))
///     .to(Mailbox::new("receiver@example.com"))
///     .subject("Hello")
///     .body("Hello world!")
///     .build();
///
/// assert_eq!(email.recipients().map(|to| to.len()), Some(1));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    from: Option<Mailbox>,
    to: Option<MailboxList>,
    subject: String,
    content_type: String,
    body: String,
    date: DateTime<FixedOffset>,
}

impl Email {
    #[must_use]
    pub fn builder() -> EmailBuilder {
        EmailBuilder::default()
    }

    #[must_use]
    pub const fn recipients(&self) -> Option<&MailboxList> {
        self.to.as_ref()
    }
}

impl Message for Email {
    fn from(&self) -> Option<&Mailbox> {
        self.from.as_ref()
    }

    fn to(&self) -> Option<&[Mailbox]> {
        self.to.as_deref().map(Vec::as_slice)
    }

    fn subject(&self) -> &str {
        &self.subject
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn body(&self) -> Result<String, BodyError> {
        Ok(self.body.clone())
    }

    fn date(&self) -> DateTime<FixedOffset> {
        self.date
    }
}

#[derive(Debug, Clone, Default)]
pub struct EmailBuilder {
    from: Option<Mailbox>,
    to: Option<Vec<Mailbox>>,
    subject: String,
    content_type: Option<String>,
    body: String,
    date: Option<DateTime<FixedOffset>>,
}

impl EmailBuilder {
    #[must_use]
    pub fn from(mut self, mailbox: Mailbox) -> Self {
        self.from = Some(mailbox);
        self
    }

    /// Add a recipient. A builder that never sees `to` or `recipients`
    /// produces an email without a recipient list.
    #[must_use]
    pub fn to(mut self, mailbox: Mailbox) -> Self {
        self.to.get_or_insert_with(Vec::new).push(mailbox);
        self
    }

    /// Replace the recipient list. An empty iterator yields an empty, but
    /// present, list.
    #[must_use]
    pub fn recipients(mut self, mailboxes: impl IntoIterator<Item = Mailbox>) -> Self {
        self.to = Some(mailboxes.into_iter().collect());
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Set an HTML body and switch the content type to match.
    #[must_use]
    pub fn html(self, body: impl Into<String>) -> Self {
        self.content_type(HTML_CONTENT_TYPE).body(body)
    }

    #[must_use]
    pub fn date(mut self, date: DateTime<FixedOffset>) -> Self {
        self.date = Some(date);
        self
    }

    /// Finish the email. Without an explicit [`EmailBuilder::date`] the
    /// current time is stamped here, once.
    #[must_use]
    pub fn build(self) -> Email {
        Email {
            from: self.from,
            to: self.to.map(MailboxList::from),
            subject: self.subject,
            content_type: self
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_owned()),
            body: self.body,
            date: self.date.unwrap_or_else(|| Utc::now().fixed_offset()),
        }
    }
}
