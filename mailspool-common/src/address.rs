use std::{
    fmt::{self, Display, Write},
    ops::{Deref, DerefMut},
    str::FromStr,
};

use base64::{Engine, prelude::BASE64_STANDARD};
use thiserror::Error;

/// Reasons a mailbox string can be rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Empty address")]
    Empty,

    #[error("Address is missing an '@': {0}")]
    MissingAt(String),

    #[error("Address contains an invalid character: {0}")]
    InvalidCharacter(String),

    #[error("Unbalanced angle brackets: {0}")]
    Unbalanced(String),
}

/// A single mailbox: an optional display name and a bare `local@domain`
/// address.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Mailbox {
    name: Option<String>,
    address: String,
}

impl Mailbox {
    /// A mailbox without a display name.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            name: None,
            address: address.into(),
        }
    }

    pub fn with_name(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            address: address.into(),
        }
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.is_empty())
    }

    /// The bare address, as used on the SMTP envelope.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Check the address the way [`FromStr`] does. [`Mailbox::new`] and
    /// [`Mailbox::with_name`] take it as given.
    ///
    /// # Errors
    ///
    /// The first problem found with the address.
    pub fn validate(&self) -> Result<(), AddressError> {
        validate(&self.address)
    }
}

/// Display names that can go out inside a quoted-string untouched.
fn is_quotable(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii() && (c == ' ' || c == '\t' || c.is_ascii_graphic()))
}

impl Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            None => write!(f, "<{}>", self.address),
            Some(name) if is_quotable(name) => {
                f.write_char('"')?;
                for c in name.chars() {
                    if matches!(c, '"' | '\\') {
                        f.write_char('\\')?;
                    }
                    f.write_char(c)?;
                }
                write!(f, "\" <{}>", self.address)
            }
            // RFC 2047 encoded-word, which also keeps CR/LF out of the header
            Some(name) => write!(
                f,
                "=?utf-8?b?{}?= <{}>",
                BASE64_STANDARD.encode(name),
                self.address
            ),
        }
    }
}

fn validate(address: &str) -> Result<(), AddressError> {
    if address.is_empty() {
        return Err(AddressError::Empty);
    }

    if address
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '<' | '>' | ','))
    {
        return Err(AddressError::InvalidCharacter(address.to_owned()));
    }

    match address.rsplit_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(AddressError::MissingAt(address.to_owned())),
    }
}

impl FromStr for Mailbox {
    type Err = AddressError;

    /// Accepts `local@domain`, `<local@domain>`, `Name <local@domain>` and
    /// `"Name" <local@domain>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let (name, address) = match (s.rfind('<'), s.ends_with('>')) {
            (Some(open), true) => {
                let name = s[..open].trim();
                let name = name
                    .strip_prefix('"')
                    .and_then(|n| n.strip_suffix('"'))
                    .unwrap_or(name)
                    .replace("\\\"", "\"")
                    .replace("\\\\", "\\");
                (
                    Some(name).filter(|n| !n.is_empty()),
                    s[open + 1..s.len() - 1].trim(),
                )
            }
            (None, false) => (None, s),
            _ => return Err(AddressError::Unbalanced(s.to_owned())),
        };

        validate(address)?;

        Ok(Self {
            name,
            address: address.to_owned(),
        })
    }
}

/// Borrowed view over a run of mailboxes, formatted as a header value.
pub(crate) struct Joined<'a>(pub &'a [Mailbox]);

impl Display for Joined<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, mailbox) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            Display::fmt(mailbox, f)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MailboxList(pub Vec<Mailbox>);

impl MailboxList {
    /// Bare addresses in order, for the SMTP envelope.
    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(Mailbox::address)
    }
}

impl Display for MailboxList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&Joined(&self.0), f)
    }
}

impl From<Vec<Mailbox>> for MailboxList {
    fn from(value: Vec<Mailbox>) -> Self {
        Self(value)
    }
}

impl FromIterator<Mailbox> for MailboxList {
    fn from_iter<T: IntoIterator<Item = Mailbox>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Deref for MailboxList {
    type Target = Vec<Mailbox>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for MailboxList {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn display_without_name() {
        assert_eq!(
            Mailbox::new("test1@example.com").to_string(),
            "<test1@example.com>"
        );
        assert_eq!(
            Mailbox::with_name("", "test1@example.com").to_string(),
            "<test1@example.com>"
        );
    }

    #[test]
    fn display_quotes_names() {
        assert_eq!(
            Mailbox::with_name("Test One", "test1@example.com").to_string(),
            "\"Test One\" <test1@example.com>"
        );
        assert_eq!(
            Mailbox::with_name("Say \"hi\"", "a@b.c").to_string(),
            "\"Say \\\"hi\\\"\" <a@b.c>"
        );
    }

    #[test]
    fn display_encodes_non_ascii_and_control_characters() {
        assert_eq!(
            Mailbox::with_name("Zoë", "z@example.com").to_string(),
            "=?utf-8?b?Wm/Dqw==?= <z@example.com>"
        );
        assert!(
            Mailbox::with_name("Evil\r\nBcc: x@y.z", "e@example.com")
                .to_string()
                .starts_with("=?utf-8?b?")
        );
    }

    #[test]
    fn parse_forms() {
        assert_eq!(
            "test@example.com".parse::<Mailbox>().unwrap(),
            Mailbox::new("test@example.com")
        );
        assert_eq!(
            "<test@example.com>".parse::<Mailbox>().unwrap(),
            Mailbox::new("test@example.com")
        );
        assert_eq!(
            "Test Person <test@example.com>".parse::<Mailbox>().unwrap(),
            Mailbox::with_name("Test Person", "test@example.com")
        );
        assert_eq!(
            "\"Person, Test\" <test@example.com>"
                .parse::<Mailbox>()
                .unwrap(),
            Mailbox::with_name("Person, Test", "test@example.com")
        );
    }

    #[test]
    fn parse_round_trips_display() {
        let mailbox = Mailbox::with_name("Say \"hi\"", "a@b.c");
        assert_eq!(mailbox.to_string().parse::<Mailbox>().unwrap(), mailbox);
    }

    #[test]
    fn parse_rejects() {
        assert_eq!("".parse::<Mailbox>(), Err(AddressError::Empty));
        assert!(matches!(
            "no-at-sign".parse::<Mailbox>(),
            Err(AddressError::MissingAt(_))
        ));
        assert!(matches!(
            "@example.com".parse::<Mailbox>(),
            Err(AddressError::MissingAt(_))
        ));
        assert!(matches!(
            "a b@example.com".parse::<Mailbox>(),
            Err(AddressError::InvalidCharacter(_))
        ));
        assert!(matches!(
            "Name <a@example.com".parse::<Mailbox>(),
            Err(AddressError::Unbalanced(_))
        ));
    }

    #[test]
    fn constructed_mailboxes_validate_on_request() {
        assert_eq!(Mailbox::new("a@example.com").validate(), Ok(()));
        assert!(matches!(
            Mailbox::new("a@example.com>\r\nDATA").validate(),
            Err(AddressError::InvalidCharacter(_))
        ));
        assert!(matches!(
            Mailbox::with_name("Name", "nobody").validate(),
            Err(AddressError::MissingAt(_))
        ));
    }

    #[test]
    fn list_separators() {
        let one = Mailbox::with_name("One", "one@example.com");
        let two = Mailbox::new("two@example.com");
        let three = Mailbox::with_name("Three", "three@example.com");

        assert_eq!(MailboxList::default().to_string(), "");
        assert_eq!(
            MailboxList::from(vec![one.clone()]).to_string(),
            "\"One\" <one@example.com>"
        );

        let list = MailboxList::from(vec![one, two, three]);
        let rendered = list.to_string();
        assert_eq!(
            rendered,
            "\"One\" <one@example.com>, <two@example.com>, \"Three\" <three@example.com>"
        );
        assert_eq!(rendered.matches(", ").count(), 2);
        assert_eq!(
            list.addresses().collect::<Vec<_>>(),
            ["one@example.com", "two@example.com", "three@example.com"]
        );
    }
}
