use std::fmt;

use base64::{Engine, prelude::BASE64_STANDARD};
use serde::Deserialize;

/// SASL mechanism used for `AUTH`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum AuthMechanism {
    #[default]
    Plain,
    Login,
}

impl AuthMechanism {
    /// The keyword as advertised in the EHLO `AUTH` capability.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
        }
    }
}

/// Username and password presented to the relay.
///
/// ```ron
/// credentials: Some((
///     username: "mailer",
///     password: "hunter2",
///     mechanism: Login,
/// )),
/// ```
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub mechanism: AuthMechanism,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            mechanism: AuthMechanism::default(),
        }
    }

    #[must_use]
    pub const fn with_mechanism(mut self, mechanism: AuthMechanism) -> Self {
        self.mechanism = mechanism;
        self
    }

    /// The RFC 4616 initial response: `base64("\0" username "\0" password)`.
    #[must_use]
    pub fn plain_response(&self) -> String {
        BASE64_STANDARD.encode(format!("\0{}\0{}", self.username, self.password))
    }

    #[must_use]
    pub fn login_username(&self) -> String {
        BASE64_STANDARD.encode(&self.username)
    }

    #[must_use]
    pub fn login_password(&self) -> String {
        BASE64_STANDARD.encode(&self.password)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .field("mechanism", &self.mechanism)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn plain_response_encoding() {
        let credentials = Credentials::new("user", "pass");
        assert_eq!(credentials.plain_response(), "AHVzZXIAcGFzcw==");
    }

    #[test]
    fn login_encoding() {
        let credentials = Credentials::new("user", "pass").with_mechanism(AuthMechanism::Login);
        assert_eq!(credentials.login_username(), "dXNlcg==");
        assert_eq!(credentials.login_password(), "cGFzcw==");
        assert_eq!(credentials.mechanism.keyword(), "LOGIN");
    }

    #[test]
    fn debug_hides_password() {
        let rendered = format!("{:?}", Credentials::new("user", "hunter2"));
        assert!(rendered.contains("user"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn deserialize_defaults_to_plain() {
        let credentials: Credentials =
            ron::from_str(r#"(username: "user", password: "pass")"#).unwrap();
        assert_eq!(credentials.mechanism, AuthMechanism::Plain);
    }
}
