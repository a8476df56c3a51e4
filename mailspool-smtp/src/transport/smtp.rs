use std::{future::Future, net::IpAddr, time::Duration};

use async_trait::async_trait;
use mailspool_common::{internal, tracing};
use serde::Deserialize;

use super::Transport;
use crate::{
    client::{Response, SmtpClient},
    credentials::Credentials,
    error::DeliveryError,
};

const fn default_connect_timeout() -> u64 {
    30
}

const fn default_command_timeout() -> u64 {
    30
}

const fn default_data_timeout() -> u64 {
    120
}

fn default_helo() -> String {
    "localhost".to_string()
}

/// Per-step timeouts, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpTimeouts {
    /// TCP connection establishment
    ///
    /// Default: 30 seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_secs: u64,

    /// Any single command and its reply, the greeting and TLS handshake
    /// included
    ///
    /// Default: 30 seconds
    #[serde(default = "default_command_timeout")]
    pub command_secs: u64,

    /// Message transmission after DATA, up to the final reply
    ///
    /// Default: 120 seconds
    #[serde(default = "default_data_timeout")]
    pub data_secs: u64,
}

impl Default for SmtpTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_timeout(),
            command_secs: default_command_timeout(),
            data_secs: default_data_timeout(),
        }
    }
}

impl SmtpTimeouts {
    #[must_use]
    pub const fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    #[must_use]
    pub const fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    #[must_use]
    pub const fn data(&self) -> Duration {
        Duration::from_secs(self.data_secs)
    }
}

/// Delivers through a single SMTP relay.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpTransport {
    /// Name we introduce ourselves with in EHLO/HELO
    #[serde(default = "default_helo")]
    pub helo: String,

    /// Fail the delivery if the relay does not offer STARTTLS
    #[serde(default)]
    pub require_tls: bool,

    /// Accept any certificate after STARTTLS (testing only)
    #[serde(default)]
    pub accept_invalid_certs: bool,

    #[serde(default)]
    pub timeouts: SmtpTimeouts,
}

impl Default for SmtpTransport {
    fn default() -> Self {
        Self {
            helo: default_helo(),
            require_tls: false,
            accept_invalid_certs: false,
            timeouts: SmtpTimeouts::default(),
        }
    }
}

/// Host part of `host:port`, without IPv6 brackets.
fn host_of(endpoint: &str) -> &str {
    endpoint
        .rsplit_once(':')
        .map_or(endpoint, |(host, _)| host)
        .trim_start_matches('[')
        .trim_end_matches(']')
}

fn is_loopback(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost")
        || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

/// Run one protocol step under a deadline.
async fn step<T>(
    stage: &'static str,
    limit: Duration,
    future: impl Future<Output = Result<T, DeliveryError>> + Send,
) -> Result<T, DeliveryError> {
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| DeliveryError::Timeout(stage))?
}

fn expect(
    stage: &'static str,
    response: Response,
    accept: fn(&Response) -> bool,
) -> Result<Response, DeliveryError> {
    if accept(&response) {
        Ok(response)
    } else {
        Err(DeliveryError::Rejected {
            stage,
            code: response.code,
            message: response.message(),
        })
    }
}

impl SmtpTransport {
    /// EHLO, falling back to HELO for servers that refuse it.
    async fn hello(&self, client: &mut SmtpClient) -> Result<Response, DeliveryError> {
        let limit = self.timeouts.command();
        let response = step("EHLO", limit, client.ehlo(&self.helo)).await?;
        if response.is_success() {
            return Ok(response);
        }

        internal!(
            level = DEBUG,
            "EHLO refused with {}, falling back to HELO",
            response.code
        );
        let response = step("HELO", limit, client.helo(&self.helo)).await?;
        expect("HELO", response, Response::is_success)
    }

    async fn transaction(
        &self,
        client: &mut SmtpClient,
        host: &str,
        payload: &[u8],
        from: &str,
        to: &[String],
        credentials: Option<&Credentials>,
    ) -> Result<(), DeliveryError> {
        let limit = self.timeouts.command();

        let greeting = step("greeting", limit, client.read_greeting()).await?;
        expect("greeting", greeting, Response::is_success)?;

        let mut capabilities = self.hello(client).await?;

        if !client.is_tls() {
            if capabilities.has_capability("STARTTLS") {
                let response = step("STARTTLS", limit, client.starttls()).await?;
                if response.is_success() {
                    capabilities = self.hello(client).await?;
                } else if self.require_tls {
                    return Err(DeliveryError::Tls(format!(
                        "STARTTLS refused: {} {}",
                        response.code,
                        response.message()
                    )));
                }
            } else if self.require_tls {
                return Err(DeliveryError::Tls(
                    "Relay does not offer STARTTLS".to_string(),
                ));
            }
        }

        if let Some(credentials) = credentials {
            if !client.is_tls() && !is_loopback(host) {
                return Err(DeliveryError::Authentication(
                    "Refusing to send credentials over an unencrypted connection".to_string(),
                ));
            }

            let keyword = credentials.mechanism.keyword();
            match capabilities.capability("AUTH") {
                None => {
                    return Err(DeliveryError::Authentication(
                        "Relay does not support AUTH".to_string(),
                    ));
                }
                Some(mechanisms)
                    if !mechanisms
                        .iter()
                        .any(|mechanism| mechanism.eq_ignore_ascii_case(keyword)) =>
                {
                    return Err(DeliveryError::Authentication(format!(
                        "Relay does not offer AUTH {keyword}"
                    )));
                }
                Some(_) => {}
            }

            step("AUTH", limit, client.authenticate(credentials)).await?;
        }

        let response = step("MAIL FROM", limit, client.mail_from(from)).await?;
        expect("MAIL FROM", response, Response::is_success)?;

        for recipient in to {
            let response = step("RCPT TO", limit, client.rcpt_to(recipient)).await?;
            expect("RCPT TO", response, Response::is_success)?;
        }

        let response = step("DATA", limit, client.data()).await?;
        expect("DATA", response, |response| response.code == 354)?;

        let response = step("message data", self.timeouts.data(), client.send_data(payload)).await?;
        expect("message data", response, Response::is_success)?;

        Ok(())
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn deliver(
        &self,
        payload: &[u8],
        from: &str,
        to: &[String],
        credentials: Option<&Credentials>,
        endpoint: &str,
    ) -> Result<(), DeliveryError> {
        if endpoint.is_empty() {
            return Err(DeliveryError::NoEndpoint);
        }
        if to.is_empty() {
            return Err(DeliveryError::NoRecipients);
        }

        if self.accept_invalid_certs {
            tracing::warn!(
                endpoint,
                "SECURITY WARNING: TLS certificate validation is disabled for this relay"
            );
        }

        let host = host_of(endpoint);
        let mut client = step(
            "connect",
            self.timeouts.connect(),
            SmtpClient::connect(endpoint, host),
        )
        .await?
        .accept_invalid_certs(self.accept_invalid_certs);

        let result = self
            .transaction(&mut client, host, payload, from, to, credentials)
            .await;

        // The message is either accepted or failed by now; QUIT is a courtesy
        let connection_lost = matches!(
            result,
            Err(DeliveryError::Timeout(_) | DeliveryError::ConnectionClosed | DeliveryError::Io(_))
        );
        if !connection_lost {
            if let Err(e) = step("QUIT", self.timeouts.command(), client.quit()).await {
                internal!(level = DEBUG, "QUIT to {endpoint} failed: {e}");
            }
        }

        if result.is_ok() {
            internal!(
                level = DEBUG,
                "Relay {endpoint} accepted message from <{from}> for {} recipient(s)",
                to.len()
            );
        }

        result
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn host_parsing() {
        assert_eq!(host_of("smtp.example.com:587"), "smtp.example.com");
        assert_eq!(host_of("[::1]:25"), "::1");
        assert_eq!(host_of("localhost"), "localhost");
        assert!(is_loopback("localhost"));
        assert!(is_loopback("127.0.0.1"));
        assert!(is_loopback("::1"));
        assert!(!is_loopback("smtp.example.com"));
    }

    #[test]
    fn deserialize_with_defaults() {
        let transport: SmtpTransport =
            ron::from_str("(helo: \"mailer.example.com\", timeouts: (data_secs: 5))").unwrap();

        assert_eq!(transport.helo, "mailer.example.com");
        assert!(!transport.require_tls);
        assert_eq!(transport.timeouts.data(), Duration::from_secs(5));
        assert_eq!(transport.timeouts.connect(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn refuses_before_any_network_io() {
        let transport = SmtpTransport::default();

        assert!(matches!(
            transport
                .deliver(b"x", "a@example.com", &["b@example.com".to_string()], None, "")
                .await,
            Err(DeliveryError::NoEndpoint)
        ));
        assert!(matches!(
            transport
                .deliver(b"x", "a@example.com", &[], None, "192.0.2.1:25")
                .await,
            Err(DeliveryError::NoRecipients)
        ));
    }
}
