//! SMTP client connection with STARTTLS and AUTH support.

use std::sync::Arc;

use mailspool_common::{incoming, outgoing, tracing};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::{
    TlsConnector,
    rustls::{ClientConfig, RootCertStore, pki_types::ServerName},
};

use super::response::Response;
use crate::{
    credentials::{AuthMechanism, Credentials},
    error::DeliveryError,
};

type Result<T> = std::result::Result<T, DeliveryError>;

/// Initial size of the read buffer for SMTP replies.
const BUFFER_SIZE: usize = 8192;

/// Upper bound on a single reply, to stop a hostile server growing the buffer forever.
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

enum ClientConnection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl ClientConnection {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.write_all(data).await?,
            Self::Tls(stream) => stream.write_all(data).await?,
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.flush().await?,
            Self::Tls(stream) => stream.flush().await?,
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self {
            Self::Plain(stream) => stream.read(buf).await?,
            Self::Tls(stream) => stream.read(buf).await?,
        };
        if n == 0 {
            return Err(DeliveryError::ConnectionClosed);
        }
        Ok(n)
    }

    async fn upgrade_to_tls(self, domain: &str, accept_invalid_certs: bool) -> Result<Self> {
        let Self::Plain(stream) = self else {
            return Err(DeliveryError::Tls("Connection is already TLS".to_string()));
        };

        let mut root_store = RootCertStore::empty();
        let certs = rustls_native_certs::load_native_certs();
        for cert in certs.certs {
            root_store
                .add(cert)
                .map_err(|e| DeliveryError::Tls(format!("Failed to add certificate: {e}")))?;
        }
        if !certs.errors.is_empty() {
            tracing::warn!(?certs.errors, "Some certificates could not be loaded");
        }

        let mut config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        if accept_invalid_certs {
            config
                .dangerous()
                .set_certificate_verifier(Arc::new(NoVerifier));
        }

        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|e| DeliveryError::Tls(format!("Invalid server name '{domain}': {e}")))?;

        let stream = TlsConnector::from(Arc::new(config))
            .connect(server_name, stream)
            .await
            .map_err(|e| DeliveryError::Tls(e.to_string()))?;

        Ok(Self::Tls(Box::new(stream)))
    }
}

/// Certificate verifier that accepts anything. Only installed when
/// `accept_invalid_certs` is set.
#[derive(Debug)]
struct NoVerifier;

impl tokio_rustls::rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[tokio_rustls::rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: tokio_rustls::rustls::pki_types::UnixTime,
    ) -> std::result::Result<
        tokio_rustls::rustls::client::danger::ServerCertVerified,
        tokio_rustls::rustls::Error,
    > {
        Ok(tokio_rustls::rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _dss: &tokio_rustls::rustls::DigitallySignedStruct,
    ) -> std::result::Result<
        tokio_rustls::rustls::client::danger::HandshakeSignatureValid,
        tokio_rustls::rustls::Error,
    > {
        Ok(tokio_rustls::rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _dss: &tokio_rustls::rustls::DigitallySignedStruct,
    ) -> std::result::Result<
        tokio_rustls::rustls::client::danger::HandshakeSignatureValid,
        tokio_rustls::rustls::Error,
    > {
        Ok(tokio_rustls::rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<tokio_rustls::rustls::SignatureScheme> {
        vec![
            tokio_rustls::rustls::SignatureScheme::RSA_PKCS1_SHA256,
            tokio_rustls::rustls::SignatureScheme::RSA_PSS_SHA256,
            tokio_rustls::rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            tokio_rustls::rustls::SignatureScheme::ED25519,
        ]
    }
}

/// Escape a payload for the DATA phase: lines starting with `.` get a second
/// `.`, and the content always ends with CRLF so the terminator stands on its
/// own line.
#[must_use]
pub fn dot_stuff(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + payload.len() / 64 + 2);
    let mut at_line_start = true;

    for &byte in payload {
        if at_line_start && byte == b'.' {
            out.push(b'.');
        }
        out.push(byte);
        at_line_start = byte == b'\n';
    }

    if !out.ends_with(b"\r\n") {
        if out.ends_with(b"\n") {
            out.pop();
        }
        out.extend_from_slice(b"\r\n");
    }

    out
}

/// Terminate `command` with CRLF, refusing any line break already inside it.
fn command_line(command: &str) -> Result<Vec<u8>> {
    if command.contains(['\r', '\n']) {
        return Err(DeliveryError::Protocol(
            "Command contains a line break".to_string(),
        ));
    }

    let mut line = Vec::with_capacity(command.len() + 2);
    line.extend_from_slice(command.as_bytes());
    line.extend_from_slice(b"\r\n");
    Ok(line)
}

/// A single SMTP conversation.
pub struct SmtpClient {
    connection: Option<ClientConnection>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    server_domain: String,
    accept_invalid_certs: bool,
}

impl SmtpClient {
    /// Connect to `addr` (`host:port`). `server_domain` is the name checked
    /// against the certificate if the connection is later upgraded.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::Connection`] if the TCP connection cannot be made.
    pub async fn connect(addr: &str, server_domain: impl Into<String>) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| DeliveryError::Connection {
                endpoint: addr.to_string(),
                source,
            })?;

        Ok(Self {
            connection: Some(ClientConnection::Plain(stream)),
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
            server_domain: server_domain.into(),
            accept_invalid_certs: false,
        })
    }

    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self.connection, Some(ClientConnection::Tls(_)))
    }

    /// Read the server greeting.
    ///
    /// # Errors
    ///
    /// If reading fails or the reply is malformed.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        self.read_response().await
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let connection = self
            .connection
            .as_mut()
            .ok_or(DeliveryError::ConnectionClosed)?;
        connection.send(data).await?;
        connection.flush().await
    }

    /// Send a command line and read the reply.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::Protocol`] if `command` holds a CR or LF, which would
    /// split it into several commands on the wire. Otherwise if sending or
    /// reading fails.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        let line = command_line(command)?;
        outgoing!("{command}");
        self.write(&line).await?;
        self.read_response().await
    }

    /// Like [`SmtpClient::command`], but only `label` makes it into the logs.
    async fn secret_command(&mut self, command: &str, label: &str) -> Result<Response> {
        let line = command_line(command)?;
        outgoing!("{label} ********");
        self.write(&line).await?;
        self.read_response().await
    }

    /// # Errors
    ///
    /// If the command cannot be sent or the reply read.
    pub async fn ehlo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("EHLO {domain}")).await
    }

    /// # Errors
    ///
    /// If the command cannot be sent or the reply read.
    pub async fn helo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("HELO {domain}")).await
    }

    /// # Errors
    ///
    /// If the command cannot be sent or the reply read.
    pub async fn mail_from(&mut self, from: &str) -> Result<Response> {
        self.command(&format!("MAIL FROM:<{from}>")).await
    }

    /// # Errors
    ///
    /// If the command cannot be sent or the reply read.
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    /// # Errors
    ///
    /// If the command cannot be sent or the reply read.
    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await
    }

    /// Send the message content, dot-stuffed, followed by the end-of-data
    /// marker.
    ///
    /// # Errors
    ///
    /// If sending or reading fails.
    pub async fn send_data(&mut self, payload: &[u8]) -> Result<Response> {
        outgoing!("<{} bytes of message data>", payload.len());
        let mut data = dot_stuff(payload);
        data.extend_from_slice(b".\r\n");
        self.write(&data).await?;
        self.read_response().await
    }

    /// # Errors
    ///
    /// If the command cannot be sent or the reply read.
    pub async fn quit(&mut self) -> Result<Response> {
        self.command("QUIT").await
    }

    /// Issue STARTTLS and, on a 2xx reply, upgrade the connection in place.
    ///
    /// # Errors
    ///
    /// If the command fails or the TLS handshake does.
    pub async fn starttls(&mut self) -> Result<Response> {
        let response = self.command("STARTTLS").await?;

        if response.is_success() {
            let old = self
                .connection
                .take()
                .ok_or(DeliveryError::ConnectionClosed)?;
            self.connection = Some(
                old.upgrade_to_tls(&self.server_domain, self.accept_invalid_certs)
                    .await?,
            );
            // Nothing read before the handshake may be trusted afterwards
            self.buffer_pos = 0;
        }

        Ok(response)
    }

    /// Authenticate with `credentials`, returning the final reply.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::Authentication`] when the server refuses, or any IO
    /// failure along the way.
    pub async fn authenticate(&mut self, credentials: &Credentials) -> Result<Response> {
        let response = match credentials.mechanism {
            AuthMechanism::Plain => {
                self.secret_command(
                    &format!("AUTH PLAIN {}", credentials.plain_response()),
                    "AUTH PLAIN",
                )
                .await?
            }
            AuthMechanism::Login => {
                let challenge = self.command("AUTH LOGIN").await?;
                if challenge.code != 334 {
                    return Err(DeliveryError::Authentication(format!(
                        "{} {}",
                        challenge.code,
                        challenge.message()
                    )));
                }

                let challenge = self
                    .secret_command(&credentials.login_username(), "username")
                    .await?;
                if challenge.code != 334 {
                    return Err(DeliveryError::Authentication(format!(
                        "{} {}",
                        challenge.code,
                        challenge.message()
                    )));
                }

                self.secret_command(&credentials.login_password(), "password")
                    .await?
            }
        };

        if response.code == 235 {
            Ok(response)
        } else {
            Err(DeliveryError::Authentication(format!(
                "{} {}",
                response.code,
                response.message()
            )))
        }
    }

    async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some((response, consumed)) = Response::parse(&self.buffer[..self.buffer_pos])? {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;

                incoming!("{} {}", response.code, response.message());
                return Ok(response);
            }

            if self.buffer_pos >= self.buffer.len() {
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(DeliveryError::Protocol(format!(
                        "Reply too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let connection = self
                .connection
                .as_mut()
                .ok_or(DeliveryError::ConnectionClosed)?;
            let n = connection.read(&mut self.buffer[self.buffer_pos..]).await?;
            self.buffer_pos += n;
        }
    }
}
