//! Mock SMTP relay for exercising the transport end to end
//!
//! The server can:
//! - Advertise arbitrary EHLO capabilities, or refuse EHLO entirely
//! - Check `AUTH PLAIN` / `AUTH LOGIN` against a fixed username and password
//! - Reject individual recipients
//! - Hang before the greeting to provoke client timeouts
//! - Record every command and every message body it accepted

#![allow(dead_code)] // not every test uses every knob

use std::{
    collections::HashSet,
    fmt::Write as _,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use base64::{Engine, prelude::BASE64_STANDARD};
use parking_lot::Mutex;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    time::timeout,
};

/// SMTP command received by the mock server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    Helo(String),
    Auth(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    Quit,
    Other(String),
}

#[derive(Clone)]
struct MockServerConfig {
    greeting: (u16, String),
    ehlo: (u16, Vec<String>),
    auth: Option<(String, String)>,
    rejected_recipients: HashSet<String>,
    data_end: (u16, String),
    hang_before_greeting: bool,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: (220, "Mock SMTP Server".to_string()),
            ehlo: (
                250,
                vec!["localhost".to_string(), "SIZE 10000000".to_string()],
            ),
            auth: None,
            rejected_recipients: HashSet::new(),
            data_end: (250, "OK: Message accepted".to_string()),
            hang_before_greeting: false,
        }
    }
}

fn reply(code: u16, message: &str) -> Vec<u8> {
    format!("{code} {message}\r\n").into_bytes()
}

fn multiline(code: u16, lines: &[String]) -> Vec<u8> {
    let mut response = String::new();
    for (i, line) in lines.iter().enumerate() {
        let separator = if i + 1 == lines.len() { ' ' } else { '-' };
        let _ = write!(&mut response, "{code}{separator}{line}\r\n");
    }
    response.into_bytes()
}

/// Mock SMTP relay bound to an ephemeral loopback port
pub struct MockSmtpServer {
    addr: SocketAddr,
    commands: Arc<Mutex<Vec<SmtpCommand>>>,
    messages: Arc<Mutex<Vec<Vec<u8>>>>,
    shutdown: Arc<AtomicBool>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder {
            config: MockServerConfig::default(),
        }
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `host:port` suitable for a transport endpoint
    #[must_use]
    pub fn endpoint(&self) -> String {
        self.addr.to_string()
    }

    #[must_use]
    pub fn commands(&self) -> Vec<SmtpCommand> {
        self.commands.lock().clone()
    }

    /// Message bodies accepted after DATA, with dot-stuffing removed
    #[must_use]
    pub fn messages(&self) -> Vec<Vec<u8>> {
        self.messages.lock().clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    #[allow(clippy::too_many_lines)]
    async fn handle_client(
        stream: TcpStream,
        config: Arc<MockServerConfig>,
        commands: Arc<Mutex<Vec<SmtpCommand>>>,
        messages: Arc<Mutex<Vec<Vec<u8>>>>,
    ) -> std::io::Result<()> {
        if config.hang_before_greeting {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            return Ok(());
        }

        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        writer
            .write_all(&reply(config.greeting.0, &config.greeting.1))
            .await?;

        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                return Ok(());
            }

            let command_line = line.trim_end().to_string();
            let (verb, argument) = command_line
                .split_once(' ')
                .unwrap_or((command_line.as_str(), ""));

            let (command, response) = match verb.to_uppercase().as_str() {
                "EHLO" => {
                    let (code, capabilities) = &config.ehlo;
                    let response = if *code == 250 {
                        multiline(*code, capabilities)
                    } else {
                        reply(*code, "EHLO not supported")
                    };
                    (SmtpCommand::Ehlo(argument.to_string()), response)
                }
                "HELO" => (
                    SmtpCommand::Helo(argument.to_string()),
                    reply(250, "Hello"),
                ),
                "AUTH" => {
                    let (mechanism, initial) =
                        argument.split_once(' ').unwrap_or((argument, ""));
                    let mechanism = mechanism.to_uppercase();

                    let presented = match mechanism.as_str() {
                        "PLAIN" => BASE64_STANDARD
                            .decode(initial)
                            .ok()
                            .and_then(|decoded| String::from_utf8(decoded).ok())
                            .and_then(|decoded| {
                                let mut parts = decoded.split('\0').skip(1);
                                Some((parts.next()?.to_string(), parts.next()?.to_string()))
                            }),
                        "LOGIN" => {
                            writer.write_all(&reply(334, "VXNlcm5hbWU6")).await?;
                            let username = read_base64_line(&mut reader).await?;
                            writer.write_all(&reply(334, "UGFzc3dvcmQ6")).await?;
                            let password = read_base64_line(&mut reader).await?;
                            Some((username, password))
                        }
                        _ => None,
                    };

                    let response = match (&config.auth, presented) {
                        (Some(expected), Some(presented)) if *expected == presented => {
                            reply(235, "Authentication successful")
                        }
                        (None, _) => reply(502, "AUTH not supported"),
                        _ => reply(535, "Authentication credentials invalid"),
                    };
                    (SmtpCommand::Auth(mechanism), response)
                }
                "MAIL" => (
                    SmtpCommand::MailFrom(argument.to_string()),
                    reply(250, "OK"),
                ),
                "RCPT" => {
                    let address = argument
                        .trim_start_matches("TO:")
                        .trim_start_matches('<')
                        .trim_end_matches('>');
                    let response = if config.rejected_recipients.contains(address) {
                        reply(550, "User unknown")
                    } else {
                        reply(250, "OK")
                    };
                    (SmtpCommand::RcptTo(argument.to_string()), response)
                }
                "DATA" => {
                    commands.lock().push(SmtpCommand::Data);
                    writer
                        .write_all(&reply(354, "Start mail input; end with <CRLF>.<CRLF>"))
                        .await?;

                    let mut content = Vec::new();
                    let mut data_line = String::new();
                    loop {
                        data_line.clear();
                        if reader.read_line(&mut data_line).await? == 0 {
                            return Ok(());
                        }
                        if data_line == ".\r\n" {
                            break;
                        }
                        let unstuffed = data_line.strip_prefix('.').unwrap_or(&data_line);
                        content.extend_from_slice(unstuffed.as_bytes());
                    }

                    let (code, message) = &config.data_end;
                    if *code == 250 {
                        messages.lock().push(content);
                    }
                    writer.write_all(&reply(*code, message)).await?;
                    continue;
                }
                "QUIT" => {
                    commands.lock().push(SmtpCommand::Quit);
                    writer.write_all(&reply(221, "Bye")).await?;
                    return Ok(());
                }
                _ => (
                    SmtpCommand::Other(command_line.clone()),
                    reply(500, "Unknown command"),
                ),
            };

            commands.lock().push(command);
            writer.write_all(&response).await?;
        }
    }
}

async fn read_base64_line(
    reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
) -> std::io::Result<String> {
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    Ok(BASE64_STANDARD
        .decode(line.trim_end())
        .ok()
        .and_then(|decoded| String::from_utf8(decoded).ok())
        .unwrap_or_default())
}

/// Builder for configuring a `MockSmtpServer`
pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
}

impl MockSmtpServerBuilder {
    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = (code, message.into());
        self
    }

    /// Reply to EHLO with `code`; on 250 the capabilities follow the greeting line
    #[must_use]
    pub fn with_ehlo_response(mut self, code: u16, capabilities: &[&str]) -> Self {
        let mut lines = vec!["localhost".to_string()];
        lines.extend(capabilities.iter().map(ToString::to_string));
        self.config.ehlo = (code, lines);
        self
    }

    /// Accept AUTH for exactly this username and password
    #[must_use]
    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.auth = Some((username.into(), password.into()));
        self
    }

    #[must_use]
    pub fn with_rejected_recipient(mut self, address: impl Into<String>) -> Self {
        self.config.rejected_recipients.insert(address.into());
        self
    }

    /// Reply after `<CRLF>.<CRLF>`
    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end = (code, message.into());
        self
    }

    /// Accept connections but never say anything
    #[must_use]
    pub const fn hanging(mut self) -> Self {
        self.config.hang_before_greeting = true;
        self
    }

    /// Bind to a random loopback port and start serving
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to a port
    pub async fn build(self) -> std::io::Result<MockSmtpServer> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(Mutex::new(Vec::new()));
        let messages = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let server_commands = Arc::clone(&commands);
        let server_messages = Arc::clone(&messages);
        let server_shutdown = Arc::clone(&shutdown);

        tokio::spawn(async move {
            while !server_shutdown.load(Ordering::Relaxed) {
                // Accept with a timeout so the shutdown flag is noticed
                if let Ok(Ok((stream, _peer))) =
                    timeout(Duration::from_millis(100), listener.accept()).await
                {
                    tokio::spawn(MockSmtpServer::handle_client(
                        stream,
                        Arc::clone(&config),
                        Arc::clone(&server_commands),
                        Arc::clone(&server_messages),
                    ));
                }
            }
        });

        Ok(MockSmtpServer {
            addr,
            commands,
            messages,
            shutdown,
        })
    }
}
