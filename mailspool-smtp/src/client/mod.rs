//! Minimal SMTP client used by [`crate::SmtpTransport`].
//!
//! Supports:
//! - Plain TCP connections with STARTTLS upgrade
//! - `AUTH PLAIN` and `AUTH LOGIN`
//! - Dot-stuffed DATA transmission
//!
//! # Example
//!
//! ```no_run
//! use mailspool_smtp::client::SmtpClient;
//!
//! # async fn example() -> Result<(), mailspool_smtp::DeliveryError> {
//! let mut client = SmtpClient::connect("localhost:2525", "localhost").await?;
//! client.read_greeting().await?;
//! client.ehlo("client.example.com").await?;
//! client.mail_from("sender@example.com").await?;
//! client.rcpt_to("recipient@example.com").await?;
//! client.data().await?;
//! client.send_data(b"Subject: Test\r\n\r\nHello World").await?;
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

mod response;
mod smtp_client;

pub use response::Response;
pub use smtp_client::{SmtpClient, dot_stuff};
