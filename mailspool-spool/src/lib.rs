//! The mail spooler.
//!
//! A [`Spooler`] owns a bounded queue of pending messages and any number of
//! worker tasks that drain it through a [`Transport`](mailspool_smtp::Transport).
//! Producers block while the queue is full. Shutdown is either graceful
//! ([`Spooler::stop`]) or discarding ([`Spooler::terminate`]).
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mailspool_common::{Email, Mailbox};
//! use mailspool_smtp::SmtpTransport;
//! use mailspool_spool::{DEFAULT_SPOOL_LENGTH, Spooler};
//!
//! # async fn example() {
//! let spooler = Spooler::new(
//!     Arc::new(SmtpTransport::default()),
//!     None,
//!     "smtp.example.com:25",
//!     DEFAULT_SPOOL_LENGTH,
//! );
//! spooler.start();
//!
//! spooler
//!     .spool(
//!         Email::builder()
//!             .from(Mailbox::new("sender@example.com"))
//!             .to(Mailbox::new("recipient@example.com"))
//!             .subject("Hello")
//!             .body("Hello world!")
//!             .build(),
//!     )
//!     .await;
//!
//! spooler.stop().await;
//! # }
//! ```

pub mod config;
pub mod global;
mod spooler;
mod worker;

pub use config::{ConfigError, SpoolerConfig};
pub use spooler::{DEFAULT_SPOOL_LENGTH, Spooler};
pub use worker::WorkerState;
