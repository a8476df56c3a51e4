//! A process-wide default spooler.
//!
//! Created on first use with an SMTP transport, no credentials, no endpoint
//! and a queue of [`DEFAULT_SPOOL_LENGTH`]. Call [`configure`] before
//! [`start`]. Once stopped or terminated it stays that way for the rest of
//! the process; anything needing a fresh spooler should build its own
//! [`Spooler`].

use std::sync::{Arc, LazyLock};

use mailspool_common::Message;
use mailspool_smtp::{Credentials, SmtpTransport};

use crate::spooler::{DEFAULT_SPOOL_LENGTH, Spooler};

static SPOOLER: LazyLock<Spooler> = LazyLock::new(|| {
    Spooler::new(
        Arc::new(SmtpTransport::default()),
        None,
        String::new(),
        DEFAULT_SPOOL_LENGTH,
    )
});

/// The default instance itself.
#[must_use]
pub fn spooler() -> &'static Spooler {
    &SPOOLER
}

/// See [`Spooler::configure`].
pub fn configure(credentials: Option<Credentials>, endpoint: impl Into<String>) {
    SPOOLER.configure(credentials, endpoint);
}

/// See [`Spooler::start`].
pub fn start() {
    SPOOLER.start();
}

/// See [`Spooler::spool`].
pub async fn spool(message: impl Message + 'static) {
    SPOOLER.spool(message).await;
}

/// See [`Spooler::stop`].
pub async fn stop() {
    SPOOLER.stop().await;
}

/// See [`Spooler::terminate`].
pub async fn terminate() {
    SPOOLER.terminate().await;
}
