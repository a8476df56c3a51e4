#![allow(dead_code)] // not every suite uses every helper

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use mailspool_common::{BodyError, Email, Mailbox, Message};
use mailspool_smtp::{Credentials, DeliveryError, Transport};
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

pub const WAIT: Duration = Duration::from_secs(5);

/// Transport whose deliveries block until the test lets them through.
///
/// Each call counts as entered immediately, then waits for one permit.
#[derive(Debug)]
pub struct GatedTransport {
    gate: Semaphore,
    entered: AtomicUsize,
    notify: Notify,
    delivered: Mutex<Vec<String>>,
}

impl GatedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            entered: AtomicUsize::new(0),
            notify: Notify::new(),
            delivered: Mutex::new(Vec::new()),
        })
    }

    /// Let `count` more deliveries complete.
    pub fn release(&self, count: usize) {
        self.gate.add_permits(count);
    }

    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    /// Envelope senders of completed deliveries, in completion order.
    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().clone()
    }

    /// Wait until `expected` deliveries are in progress or done.
    pub async fn wait_entered(
        &self,
        expected: usize,
    ) -> Result<(), tokio::time::error::Elapsed> {
        tokio::time::timeout(WAIT, async {
            loop {
                let notified = self.notify.notified();
                if self.entered() >= expected {
                    return;
                }
                notified.await;
            }
        })
        .await
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn deliver(
        &self,
        _payload: &[u8],
        from: &str,
        _to: &[String],
        _credentials: Option<&Credentials>,
        _endpoint: &str,
    ) -> Result<(), DeliveryError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();

        self.gate
            .acquire()
            .await
            .map_err(|_| DeliveryError::ConnectionClosed)?
            .forget();

        self.delivered.lock().push(from.to_string());
        Ok(())
    }
}

pub fn sender(index: usize) -> String {
    format!("sender{index}@example.com")
}

/// A well formed message identified by its sender.
pub fn message(index: usize) -> Email {
    Email::builder()
        .from(Mailbox::new(sender(index)))
        .to(Mailbox::new("recipient@example.com"))
        .subject(format!("Message {index}"))
        .body("Hello world!")
        .build()
}

pub fn message_to(index: usize, to: &str) -> Email {
    Email::builder()
        .from(Mailbox::new(sender(index)))
        .to(Mailbox::new(to))
        .subject(format!("Message {index}"))
        .body("Hello world!")
        .build()
}

/// A message whose body producer panics instead of returning.
#[derive(Debug)]
pub struct PanickingBody(pub Email);

impl Message for PanickingBody {
    fn from(&self) -> Option<&Mailbox> {
        self.0.from()
    }

    fn to(&self) -> Option<&[Mailbox]> {
        self.0.to()
    }

    fn subject(&self) -> &str {
        self.0.subject()
    }

    fn content_type(&self) -> &str {
        self.0.content_type()
    }

    fn body(&self) -> Result<String, BodyError> {
        panic!("template engine blew up")
    }

    fn date(&self) -> DateTime<FixedOffset> {
        self.0.date()
    }
}
