use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use mailspool_common::internal;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::Transport;
use crate::{credentials::Credentials, error::DeliveryError};

/// A delivery as seen by [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub payload: Vec<u8>,
    pub from: String,
    pub to: Vec<String>,
    pub endpoint: String,
    /// Username of the credentials presented, if any.
    pub username: Option<String>,
}

/// Transport that keeps deliveries in memory.
///
/// Clones share state, so a test can hand one clone to a spooler and assert
/// on the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    deliveries: Arc<Mutex<Vec<Delivery>>>,
    rejected: Arc<Mutex<HashSet<String>>>,
    attempts: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl MemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject, with a 550, every delivery addressed to `address`.
    pub fn reject_recipient(&self, address: impl Into<String>) {
        self.rejected.lock().insert(address.into());
    }

    /// Successful deliveries in completion order.
    #[must_use]
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    #[must_use]
    pub fn delivery_count(&self) -> usize {
        self.deliveries.lock().len()
    }

    /// Every call to `deliver`, failed ones included.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Wait until at least `expected` deliveries have been attempted.
    ///
    /// # Errors
    ///
    /// If `timeout` elapses first.
    pub async fn wait_for_attempts(
        &self,
        expected: usize,
        timeout: Duration,
    ) -> Result<(), tokio::time::error::Elapsed> {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.notify.notified();
                if self.attempts() >= expected {
                    return;
                }
                notified.await;
            }
        })
        .await
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn deliver(
        &self,
        payload: &[u8],
        from: &str,
        to: &[String],
        credentials: Option<&Credentials>,
        endpoint: &str,
    ) -> Result<(), DeliveryError> {
        let result = if to.is_empty() {
            Err(DeliveryError::NoRecipients)
        } else {
            let rejected = self.rejected.lock();
            to.iter().find(|address| rejected.contains(*address)).map_or_else(
                || Ok(()),
                |address| {
                    Err(DeliveryError::Rejected {
                        stage: "RCPT TO",
                        code: 550,
                        message: format!("<{address}> rejected"),
                    })
                },
            )
        };

        if result.is_ok() {
            internal!(
                level = DEBUG,
                "Recorded {} byte message from <{from}> to {} recipient(s)",
                payload.len(),
                to.len()
            );
            self.deliveries.lock().push(Delivery {
                payload: payload.to_vec(),
                from: from.to_string(),
                to: to.to_vec(),
                endpoint: endpoint.to_string(),
                username: credentials.map(|credentials| credentials.username.clone()),
            });
        }

        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();

        result
    }
}
