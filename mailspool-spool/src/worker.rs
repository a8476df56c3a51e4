use std::{
    any::Any,
    fmt,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use futures_util::FutureExt;
use mailspool_common::{Mailbox, Message, internal, tracing};
use mailspool_smtp::{Credentials, Transport, send};
use parking_lot::RwLock;
use tokio::sync::{Mutex, mpsc, oneshot};

/// Lifecycle of a single worker.
///
/// `Running` until the worker notices intake has closed, `Draining` while it
/// empties what is left, `Exited` once the queue is closed and empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Draining,
    Exited,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Exited => "exited",
        })
    }
}

/// A queued message.
pub(crate) struct Spooled {
    pub(crate) message: Box<dyn Message>,
    /// Set for rendezvous queues; fired as soon as a consumer takes the message
    pub(crate) taken: Option<oneshot::Sender<()>>,
}

/// Where and as whom deliveries are made.
#[derive(Debug, Default)]
pub(crate) struct Settings {
    pub(crate) credentials: Option<Credentials>,
    pub(crate) endpoint: String,
}

/// State shared by the spooler handle and every worker.
pub(crate) struct Shared {
    pub(crate) receiver: Mutex<mpsc::Receiver<Spooled>>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) settings: RwLock<Arc<Settings>>,
    pub(crate) states: parking_lot::Mutex<Vec<WorkerState>>,
    /// Intake is closed; raised by stop, terminate and drop
    pub(crate) closed: AtomicBool,
    /// Raised by terminate before intake closes; anything dequeued after is dropped
    pub(crate) purging: AtomicBool,
}

impl Shared {
    /// The next queued message, or `None` once intake is closed and nothing
    /// is left.
    pub(crate) async fn next(&self) -> Option<Spooled> {
        let mut spooled = self.receiver.lock().await.recv().await?;
        if let Some(taken) = spooled.taken.take() {
            // The producer may have gone away; nothing to tell it then
            let _ = taken.send(());
        }

        Some(spooled)
    }

    /// Render and deliver one message. Failures are logged, never returned,
    /// and a panic in the message or the transport counts as a failure.
    pub(crate) async fn deliver(&self, message: &dyn Message) {
        let settings = Arc::clone(&self.settings.read());

        let delivery = AssertUnwindSafe(send(
            message,
            self.transport.as_ref(),
            settings.credentials.as_ref(),
            &settings.endpoint,
        ))
        .catch_unwind()
        .await;

        let result = match delivery {
            Ok(result) => result,
            Err(panic) => {
                tracing::error!(
                    subject = %message.subject(),
                    panic = %panic_message(panic.as_ref()),
                    "Delivery panicked, message dropped"
                );
                return;
            }
        };

        match result {
            Ok(()) => internal!(
                level = DEBUG,
                "Delivered '{}' via {}",
                message.subject(),
                settings.endpoint
            ),
            Err(error) => tracing::error!(
                from = %describe_sender(message),
                to = %describe_recipients(message),
                subject = %message.subject(),
                %error,
                "Failed to deliver message"
            ),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

fn describe_sender(message: &dyn Message) -> String {
    message
        .from()
        .map_or_else(|| "<absent>".to_string(), Mailbox::to_string)
}

fn describe_recipients(message: &dyn Message) -> String {
    message.to().map_or_else(
        || "<absent>".to_string(),
        |to| {
            to.iter()
                .map(Mailbox::address)
                .collect::<Vec<_>>()
                .join(", ")
        },
    )
}

/// One consumer of the shared queue.
pub(crate) struct Worker {
    /// Index into [`Shared::states`]; `None` for the inline drain run by stop
    slot: Option<usize>,
    state: WorkerState,
    shared: Arc<Shared>,
}

impl Worker {
    /// Register a new worker with `shared`.
    pub(crate) fn spawned(shared: Arc<Shared>) -> Self {
        let slot = {
            let mut states = shared.states.lock();
            states.push(WorkerState::Running);
            states.len() - 1
        };

        Self {
            slot: Some(slot),
            state: WorkerState::Running,
            shared,
        }
    }

    /// A worker that is not counted, for draining on the caller's task.
    pub(crate) const fn inline(shared: Arc<Shared>) -> Self {
        Self {
            slot: None,
            state: WorkerState::Running,
            shared,
        }
    }

    fn name(&self) -> String {
        self.slot
            .map_or_else(|| "inline drain".to_string(), |slot| format!("worker {slot}"))
    }

    fn transition(&mut self, next: WorkerState) {
        if self.state == next {
            return;
        }

        internal!("Spool {}: {} -> {}", self.name(), self.state, next);
        self.state = next;
        if let Some(slot) = self.slot {
            if let Some(state) = self.shared.states.lock().get_mut(slot) {
                *state = next;
            }
        }
    }

    /// Consume until the queue is closed and empty.
    ///
    /// Returns how many messages were handed to the transport.
    pub(crate) async fn run(mut self) -> usize {
        internal!(level = DEBUG, "Spool {} started", self.name());
        let mut attempted = 0;

        while let Some(spooled) = self.shared.next().await {
            if self.shared.closed.load(Ordering::Acquire) {
                self.transition(WorkerState::Draining);
            }

            if self.shared.purging.load(Ordering::Acquire) {
                internal!(
                    level = DEBUG,
                    "Spool {} discarded '{}' during terminate",
                    self.name(),
                    spooled.message.subject()
                );
                continue;
            }

            self.shared.deliver(spooled.message.as_ref()).await;
            attempted += 1;
        }

        self.transition(WorkerState::Draining);
        self.transition(WorkerState::Exited);
        internal!(
            level = DEBUG,
            "Spool {} exited after {attempted} delivery attempt(s)",
            self.name()
        );

        attempted
    }
}
