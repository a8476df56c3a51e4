use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use mailspool_common::{Message, internal, tracing};
use mailspool_smtp::{Credentials, Transport};
use parking_lot::{Mutex, RwLock};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinSet,
};

use crate::{
    config::SpoolerConfig,
    worker::{Settings, Shared, Spooled, Worker, WorkerState},
};

/// Queue capacity used when none is configured.
pub const DEFAULT_SPOOL_LENGTH: usize = 16;

/// A bounded queue of outgoing messages and the workers that deliver them.
///
/// Lifecycle: [`configure`](Self::configure) while idle, [`start`](Self::start)
/// one or more workers, [`spool`](Self::spool) messages, then end with exactly
/// one of [`stop`](Self::stop) or [`terminate`](Self::terminate). A spooler is
/// not reusable after either.
///
/// Misuse (spooling after shutdown, shutting down twice, reconfiguring while
/// workers run) panics rather than silently losing mail.
pub struct Spooler {
    sender: Mutex<Option<mpsc::Sender<Spooled>>>,
    shared: Arc<Shared>,
    workers: Mutex<JoinSet<usize>>,
    capacity: usize,
    started: AtomicBool,
}

impl std::fmt::Debug for Spooler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spooler")
            .field("capacity", &self.capacity)
            .field("workers", &self.worker_count())
            .field("closed", &self.is_closed())
            .field("transport", &self.shared.transport)
            .finish_non_exhaustive()
    }
}

impl Spooler {
    /// Create a spooler delivering through `transport` to `endpoint`.
    ///
    /// A `capacity` of 0 makes the queue a rendezvous: [`spool`](Self::spool)
    /// returns only once a worker has taken the message.
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Option<Credentials>,
        endpoint: impl Into<String>,
        capacity: usize,
    ) -> Self {
        // Rendezvous is a one slot channel plus a hand-off acknowledgement
        let (sender, receiver) = mpsc::channel(capacity.max(1));

        Self {
            sender: Mutex::new(Some(sender)),
            shared: Arc::new(Shared {
                receiver: tokio::sync::Mutex::new(receiver),
                transport,
                settings: RwLock::new(Arc::new(Settings {
                    credentials,
                    endpoint: endpoint.into(),
                })),
                states: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                purging: AtomicBool::new(false),
            }),
            workers: Mutex::new(JoinSet::new()),
            capacity,
            started: AtomicBool::new(false),
        }
    }

    /// Build an idle spooler from configuration. Workers are not started.
    #[must_use]
    pub fn from_config(config: SpoolerConfig) -> Self {
        Self::new(
            config.transport.into_transport(),
            config.credentials,
            config.endpoint,
            config.capacity,
        )
    }

    /// Replace the credentials and endpoint used for delivery.
    ///
    /// # Panics
    ///
    /// If any worker has been started.
    pub fn configure(&self, credentials: Option<Credentials>, endpoint: impl Into<String>) {
        assert!(
            !self.started.load(Ordering::Acquire),
            "Spooler::configure called after workers were started"
        );

        let endpoint = endpoint.into();
        internal!(level = DEBUG, "Spooler configured for {endpoint}");
        *self.shared.settings.write() = Arc::new(Settings {
            credentials,
            endpoint,
        });
    }

    /// Spawn one more worker on the current Tokio runtime.
    ///
    /// Every worker shares the one queue, so with more than one there is no
    /// ordering guarantee between deliveries.
    ///
    /// # Panics
    ///
    /// If the spooler has been stopped or terminated, or when called outside
    /// a Tokio runtime.
    pub fn start(&self) {
        assert!(
            !self.is_closed(),
            "Spooler::start called after stop or terminate"
        );

        self.started.store(true, Ordering::Release);
        let worker = Worker::spawned(Arc::clone(&self.shared));
        self.workers.lock().spawn(worker.run());

        internal!(
            level = DEBUG,
            "Spooler started worker, {} running",
            self.worker_count()
        );
    }

    /// Queue `message` for delivery, waiting while the queue is full.
    ///
    /// Delivery failures are logged by the worker and never reported here.
    ///
    /// # Panics
    ///
    /// If the spooler has been stopped or terminated.
    pub async fn spool(&self, message: impl Message + 'static) {
        let Some(sender) = self.sender.lock().clone() else {
            panic!("Spooler::spool called after stop or terminate");
        };

        let (taken, was_taken) = if self.capacity == 0 {
            let (taken, was_taken) = oneshot::channel();
            (Some(taken), Some(was_taken))
        } else {
            (None, None)
        };

        let spooled = Spooled {
            message: Box::new(message),
            taken,
        };

        if sender.send(spooled).await.is_err() {
            internal!(
                level = DEBUG,
                "Spooler closed while a message was waiting for space; it was discarded"
            );
            return;
        }
        drop(sender);

        if let Some(was_taken) = was_taken {
            // An error means terminate purged it, which also counts as taken
            let _ = was_taken.await;
        }
    }

    /// Close intake, then wait for the workers to deliver everything already
    /// queued.
    ///
    /// With no workers started the backlog is delivered on the calling task.
    ///
    /// # Panics
    ///
    /// If the spooler has already been stopped or terminated.
    pub async fn stop(&self) {
        drop(self.close("stop", false));

        let workers = std::mem::take(&mut *self.workers.lock());
        if workers.is_empty() {
            let attempted = Worker::inline(Arc::clone(&self.shared)).run().await;
            internal!(
                level = INFO,
                "Spooler stopped without workers, delivered backlog of {attempted} message(s) inline"
            );
            return;
        }

        let attempted = Self::join(workers).await;
        internal!(
            level = INFO,
            "Spooler stopped after {attempted} delivery attempt(s)"
        );
    }

    /// Close intake, discard everything still queued, and wait for the
    /// workers to finish whatever they were already delivering.
    ///
    /// # Panics
    ///
    /// If the spooler has already been stopped or terminated.
    pub async fn terminate(&self) {
        drop(self.close("terminate", true));

        let mut discarded = 0usize;
        {
            let mut receiver = self.shared.receiver.lock().await;
            receiver.close();
            while receiver.recv().await.is_some() {
                discarded += 1;
            }
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        let attempted = Self::join(workers).await;
        internal!(
            level = INFO,
            "Spooler terminated, discarded {discarded} queued message(s), {attempted} delivery attempt(s) completed"
        );
    }

    /// Number of workers started so far.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.shared.states.lock().len()
    }

    /// State of every started worker, in start order.
    #[must_use]
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.shared.states.lock().clone()
    }

    /// Queue capacity as requested; 0 means rendezvous.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether intake has been closed by stop, terminate or drop.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Take the sender out, marking intake closed. With `purge`, anything a
    /// worker dequeues from here on is discarded. The caller decides when to
    /// drop the sender.
    fn close(&self, operation: &str, purge: bool) -> mpsc::Sender<Spooled> {
        let Some(sender) = self.sender.lock().take() else {
            panic!("Spooler::{operation} called after stop or terminate");
        };

        if purge {
            self.shared.purging.store(true, Ordering::Release);
        }
        self.shared.closed.store(true, Ordering::Release);
        internal!(level = DEBUG, "Spooler intake closed by {operation}");
        sender
    }

    async fn join(mut workers: JoinSet<usize>) -> usize {
        let mut attempted = 0;
        while let Some(result) = workers.join_next().await {
            match result {
                Ok(count) => attempted += count,
                Err(error) => tracing::error!(%error, "Spool worker failed"),
            }
        }

        attempted
    }
}

impl Drop for Spooler {
    fn drop(&mut self) {
        if self.sender.get_mut().take().is_some() {
            self.shared.closed.store(true, Ordering::Release);
            internal!(level = DEBUG, "Spooler dropped while open, workers will drain");
        }

        // Let the workers finish the backlog on their own
        self.workers.get_mut().detach_all();
    }
}
