//! Process-wide progress notifications for extraction attempts.
//!
//! The extraction loop publishes one [`ProgressEvent`] per attempt. Any
//! number of consumers (loggers, UIs) can [`EventStream::subscribe`]; a
//! subscription ends when it is dropped. Publishing never waits on
//! subscribers: a slow subscriber lags and loses its oldest events, the
//! publisher and other subscribers are unaffected.
//!
//! The stream also remembers the most recently published event
//! ([`EventStream::latest`]), so late observers can read the current state
//! without having been subscribed at the time.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use uuid::Uuid;

/// Buffered events per subscriber before it starts lagging.
pub const DEFAULT_CAPACITY: usize = 256;

/// Outcome of the attempt an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Success,
    ValidationFailed,
    ClientError,
}

/// Immutable notification describing one extraction attempt.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProgressEvent {
    /// Identifies the extraction call; shared by all of its attempts.
    pub extraction_id: Uuid,
    /// Name of the target schema.
    pub schema: String,
    /// 0-based attempt index.
    pub attempt: u32,
    pub kind: EventKind,
    pub message: String,
    /// Raw model response, when the attempt received one.
    pub payload: Option<String>,
    /// Whether another attempt follows this one.
    pub will_retry: bool,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn is_failure(&self) -> bool {
        self.kind != EventKind::Success
    }

    /// Emit the event through `tracing`.
    pub fn trace(&self) {
        let extraction_id = self.extraction_id;
        let schema = self.schema.as_str();
        let attempt = self.attempt;
        match self.kind {
            EventKind::Success => {
                tracing::info!(%extraction_id, %schema, %attempt, "Extraction attempt succeeded");
            }
            EventKind::ValidationFailed => {
                tracing::warn!(
                    %extraction_id,
                    %schema,
                    %attempt,
                    error = %self.message,
                    will_retry = %self.will_retry,
                    "Response failed validation"
                );
            }
            EventKind::ClientError => {
                tracing::warn!(
                    %extraction_id,
                    %schema,
                    %attempt,
                    error = %self.message,
                    will_retry = %self.will_retry,
                    "Model client failed"
                );
            }
        }
    }
}

/// Cloneable handle to a broadcast channel of [`ProgressEvent`]s.
#[derive(Clone)]
pub struct EventStream {
    sender: broadcast::Sender<ProgressEvent>,
    latest: Arc<Mutex<Option<ProgressEvent>>>,
}

impl EventStream {
    /// An isolated stream buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            latest: Arc::new(Mutex::new(None)),
        }
    }

    /// The process-wide stream shared by every extraction that is not given
    /// its own.
    pub fn global() -> &'static EventStream {
        static GLOBAL: OnceLock<EventStream> = OnceLock::new();
        GLOBAL.get_or_init(|| EventStream::new(DEFAULT_CAPACITY))
    }

    fn lock_latest(&self) -> MutexGuard<'_, Option<ProgressEvent>> {
        self.latest.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned event stream mutex");
            poisoned.into_inner()
        })
    }

    /// Fire-and-forget publish. Succeeds with zero subscribers.
    pub fn publish(&self, event: ProgressEvent) {
        let mut latest = self.lock_latest();
        // Err only means nobody is listening right now.
        let _ = self.sender.send(event.clone());
        *latest = Some(event);
    }

    /// Start receiving events published from now on.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// The most recently published event, if any.
    pub fn latest(&self) -> Option<ProgressEvent> {
        self.lock_latest().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

/// A live subscription; dropping it unsubscribes.
pub struct Subscription {
    receiver: broadcast::Receiver<ProgressEvent>,
}

impl Subscription {
    /// Wait for the next event. `None` once the stream is gone.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(%skipped, "Event subscriber lagged, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-buffered event, without waiting.
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(%skipped, "Event subscriber lagged, events dropped");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Blocking variant of [`Subscription::recv`] for synchronous consumers.
    ///
    /// Must not be called from within an async runtime.
    pub fn blocking_recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.receiver.blocking_recv() {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(%skipped, "Event subscriber lagged, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Drain every event currently buffered.
    pub fn drain(&mut self) -> Vec<ProgressEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
