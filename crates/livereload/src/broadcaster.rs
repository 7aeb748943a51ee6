//! Subscriber registry and reload fan-out.
//!
//! The [`Broadcaster`] is the only state shared between the watcher thread and
//! the per-client stream tasks. Every access to the subscriber set goes
//! through one mutex, which is never held across an `.await`.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

/// Message delivered to connected clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReloadMessage {
    /// A relevant file changed; the client should reload.
    Reload,
}

impl ReloadMessage {
    /// Payload written into the event frame.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reload => "reload",
        }
    }
}

/// Unique identifier of a subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outcome of a single [`Broadcaster::notify`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NotifyOutcome {
    /// Subscribers that received the message.
    pub delivered: usize,
    /// Subscribers whose buffer was full (they already have a reload queued).
    pub dropped: usize,
    /// Subscribers removed because their receiver was gone.
    pub pruned: usize,
}

/// Fans out reload notifications to every connected subscriber.
pub struct Broadcaster {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<ReloadMessage>>>,
    capacity: usize,
    closed: AtomicBool,
}

impl Broadcaster {
    /// Create a broadcaster whose subscribers buffer up to `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Register a new subscriber.
    ///
    /// The returned [`Subscription`] deregisters itself when dropped. After
    /// [`close`](Self::close) the subscription is created already closed.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = SubscriberId(Uuid::new_v4());

        {
            let mut subscribers = self.lock();
            if !self.closed.load(Ordering::Acquire) {
                subscribers.insert(id, tx);
                tracing::debug!(subscriber = %id, "Live reload subscriber registered");
            }
        }

        Subscription {
            id,
            receiver: rx,
            broadcaster: Arc::clone(self),
        }
    }

    /// Remove a subscriber.
    ///
    /// Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            tracing::debug!(subscriber = %id, "Live reload subscriber removed");
        }
        removed
    }

    /// Send a reload message to every subscriber without blocking.
    ///
    /// Full buffers drop the message; subscribers whose receiver is gone are
    /// pruned in the same pass.
    pub fn notify(&self) -> NotifyOutcome {
        let mut outcome = NotifyOutcome::default();
        let mut subscribers = self.lock();

        subscribers.retain(|id, tx| match tx.try_send(ReloadMessage::Reload) {
            Ok(()) => {
                outcome.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                outcome.dropped += 1;
                true
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(subscriber = %id, "Pruning disconnected live reload subscriber");
                outcome.pruned += 1;
                false
            }
        });

        outcome
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Drop every subscriber channel so their streams end.
    ///
    /// Used on server shutdown; later subscriptions start closed.
    pub fn close(&self) {
        let count = {
            let mut subscribers = self.lock();
            self.closed.store(true, Ordering::Release);
            let count = subscribers.len();
            subscribers.clear();
            count
        };
        tracing::debug!(subscribers = count, "Live reload broadcaster closed");
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, mpsc::Sender<ReloadMessage>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Receiving side of one subscriber.
///
/// Dropping the subscription removes it from the broadcaster, so cleanup
/// happens on every exit path of the stream that owns it.
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<ReloadMessage>,
    broadcaster: Arc<Broadcaster>,
}

impl Subscription {
    /// Subscriber identifier.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next message.
    ///
    /// Returns `None` once the broadcaster dropped this subscriber.
    pub async fn recv(&mut self) -> Option<ReloadMessage> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(self.id);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
