use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ProgressEvent;

/// Result of a non-blocking publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered,
    /// The session's queue was full; the event was logged and discarded.
    Dropped,
    NoSession,
}

struct SessionSlot {
    sender: mpsc::Sender<ProgressEvent>,
    closed: CancellationToken,
    generation: u64,
    created_at: Instant,
}

/// Receiving half handed to the single consumer of a session.
pub struct SessionChannel {
    session_id: String,
    generation: u64,
    receiver: mpsc::Receiver<ProgressEvent>,
    closed: CancellationToken,
}

/// Per-session progress channels.
///
/// The map is the only shared state and sits behind one mutex that is held for
/// index operations only. Sends happen on a cloned sender outside the lock.
pub struct ProgressRegistry {
    sessions: Mutex<HashMap<String, SessionSlot>>,
    capacity: usize,
    keep_alive: Duration,
    next_generation: AtomicU64,
}

impl ProgressRegistry {
    pub fn new(capacity: usize, keep_alive: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            keep_alive,
            next_generation: AtomicU64::new(1),
        }
    }

    /// Opens a channel for `session_id`. A previous channel under the same id is
    /// closed and replaced.
    pub fn register(&self, session_id: &str) -> SessionChannel {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let closed = CancellationToken::new();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let created_at = Instant::now();

        let replaced = self.lock().insert(
            session_id.to_string(),
            SessionSlot {
                sender,
                closed: closed.clone(),
                generation,
                created_at,
            },
        );

        if let Some(previous) = replaced {
            previous.closed.cancel();
            info!(session_id, "Replaced existing progress channel");
        } else {
            debug!(session_id, "Registered progress channel");
        }

        SessionChannel {
            session_id: session_id.to_string(),
            generation,
            receiver,
            closed,
        }
    }

    /// Enqueues without waiting. Unknown sessions are a no-op.
    pub fn publish(&self, session_id: &str, event: ProgressEvent) -> PublishOutcome {
        let sender = match self.lock().get(session_id) {
            Some(slot) => slot.sender.clone(),
            None => return PublishOutcome::NoSession,
        };

        match sender.try_send(event) {
            Ok(()) => PublishOutcome::Delivered,
            Err(TrySendError::Full(event)) => {
                warn!(
                    session_id,
                    step = ?event.step,
                    status = ?event.status,
                    "Progress queue full, dropping event"
                );
                PublishOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => PublishOutcome::NoSession,
        }
    }

    /// Streams the session's events in publish order, interleaving a heartbeat
    /// whenever nothing arrived within the keep-alive interval.
    ///
    /// The stream ends when the channel is closed by replacement or sweep.
    /// Dropping it removes the session, unless a newer registration has already
    /// taken the id.
    pub fn consume(
        self: &Arc<Self>,
        channel: SessionChannel,
    ) -> impl Stream<Item = ProgressEvent> + Send + 'static {
        let SessionChannel {
            session_id,
            generation,
            mut receiver,
            closed,
        } = channel;
        let keep_alive = self.keep_alive;
        let guard = ConsumerGuard {
            registry: Arc::clone(self),
            session_id,
            generation,
        };

        async_stream::stream! {
            let _guard = guard;
            loop {
                let next = tokio::select! {
                    biased;
                    _ = closed.cancelled() => None,
                    event = receiver.recv() => event,
                    _ = tokio::time::sleep(keep_alive) => Some(ProgressEvent::heartbeat()),
                };

                match next {
                    Some(event) => yield event,
                    None => break,
                }
            }
        }
    }

    /// Closes every channel registered longer than `max_age` ago. Returns how
    /// many were removed.
    pub fn sweep(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let mut stale = Vec::new();

        self.lock().retain(|session_id, slot| {
            let keep = now.duration_since(slot.created_at) <= max_age;
            if !keep {
                stale.push((session_id.clone(), slot.closed.clone()));
            }
            keep
        });

        for (session_id, closed) in &stale {
            closed.cancel();
            debug!(session_id = %session_id, "Swept stale progress channel");
        }
        if !stale.is_empty() {
            info!(removed = stale.len(), "Swept stale progress channels");
        }
        stale.len()
    }

    /// Runs `sweep` every `interval` until `shutdown` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        max_age: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        registry.sweep(max_age);
                    }
                }
            }
            debug!("Progress sweeper stopped");
        })
    }

    #[cfg(test)]
    pub fn contains(&self, session_id: &str) -> bool {
        self.lock().contains_key(session_id)
    }

    fn remove_generation(&self, session_id: &str, generation: u64) {
        let mut sessions = self.lock();
        if sessions
            .get(session_id)
            .is_some_and(|slot| slot.generation == generation)
        {
            sessions.remove(session_id);
            debug!(session_id, "Progress consumer disconnected");
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionSlot>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct ConsumerGuard {
    registry: Arc<ProgressRegistry>,
    session_id: String,
    generation: u64,
}

impl Drop for ConsumerGuard {
    fn drop(&mut self) {
        self.registry
            .remove_generation(&self.session_id, self.generation);
    }
}
