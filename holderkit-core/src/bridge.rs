//! Turns listener callbacks into a replayable multi-subscriber stream.
//!
//! Engines report progress by calling a listener many times on their own
//! thread. An [`EventBridge`] takes those calls through [`EventBridge::publish`]
//! and fans them out to any number of [`Subscription`]s. The most recent
//! events are retained so an observer that attaches late (for example after
//! the UI was rebuilt) still sees what it missed, in order and without
//! duplicates. [`EventBridge::close`] ends every subscription.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

/// Number of events replayed to a late subscriber.
pub const DEFAULT_REPLAY: usize = 10;

const LIVE_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
enum Signal<T> {
    Event(T),
    Closed,
}

#[derive(Debug)]
struct History<T> {
    events: VecDeque<T>,
    closed: bool,
}

/// Replayable broadcast of events of type `T`.
#[derive(Debug)]
pub struct EventBridge<T> {
    replay: usize,
    history: Mutex<History<T>>,
    sender: broadcast::Sender<Signal<T>>,
}

impl<T: Clone + Send + 'static> EventBridge<T> {
    /// Creates a bridge replaying the last `replay` events.
    #[must_use]
    pub fn new(replay: usize) -> Self {
        let (sender, _) = broadcast::channel(LIVE_CAPACITY.max(replay.max(1)));
        Self {
            replay,
            history: Mutex::new(History {
                events: VecDeque::with_capacity(replay),
                closed: false,
            }),
            sender,
        }
    }

    /// Publishes an event to every subscriber. Never blocks on subscribers.
    ///
    /// Returns `false` if the bridge is already closed; the event is dropped.
    #[allow(clippy::must_use_candidate)]
    pub fn publish(&self, event: T) -> bool {
        let mut history = self.lock();
        if history.closed {
            return false;
        }
        if self.replay > 0 {
            if history.events.len() == self.replay {
                history.events.pop_front();
            }
            history.events.push_back(event.clone());
        }
        // no receivers is fine, late subscribers read the history
        let _ = self.sender.send(Signal::Event(event));
        true
    }

    /// Ends every subscription after it drained the events published so far.
    ///
    /// Returns `false` if the bridge was already closed.
    #[allow(clippy::must_use_candidate)]
    pub fn close(&self) -> bool {
        let mut history = self.lock();
        if history.closed {
            return false;
        }
        history.closed = true;
        let _ = self.sender.send(Signal::Closed);
        true
    }

    /// Whether [`EventBridge::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Attaches a subscriber. It first receives the retained history, then
    /// live events until the bridge closes or the subscription is dropped.
    #[must_use]
    pub fn subscribe(&self) -> Subscription<T> {
        let history = self.lock();
        let receiver = (!history.closed).then(|| self.sender.subscribe());
        Subscription {
            backlog: history.events.clone(),
            receiver,
        }
    }

    fn lock(&self) -> MutexGuard<'_, History<T>> {
        // history stays consistent across a panicking publisher
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One observer of an [`EventBridge`]. Dropping it releases the subscription.
#[derive(Debug)]
pub struct Subscription<T> {
    backlog: VecDeque<T>,
    receiver: Option<broadcast::Receiver<Signal<T>>>,
}

impl<T: Clone + Send + 'static> Subscription<T> {
    /// Waits for the next event. Returns `None` once the bridge closed.
    pub async fn next(&mut self) -> Option<T> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }
        loop {
            let receiver = self.receiver.as_mut()?;
            match receiver.recv().await {
                Ok(Signal::Event(event)) => return Some(event),
                Ok(Signal::Closed) | Err(broadcast::error::RecvError::Closed) => {
                    self.receiver = None;
                    return None;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber lagged behind, events dropped");
                }
            }
        }
    }
}
