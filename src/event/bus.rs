//! Asynchronous tagged event broadcast.
//!
//! [`EventBus`] is the async counterpart of [`super::EventHandler`]: events
//! are published with a tag and every collector sees every event emitted
//! after it started listening.

use std::fmt;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::error::EventError;

/// Buffered events per receiver before slow receivers start lagging.
const BUS_CAPACITY: usize = 64;

/// An event paired with the tag it was emitted under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tagged<E> {
    /// The event value.
    pub value: E,
    /// The emitter's tag; empty when untagged.
    pub tag: String,
}

impl<E> Tagged<E> {
    /// Tags `value` with `tag`.
    pub fn new(value: E, tag: impl Into<String>) -> Self {
        Self {
            value,
            tag: tag.into(),
        }
    }

    /// Wraps `value` with the empty tag.
    pub fn untagged(value: E) -> Self {
        Self::new(value, "")
    }
}

/// A broadcast bus for tagged events.
pub struct EventBus<E> {
    sender: broadcast::Sender<Tagged<E>>,
}

impl<E: Clone + Send + 'static> Default for EventBus<E> {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }
}

impl<E> EventBus<E>
where
    E: Clone + PartialEq + fmt::Debug + Send + 'static,
{
    /// Creates a bus with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits `event` under `tag`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::BusClosed`] if nobody is listening.
    pub fn emit(&self, event: E, tag: &str) -> Result<(), EventError> {
        self.emit_tagged(Tagged::new(event, tag))
    }

    /// Emits an already tagged event.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::BusClosed`] if nobody is listening.
    pub fn emit_tagged(&self, event: Tagged<E>) -> Result<(), EventError> {
        debug!(event = ?event.value, tag = %event.tag, "emitting");
        self.sender
            .send(event)
            .map(|_| ())
            .map_err(|_| EventError::BusClosed)
    }

    /// Returns a raw receiver of every event emitted from now on.
    #[must_use]
    pub fn receiver(&self) -> broadcast::Receiver<Tagged<E>> {
        self.sender.subscribe()
    }

    /// Returns the number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Invokes `action` for every event until the bus is dropped.
    pub async fn collect_events<F>(&self, mut action: F)
    where
        F: FnMut(Tagged<E>),
    {
        let mut receiver = self.receiver();
        while let Some(event) = next_event(&mut receiver).await {
            action(event);
        }
    }

    /// Invokes `action` for every event in `events` emitted under `tag`.
    ///
    /// Returns after `limit` matches when a limit is given, otherwise when the
    /// bus is dropped.
    pub async fn subscribe<F>(&self, events: &[E], tag: &str, limit: Option<usize>, mut action: F)
    where
        F: FnMut(),
    {
        if limit == Some(0) {
            return;
        }
        let mut receiver = self.receiver();
        let mut matched = 0usize;
        while let Some(event) = next_event(&mut receiver).await {
            if event.tag != tag || !events.contains(&event.value) {
                continue;
            }
            action();
            matched += 1;
            if limit.is_some_and(|limit| matched >= limit) {
                return;
            }
        }
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

async fn next_event<E: Clone>(receiver: &mut broadcast::Receiver<Tagged<E>>) -> Option<Tagged<E>> {
    loop {
        match receiver.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event bus receiver lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
