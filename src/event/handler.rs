//! Tag-scoped synchronous event dispatch.
//!
//! Subscribers register a callback for one or more events under a tag. Tags
//! let a caller drop only its own subscriptions (for example one tag per
//! screen) without disturbing anyone else's.
//!
//! Dispatch works on a snapshot of the subscribers: the lock is released
//! before any callback runs, so a callback may subscribe or clear on the same
//! handler. Such changes apply from the next dispatch onwards.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

/// Tag used by callers that do not scope their subscriptions.
pub const DEFAULT_TAG: &str = "";

type Subscriber = Arc<dyn Fn() + Send + Sync>;

/// A generic handler for events keyed by an enum-like value.
pub struct EventHandler<E> {
    subscribers: Mutex<HashMap<E, BTreeMap<String, Vec<Subscriber>>>>,
}

impl<E> Default for EventHandler<E> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
        }
    }
}

impl<E> EventHandler<E>
where
    E: Eq + Hash + Clone + fmt::Debug,
{
    /// Creates an empty handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for every event in `events` under `tag`.
    pub fn subscribe<F>(&self, events: &[E], tag: &str, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let callback: Subscriber = Arc::new(callback);
        let mut subscribers = self.subscribers.lock();
        for event in events {
            subscribers
                .entry(event.clone())
                .or_default()
                .entry(tag.to_string())
                .or_default()
                .push(Arc::clone(&callback));
        }
        trace!(?events, tag, "subscribed");
    }

    /// Removes every subscriber.
    pub fn clear_subscribers(&self) {
        self.subscribers.lock().clear();
    }

    /// Removes the subscribers registered under `tag`, keeping all others.
    pub fn clear_subscribers_tagged(&self, tag: &str) {
        let mut subscribers = self.subscribers.lock();
        for tags in subscribers.values_mut() {
            tags.remove(tag);
        }
        subscribers.retain(|_, tags| !tags.is_empty());
    }

    /// Invokes every callback registered for `event`.
    ///
    /// Within a tag callbacks run in registration order; tags run in
    /// ascending order.
    pub fn handle_subscribers(&self, event: &E) {
        let snapshot: Vec<Subscriber> = {
            let subscribers = self.subscribers.lock();
            match subscribers.get(event) {
                Some(tags) => tags.values().flatten().cloned().collect(),
                None => Vec::new(),
            }
        };

        trace!(?event, count = snapshot.len(), "dispatching");
        for callback in snapshot {
            callback();
        }
    }

    /// Returns the number of callbacks registered for `event` across all tags.
    #[must_use]
    pub fn subscriber_count(&self, event: &E) -> usize {
        self.subscribers
            .lock()
            .get(event)
            .map_or(0, |tags| tags.values().map(Vec::len).sum())
    }

    /// Returns true if no callbacks are registered at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.lock().is_empty()
    }
}

impl<E> fmt::Debug for EventHandler<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler")
            .field("events", &self.subscribers.lock().len())
            .finish_non_exhaustive()
    }
}
