// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Listener registries.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

/// Handle returned by `subscribe`, used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A set of listeners notified synchronously, in subscription order.
///
/// A panicking listener is logged and skipped; it never stops delivery to the
/// others or propagates to the notifier.
pub struct Subscribers<T> {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(SubscriptionId, Listener<T>)>>,
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(Vec::new()),
        }
    }
}

impl<T> fmt::Debug for Subscribers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers").field("len", &self.len()).finish()
    }
}

impl<T> Subscribers<T> {
    /// Registers `listener`.
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns `false` if `id` was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Calls every listener with `event`.
    ///
    /// The registry lock is released before listeners run, so a listener may
    /// subscribe or unsubscribe without deadlocking.
    pub fn notify(&self, event: &T) {
        let snapshot: Vec<Listener<T>> = self.listeners.read().iter().map(|(_, listener)| Arc::clone(listener)).collect();
        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::warn!("listener panicked");
            }
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Returns `true` if nobody is listening.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn notifies_in_order_and_unsubscribes() {
        let subscribers = Subscribers::<u32>::default();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let first = {
            let seen = Arc::clone(&seen);
            subscribers.subscribe(move |v| seen.lock().push(("first", *v)))
        };
        {
            let seen = Arc::clone(&seen);
            subscribers.subscribe(move |v| seen.lock().push(("second", *v)));
        }

        subscribers.notify(&1);
        assert!(subscribers.unsubscribe(first));
        assert!(!subscribers.unsubscribe(first));
        subscribers.notify(&2);

        assert_eq!(*seen.lock(), vec![("first", 1), ("second", 1), ("second", 2)]);
    }

    #[test]
    fn panicking_listener_does_not_stop_delivery() {
        let subscribers = Subscribers::<()>::default();
        let count = Arc::new(AtomicUsize::new(0));

        subscribers.subscribe(|()| panic!("listener failure"));
        {
            let count = Arc::clone(&count);
            subscribers.subscribe(move |()| {
                count.fetch_add(1, Ordering::Relaxed);
            });
        }

        subscribers.notify(&());
        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert_eq!(subscribers.len(), 2);
    }
}
