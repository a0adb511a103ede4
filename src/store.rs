//! Last-known state with synchronous observer notification.
//!
//! Every accepted [`StateStore::update`] overwrites the stored value and then
//! calls every registered observer, in registration order, before returning.
//! There is no change detection: the server pushes snapshots and each one is
//! passed on, even when it equals the stored value.
//!
//! Observers run on the caller's thread and must not block. They may call back
//! into the store, because no lock is held while they run. A panic in one
//! observer is logged and does not keep the others from being called.

use std::{
    collections::HashMap,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError, Weak,
    },
};

use crate::state::{StateKey, StateValue};

/// Callback invoked with the key and new value of every update.
pub type Observer = Arc<dyn Fn(StateKey, &StateValue) + Send + Sync>;

#[derive(Default)]
pub struct StateStore {
    values: Mutex<HashMap<StateKey, StateValue>>,
    observers: Mutex<Vec<(u64, Observer)>>,
    next_id: AtomicU64,
}

impl StateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last stored value for `key`, if any.
    #[must_use]
    pub fn get(&self, key: StateKey) -> Option<StateValue> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    /// Stores `value` under its key and notifies every observer.
    pub fn update(&self, value: impl Into<StateValue>) {
        let value = value.into();
        let key = value.key();
        trace!("updating {key}: {value:?}");

        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value.clone());

        // Snapshot so that observers may (un)subscribe while being notified.
        let observers: Vec<Observer> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in observers {
            // A panicking observer must not take the connection task down.
            if panic::catch_unwind(AssertUnwindSafe(|| observer(key, &value))).is_err() {
                error!("observer panicked while handling {key}");
            }
        }
    }

    /// Registers an observer until the returned handle is unsubscribed or the
    /// store is dropped.
    pub fn subscribe<F>(self: &Arc<Self>, observer: F) -> Subscription
    where
        F: Fn(StateKey, &StateValue) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(observer)));
        debug!("observer {id} subscribed");

        Subscription {
            id,
            store: Arc::downgrade(self),
        }
    }

    /// Returns the number of registered observers.
    #[must_use]
    pub fn observers(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn unsubscribe(&self, id: u64) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(observer, _)| *observer != id);
        debug!("observer {id} unsubscribed");
    }
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field(
                "values",
                &*self.values.lock().unwrap_or_else(PoisonError::into_inner),
            )
            .field("observers", &self.observers())
            .finish_non_exhaustive()
    }
}

/// Handle to a registered observer.
///
/// Dropping the handle keeps the observer registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    store: Weak<StateStore>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(store) = self.store.upgrade() {
            store.unsubscribe(self.id);
        }
    }
}
