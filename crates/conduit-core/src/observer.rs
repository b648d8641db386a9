//! Weakly-held observer registry.
//!
//! [`ObserverSet<T>`] keeps a set of observers keyed by a stable
//! [`ObserverId`]. Observers are stored as [`Weak`] references: the set never
//! keeps an observer alive, and an observer that has been dropped is pruned
//! the next time the set is iterated. Registration lifetime is otherwise
//! explicit, via [`ObserverSet::insert`] and [`ObserverSet::remove`].
//!
//! All mutation and iteration is serialized through one mutex. Iteration
//! takes a snapshot of the live observers under the lock and invokes the
//! callback after releasing it, so callbacks may add or remove observers.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use conduit_core::ObserverSet;
//!
//! trait Watcher: Send + Sync {
//!     fn notify(&self, code: u16);
//! }
//!
//! struct Printer;
//! impl Watcher for Printer {
//!     fn notify(&self, code: u16) {
//!         println!("saw {code}");
//!     }
//! }
//!
//! let set: ObserverSet<dyn Watcher> = ObserverSet::new();
//! let printer: Arc<dyn Watcher> = Arc::new(Printer);
//! let id = set.insert(&printer);
//!
//! set.for_each(|watcher| watcher.notify(401));
//! assert!(set.remove(id));
//! ```

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::logging::targets;

new_key_type! {
    /// Stable identifier of an observer registered in an [`ObserverSet`].
    pub struct ObserverId;
}

/// A registry of weakly-held observers.
pub struct ObserverSet<T: ?Sized> {
    observers: Mutex<SlotMap<ObserverId, Weak<T>>>,
}

impl<T: ?Sized> Default for ObserverSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> ObserverSet<T> {
    /// Create an empty set.
    pub fn new() -> Self {
        Self {
            observers: Mutex::new(SlotMap::with_key()),
        }
    }

    /// Register an observer. The set only keeps a weak reference.
    pub fn insert(&self, observer: &Arc<T>) -> ObserverId {
        self.observers.lock().insert(Arc::downgrade(observer))
    }

    /// Remove an observer by ID.
    ///
    /// Returns `true` if the observer was registered.
    pub fn remove(&self, id: ObserverId) -> bool {
        self.observers.lock().remove(id).is_some()
    }

    /// Number of registered entries, including dead entries not yet pruned.
    pub fn len(&self) -> usize {
        self.observers.lock().len()
    }

    /// Whether no entries are registered.
    pub fn is_empty(&self) -> bool {
        self.observers.lock().is_empty()
    }

    /// Invoke `f` for every live observer.
    ///
    /// Dead entries encountered while taking the snapshot are pruned. Returns
    /// the number of observers that were invoked.
    pub fn for_each<F>(&self, mut f: F) -> usize
    where
        F: FnMut(&T),
    {
        let live: Vec<Arc<T>> = {
            let mut observers = self.observers.lock();
            let mut live = Vec::with_capacity(observers.len());
            observers.retain(|_, weak| match weak.upgrade() {
                Some(observer) => {
                    live.push(observer);
                    true
                }
                None => false,
            });
            live
        };

        tracing::trace!(target: targets::OBSERVER, observer_count = live.len(), "notifying observers");
        for observer in &live {
            f(observer.as_ref());
        }
        live.len()
    }
}

impl<T: ?Sized> std::fmt::Debug for ObserverSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSet")
            .field("len", &self.len())
            .finish()
    }
}
