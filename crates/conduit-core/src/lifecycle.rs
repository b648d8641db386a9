//! Host process lifecycle events.
//!
//! Conduit does not assume any particular host lifecycle API. Instead the
//! host application owns a [`LifecycleSource`] and reports transitions into
//! it; components that care (for example the connectivity monitor owned by
//! the dispatcher) subscribe to it.
//!
//! # Example
//!
//! ```
//! use conduit_core::{LifecycleEvent, LifecycleSource};
//!
//! let lifecycle = LifecycleSource::new();
//! let id = lifecycle.subscribe(|event| {
//!     println!("host moved to {:?}", event);
//! });
//!
//! lifecycle.enter_background();
//! lifecycle.enter_foreground();
//! assert_eq!(lifecycle.last_event(), Some(LifecycleEvent::Foreground));
//! lifecycle.unsubscribe(id);
//! ```

use parking_lot::Mutex;

use crate::logging::targets;
use crate::signal::{ConnectionId, Signal};

/// A foreground/background transition of the host process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// The process became active again.
    Foreground,
    /// The process moved to the background.
    Background,
}

/// Event source the host process drives on lifecycle transitions.
#[derive(Debug, Default)]
pub struct LifecycleSource {
    changed: Signal<LifecycleEvent>,
    last: Mutex<Option<LifecycleEvent>>,
}

impl LifecycleSource {
    /// Create a source with no recorded transition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to transitions.
    pub fn subscribe<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.changed.connect(slot)
    }

    /// Remove a subscription. Returns `true` if it existed.
    pub fn unsubscribe(&self, id: ConnectionId) -> bool {
        self.changed.disconnect(id)
    }

    /// Number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.changed.connection_count()
    }

    /// The most recently reported transition, if any.
    pub fn last_event(&self) -> Option<LifecycleEvent> {
        *self.last.lock()
    }

    /// Report that the host entered the foreground.
    pub fn enter_foreground(&self) {
        self.report(LifecycleEvent::Foreground);
    }

    /// Report that the host entered the background.
    pub fn enter_background(&self) {
        self.report(LifecycleEvent::Background);
    }

    /// Report a transition. Repeated reports of the same event are delivered
    /// again; subscribers are expected to be idempotent.
    pub fn report(&self, event: LifecycleEvent) {
        *self.last.lock() = Some(event);
        tracing::debug!(target: targets::LIFECYCLE, ?event, "lifecycle transition");
        self.changed.emit(event);
    }
}
