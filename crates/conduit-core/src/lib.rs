//! Core primitives for Conduit.
//!
//! This crate provides the small, transport-agnostic building blocks the
//! networking crate is assembled from:
//!
//! - **Signals**: [`Signal<Args>`], a thread-safe broadcast of values to
//!   connected slots
//! - **Observer sets**: [`ObserverSet<T>`], weakly-held observers keyed by a
//!   stable [`ObserverId`] and pruned while iterating
//! - **Lifecycle**: [`LifecycleSource`], an explicit foreground/background
//!   event source driven by the host process
//! - **Logging**: `tracing` target names shared by every crate
//!
//! # Signal Example
//!
//! ```
//! use conduit_core::Signal;
//!
//! let reachable = Signal::<bool>::new();
//! let id = reachable.connect(|online| println!("online: {online}"));
//! reachable.emit(true);
//! reachable.disconnect(id);
//! ```

pub mod lifecycle;
pub mod logging;
pub mod observer;
pub mod signal;

pub use lifecycle::{LifecycleEvent, LifecycleSource};
pub use observer::{ObserverId, ObserverSet};
pub use signal::{ConnectionGuard, ConnectionId, Signal};
