//! The connectivity status state machine.

use std::sync::{Arc, Weak};

use conduit_core::Signal;
use conduit_core::logging::targets;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use super::source::{PathCallback, PathSnapshot, PathSource};
use super::{ConnectivityStatus, StatusChange};
use crate::error::Result;

/// Where status changes are delivered.
#[derive(Clone, Debug, Default)]
pub enum DeliveryQueue {
    /// On the thread that observed the change.
    #[default]
    Immediate,
    /// In order, from a single task on this runtime.
    ///
    /// The task is spawned the first time the monitor starts with a runtime
    /// queue and is reused by every later start, suspend and resume, so
    /// changes from consecutive runs never overtake each other.
    Runtime(Handle),
}

enum Delivery {
    Immediate,
    Queued(mpsc::UnboundedSender<StatusChange>),
}

struct MonitorInner {
    running: bool,
    status: ConnectivityStatus,
    /// Bumped on every start/stop so callbacks from an old run are ignored.
    generation: u64,
    queue: Option<DeliveryQueue>,
    delivery: Option<Delivery>,
    /// Sender to the drain task; kept across runs.
    drain: Option<mpsc::UnboundedSender<StatusChange>>,
}

impl MonitorInner {
    /// Record `new` and return the change to deliver, if any.
    fn transition(&mut self, new: ConnectivityStatus) -> Option<StatusChange> {
        let old = self.status;
        if old == new {
            return None;
        }
        self.status = new;
        let change = StatusChange { new, old };
        match &self.delivery {
            Some(Delivery::Queued(tx)) => {
                let _ = tx.send(change);
                None
            }
            Some(Delivery::Immediate) | None => Some(change),
        }
    }

    fn open_delivery(
        &mut self,
        queue: &DeliveryQueue,
        signal: &Arc<Signal<StatusChange>>,
    ) -> Delivery {
        let DeliveryQueue::Runtime(handle) = queue else {
            return Delivery::Immediate;
        };
        if let Some(tx) = self.drain.as_ref().filter(|tx| !tx.is_closed()) {
            return Delivery::Queued(tx.clone());
        }
        let (tx, mut rx) = mpsc::unbounded_channel::<StatusChange>();
        let signal = Arc::clone(signal);
        handle.spawn(async move {
            while let Some(change) = rx.recv().await {
                signal.emit(change);
            }
        });
        self.drain = Some(tx.clone());
        Delivery::Queued(tx)
    }
}

/// Tracks reachability and broadcasts status transitions.
///
/// The monitor updates its status before broadcasting, so
/// [`status`](Self::status) already returns the new value inside a
/// `status_changed` slot.
///
/// # Example
///
/// ```ignore
/// use conduit_net::connectivity::{ConnectivityMonitor, DeliveryQueue, ManualPathSource};
///
/// let monitor = ConnectivityMonitor::new(ManualPathSource::new());
/// monitor.status_changed.connect(|change| {
///     println!("{} -> {}", change.old, change.new);
/// });
/// monitor.start(DeliveryQueue::Immediate)?;
/// ```
pub struct ConnectivityMonitor {
    /// Emitted with every status transition.
    pub status_changed: Arc<Signal<StatusChange>>,
    source: Arc<dyn PathSource>,
    inner: Arc<Mutex<MonitorInner>>,
}

impl ConnectivityMonitor {
    /// Create a stopped monitor reading from `source`.
    pub fn new(source: impl PathSource + 'static) -> Self {
        Self::with_source(Arc::new(source))
    }

    /// Create a stopped monitor reading from a shared source.
    pub fn with_source(source: Arc<dyn PathSource>) -> Self {
        Self {
            status_changed: Arc::new(Signal::new()),
            source,
            inner: Arc::new(Mutex::new(MonitorInner {
                running: false,
                status: ConnectivityStatus::Unavailable,
                generation: 0,
                queue: None,
                delivery: None,
                drain: None,
            })),
        }
    }

    /// The current status.
    pub fn status(&self) -> ConnectivityStatus {
        self.inner.lock().status
    }

    /// Whether the monitor is attached to its source.
    pub fn is_running(&self) -> bool {
        self.inner.lock().running
    }

    /// Start monitoring. A no-op while already running.
    ///
    /// If the source already knows the current path the status resolves
    /// immediately; otherwise it becomes [`ConnectivityStatus::Undetermined`]
    /// until the first reading arrives.
    pub fn start(&self, queue: DeliveryQueue) -> Result<()> {
        let generation = {
            let mut inner = self.inner.lock();
            if inner.running {
                return Ok(());
            }
            inner.running = true;
            inner.generation += 1;
            let delivery = inner.open_delivery(&queue, &self.status_changed);
            inner.delivery = Some(delivery);
            inner.queue = Some(queue);
            inner.generation
        };

        if let Err(err) = self.source.start(self.path_callback(generation)) {
            tracing::warn!(target: targets::CONNECTIVITY, error = %err, "path source failed to start");
            let mut inner = self.inner.lock();
            inner.running = false;
            inner.generation += 1;
            inner.delivery = None;
            return Err(err);
        }

        let initial = self.source.current_path();
        let change = {
            let mut inner = self.inner.lock();
            let unresolved = matches!(
                inner.status,
                ConnectivityStatus::Unavailable | ConnectivityStatus::Suspended
            );
            if inner.generation != generation || !unresolved {
                None
            } else {
                let status = match initial {
                    Some(snapshot) => snapshot.status_after(inner.status),
                    None => ConnectivityStatus::Undetermined,
                };
                inner.transition(status)
            }
        };

        tracing::debug!(target: targets::CONNECTIVITY, status = %self.status(), "connectivity monitor started");
        self.deliver(change);
        Ok(())
    }

    /// Stop monitoring and release the source. A no-op while stopped.
    pub fn stop(&self) {
        self.halt(ConnectivityStatus::Unavailable, false);
    }

    /// Release the source because the host went to the background.
    ///
    /// The status becomes [`ConnectivityStatus::Suspended`]; [`resume`](Self::resume)
    /// restarts with the same delivery queue.
    pub fn suspend(&self) {
        self.halt(ConnectivityStatus::Suspended, true);
    }

    /// Re-run the start sequence after [`suspend`](Self::suspend).
    ///
    /// Does nothing unless the monitor is suspended.
    pub fn resume(&self) -> Result<()> {
        let queue = {
            let inner = self.inner.lock();
            if inner.status != ConnectivityStatus::Suspended {
                return Ok(());
            }
            inner.queue.clone().unwrap_or_default()
        };
        self.start(queue)
    }

    fn halt(&self, status: ConnectivityStatus, keep_queue: bool) {
        let change = {
            let mut inner = self.inner.lock();
            if !inner.running {
                return;
            }
            inner.running = false;
            inner.generation += 1;
            let change = inner.transition(status);
            inner.delivery = None;
            if !keep_queue {
                inner.queue = None;
            }
            change
        };
        self.source.stop();
        tracing::debug!(target: targets::CONNECTIVITY, %status, "connectivity monitor halted");
        self.deliver(change);
    }

    fn path_callback(&self, generation: u64) -> PathCallback {
        let inner: Weak<Mutex<MonitorInner>> = Arc::downgrade(&self.inner);
        let signal = Arc::clone(&self.status_changed);
        Arc::new(move |snapshot: PathSnapshot| {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let change = {
                let mut inner = inner.lock();
                if !inner.running || inner.generation != generation {
                    return;
                }
                let status = snapshot.status_after(inner.status);
                inner.transition(status)
            };
            if let Some(change) = change {
                tracing::debug!(target: targets::CONNECTIVITY, new = %change.new, old = %change.old, "connectivity changed");
                signal.emit(change);
            }
        })
    }

    fn deliver(&self, change: Option<StatusChange>) {
        if let Some(change) = change {
            self.status_changed.emit(change);
        }
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ConnectivityMonitor")
            .field("running", &inner.running)
            .field("status", &inner.status)
            .finish()
    }
}
