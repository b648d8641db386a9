//! Path sources: where raw reachability updates come from.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{ConnectionKind, ConnectivityStatus};
use crate::error::Result;

/// One raw reachability reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathSnapshot {
    /// Whether a usable path to the network exists.
    pub satisfied: bool,
    /// The link the path runs over, if known.
    pub kind: Option<ConnectionKind>,
}

impl PathSnapshot {
    /// A usable path over `kind`.
    pub fn connected(kind: ConnectionKind) -> Self {
        Self {
            satisfied: true,
            kind: Some(kind),
        }
    }

    /// No usable path.
    pub fn disconnected() -> Self {
        Self {
            satisfied: false,
            kind: None,
        }
    }

    /// The status this reading implies, given the status before it.
    pub(crate) fn status_after(&self, previous: ConnectivityStatus) -> ConnectivityStatus {
        if self.satisfied {
            ConnectivityStatus::Connected(self.kind.unwrap_or(ConnectionKind::Other))
        } else {
            ConnectivityStatus::Disconnected(self.kind.or(previous.connection_kind()))
        }
    }
}

/// Callback a source invokes with every new reading.
pub type PathCallback = Arc<dyn Fn(PathSnapshot) + Send + Sync>;

/// A platform reachability facility.
pub trait PathSource: Send + Sync {
    /// Begin delivering readings to `callback`.
    fn start(&self, callback: PathCallback) -> Result<()>;

    /// Stop delivering readings and release platform resources.
    fn stop(&self);

    /// The latest reading, if the source has one.
    fn current_path(&self) -> Option<PathSnapshot>;
}

#[derive(Default)]
struct ManualState {
    callback: Option<PathCallback>,
    current: Option<PathSnapshot>,
}

/// A source driven by the host through [`push`](Self::push).
///
/// Useful for tests and for hosts that already own a reachability API.
#[derive(Default)]
pub struct ManualPathSource {
    state: Mutex<ManualState>,
}

impl ManualPathSource {
    /// Create a source with no reading yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source whose first reading is `snapshot`.
    pub fn with_initial(snapshot: PathSnapshot) -> Self {
        Self {
            state: Mutex::new(ManualState {
                callback: None,
                current: Some(snapshot),
            }),
        }
    }

    /// Record a new reading and deliver it if the source is started.
    pub fn push(&self, snapshot: PathSnapshot) {
        let callback = {
            let mut state = self.state.lock();
            state.current = Some(snapshot);
            state.callback.clone()
        };
        if let Some(callback) = callback {
            callback(snapshot);
        }
    }

    /// Whether a consumer is attached.
    pub fn is_started(&self) -> bool {
        self.state.lock().callback.is_some()
    }
}

impl PathSource for ManualPathSource {
    fn start(&self, callback: PathCallback) -> Result<()> {
        self.state.lock().callback = Some(callback);
        Ok(())
    }

    fn stop(&self) {
        self.state.lock().callback = None;
    }

    fn current_path(&self) -> Option<PathSnapshot> {
        self.state.lock().current
    }
}

impl<T: PathSource + ?Sized> PathSource for Arc<T> {
    fn start(&self, callback: PathCallback) -> Result<()> {
        (**self).start(callback)
    }

    fn stop(&self) {
        (**self).stop()
    }

    fn current_path(&self) -> Option<PathSnapshot> {
        (**self).current_path()
    }
}
