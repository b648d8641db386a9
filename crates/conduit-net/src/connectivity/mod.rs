//! Connectivity monitoring.
//!
//! [`ConnectivityMonitor`] turns the raw path updates of a [`PathSource`]
//! into a small status state machine:
//!
//! ```text
//! Unavailable ──start──▶ Undetermined ⇄ Connected(kind) ⇄ Disconnected(last)
//!      ▲                       ▲
//!      └──stop──  Suspended ───┘ resume
//! ```
//!
//! Every status change is broadcast on [`ConnectivityMonitor::status_changed`]
//! as a [`StatusChange`] pairing the new status with the previous one.
//!
//! Two sources ship with the crate: [`ManualPathSource`], driven by the host,
//! and `InterfacePathSource` (feature `interface-monitor`), which watches the
//! operating system's network interfaces.

#[cfg(feature = "interface-monitor")]
mod interface;
mod monitor;
mod source;

#[cfg(feature = "interface-monitor")]
pub use interface::InterfacePathSource;
pub use monitor::{ConnectivityMonitor, DeliveryQueue};
pub use source::{ManualPathSource, PathCallback, PathSnapshot, PathSource};

use serde::{Deserialize, Serialize};

/// The physical link a connection runs over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// Wireless LAN.
    Wifi,
    /// Mobile data.
    Cellular,
    /// Wired ethernet.
    Ethernet,
    /// Loopback only.
    Loopback,
    /// Any other interface type.
    Other,
}

impl std::fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wifi => write!(f, "wifi"),
            Self::Cellular => write!(f, "cellular"),
            Self::Ethernet => write!(f, "ethernet"),
            Self::Loopback => write!(f, "loopback"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Reachability status as seen by the monitor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectivityStatus {
    /// No monitor attached, or never started.
    #[default]
    Unavailable,
    /// Monitor started, status not yet resolved.
    Undetermined,
    /// A usable path exists.
    Connected(ConnectionKind),
    /// No usable path; carries the kind of the last connection, if any.
    Disconnected(Option<ConnectionKind>),
    /// Monitoring paused while the host is in the background.
    Suspended,
}

impl ConnectivityStatus {
    /// Whether a usable path exists.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }

    /// The kind of the current or most recent connection.
    pub fn connection_kind(&self) -> Option<ConnectionKind> {
        match self {
            Self::Connected(kind) => Some(*kind),
            Self::Disconnected(last) => *last,
            _ => None,
        }
    }
}

impl std::fmt::Display for ConnectivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable => write!(f, "unavailable"),
            Self::Undetermined => write!(f, "undetermined"),
            Self::Connected(kind) => write!(f, "connected({kind})"),
            Self::Disconnected(Some(kind)) => write!(f, "disconnected({kind})"),
            Self::Disconnected(None) => write!(f, "disconnected"),
            Self::Suspended => write!(f, "suspended"),
        }
    }
}

/// One status transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusChange {
    /// Status after the transition.
    pub new: ConnectivityStatus,
    /// Status before the transition.
    pub old: ConnectivityStatus,
}
