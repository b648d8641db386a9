//! Path source backed by the operating system's interface table.

use conduit_core::logging::targets;
use netdev::interface::types::InterfaceType;
use parking_lot::Mutex;

use super::source::{PathCallback, PathSnapshot, PathSource};
use super::ConnectionKind;
use crate::error::{NetworkError, Result};

/// Watches network interfaces with `netwatcher` and reads their state with
/// `netdev`.
///
/// A path counts as satisfied when some interface is up, is not loopback,
/// and has at least one address. The default interface, when it qualifies,
/// decides the reported [`ConnectionKind`].
///
/// ```ignore
/// let monitor = ConnectivityMonitor::new(InterfacePathSource::new());
/// monitor.start(DeliveryQueue::Immediate)?;
/// ```
#[derive(Default)]
pub struct InterfacePathSource {
    watch_handle: Mutex<Option<netwatcher::WatchHandle>>,
}

impl InterfacePathSource {
    /// Create a source; nothing is watched until [`PathSource::start`].
    pub fn new() -> Self {
        Self::default()
    }
}

impl PathSource for InterfacePathSource {
    fn start(&self, callback: PathCallback) -> Result<()> {
        let mut watch_handle = self.watch_handle.lock();
        if watch_handle.is_some() {
            return Ok(());
        }

        let handle = netwatcher::watch_interfaces(move |update| {
            tracing::trace!(
                target: targets::CONNECTIVITY,
                added = update.diff.added.len(),
                removed = update.diff.removed.len(),
                "interface table changed"
            );
            callback(read_path());
        })
        .map_err(|e| NetworkError::unexpected(format!("failed to watch interfaces: {e}")))?;

        *watch_handle = Some(handle);
        Ok(())
    }

    fn stop(&self) {
        self.watch_handle.lock().take();
    }

    fn current_path(&self) -> Option<PathSnapshot> {
        Some(read_path())
    }
}

impl std::fmt::Debug for InterfacePathSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterfacePathSource")
            .field("watching", &self.watch_handle.lock().is_some())
            .finish()
    }
}

fn is_usable(iface: &netdev::Interface) -> bool {
    iface.is_up() && !iface.is_loopback() && (!iface.ipv4.is_empty() || !iface.ipv6.is_empty())
}

fn read_path() -> PathSnapshot {
    if let Ok(default) = netdev::get_default_interface()
        && is_usable(&default)
    {
        return PathSnapshot::connected(kind_of(&default));
    }

    match netdev::get_interfaces().iter().find(|iface| is_usable(iface)) {
        Some(iface) => PathSnapshot::connected(kind_of(iface)),
        None => PathSnapshot::disconnected(),
    }
}

fn kind_of(iface: &netdev::Interface) -> ConnectionKind {
    if iface.is_loopback() {
        return ConnectionKind::Loopback;
    }
    match iface.if_type {
        InterfaceType::Wireless80211 | InterfaceType::PeerToPeerWireless => ConnectionKind::Wifi,
        InterfaceType::Wwanpp | InterfaceType::Wwanpp2 => ConnectionKind::Cellular,
        InterfaceType::Ethernet
        | InterfaceType::FastEthernetT
        | InterfaceType::FastEthernetFx
        | InterfaceType::GigabitEthernet => ConnectionKind::Ethernet,
        _ => ConnectionKind::Other,
    }
}
