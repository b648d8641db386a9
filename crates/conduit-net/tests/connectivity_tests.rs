//! Connectivity monitoring through the dispatcher's listeners.

use std::sync::Arc;
use std::time::Duration;

use conduit_core::LifecycleSource;
use conduit_net::{
    Api, ConnectionKind, ConnectivityMonitor, ConnectivityStatus, DeliveryQueue, ManualPathSource,
    MockTransport, NetworkListener, NoopLogger, PathSnapshot, StatusChange,
};
use parking_lot::Mutex;

#[derive(Default)]
struct Watcher {
    changes: Mutex<Vec<(ConnectivityStatus, ConnectivityStatus)>>,
    connected: Mutex<Vec<ConnectionKind>>,
    disconnected: Mutex<Vec<Option<ConnectionKind>>>,
    suspended: Mutex<usize>,
}

impl NetworkListener for Watcher {
    fn on_connectivity_changed(&self, new: ConnectivityStatus, old: ConnectivityStatus) {
        self.changes.lock().push((new, old));
    }

    fn on_network_connected(&self, kind: ConnectionKind) {
        self.connected.lock().push(kind);
    }

    fn on_network_disconnected(&self, last: Option<ConnectionKind>) {
        self.disconnected.lock().push(last);
    }

    fn on_suspended(&self) {
        *self.suspended.lock() += 1;
    }
}

fn api_with(source: &Arc<ManualPathSource>) -> Api {
    Api::builder("https://api.example.com")
        .transport(MockTransport::new())
        .logger(NoopLogger)
        .path_source(source.clone())
        .build()
        .expect("Failed to build api")
}

#[test]
fn test_transitions_are_paired() {
    let source = Arc::new(ManualPathSource::new());
    let api = api_with(&source);
    let watcher = Arc::new(Watcher::default());
    api.add_listener(&watcher);

    assert_eq!(api.network_status(), ConnectivityStatus::Unavailable);

    source.push(PathSnapshot::connected(ConnectionKind::Wifi));
    api.start_network_monitoring(DeliveryQueue::Immediate)
        .expect("monitor starts");
    assert_eq!(
        api.network_status(),
        ConnectivityStatus::Connected(ConnectionKind::Wifi)
    );

    source.push(PathSnapshot::disconnected());
    assert_eq!(
        api.network_status(),
        ConnectivityStatus::Disconnected(Some(ConnectionKind::Wifi))
    );

    assert_eq!(
        *watcher.changes.lock(),
        vec![
            (
                ConnectivityStatus::Connected(ConnectionKind::Wifi),
                ConnectivityStatus::Unavailable
            ),
            (
                ConnectivityStatus::Disconnected(Some(ConnectionKind::Wifi)),
                ConnectivityStatus::Connected(ConnectionKind::Wifi)
            ),
        ]
    );
    assert_eq!(*watcher.connected.lock(), vec![ConnectionKind::Wifi]);
    assert_eq!(
        *watcher.disconnected.lock(),
        vec![Some(ConnectionKind::Wifi)]
    );
}

#[test]
fn test_start_without_reading_is_undetermined() {
    let source = Arc::new(ManualPathSource::new());
    let api = api_with(&source);
    let watcher = Arc::new(Watcher::default());
    api.add_listener(&watcher);

    api.start_network_monitoring(DeliveryQueue::Immediate)
        .expect("monitor starts");
    api.start_network_monitoring(DeliveryQueue::Immediate)
        .expect("second start is a no-op");

    assert_eq!(api.network_status(), ConnectivityStatus::Undetermined);
    assert_eq!(watcher.changes.lock().len(), 1);

    source.push(PathSnapshot::connected(ConnectionKind::Ethernet));
    assert_eq!(
        api.network_status(),
        ConnectivityStatus::Connected(ConnectionKind::Ethernet)
    );
}

#[test]
fn test_stop_releases_source() {
    let source = Arc::new(ManualPathSource::with_initial(PathSnapshot::connected(
        ConnectionKind::Cellular,
    )));
    let api = api_with(&source);
    let watcher = Arc::new(Watcher::default());
    api.add_listener(&watcher);

    api.start_network_monitoring(DeliveryQueue::Immediate)
        .expect("monitor starts");
    assert!(source.is_started());

    api.stop_network_monitoring();
    assert!(!source.is_started());
    assert_eq!(api.network_status(), ConnectivityStatus::Unavailable);

    source.push(PathSnapshot::disconnected());
    assert_eq!(api.network_status(), ConnectivityStatus::Unavailable);
    assert_eq!(
        watcher.changes.lock().last(),
        Some(&(
            ConnectivityStatus::Unavailable,
            ConnectivityStatus::Connected(ConnectionKind::Cellular)
        ))
    );
}

#[test]
fn test_lifecycle_suspends_and_resumes() {
    let source = Arc::new(ManualPathSource::with_initial(PathSnapshot::connected(
        ConnectionKind::Wifi,
    )));
    let lifecycle = Arc::new(LifecycleSource::new());
    let api = Api::builder("https://api.example.com")
        .transport(MockTransport::new())
        .logger(NoopLogger)
        .path_source(source.clone())
        .lifecycle(lifecycle.clone())
        .build()
        .expect("Failed to build api");
    let watcher = Arc::new(Watcher::default());
    api.add_listener(&watcher);

    api.start_network_monitoring(DeliveryQueue::Immediate)
        .expect("monitor starts");

    lifecycle.enter_background();
    assert_eq!(api.network_status(), ConnectivityStatus::Suspended);
    assert!(!source.is_started());
    assert_eq!(*watcher.suspended.lock(), 1);

    source.push(PathSnapshot::connected(ConnectionKind::Cellular));
    lifecycle.enter_foreground();
    assert!(source.is_started());
    assert_eq!(
        api.network_status(),
        ConnectivityStatus::Connected(ConnectionKind::Cellular)
    );

    api.detach_lifecycle();
    assert_eq!(lifecycle.subscriber_count(), 0);
    lifecycle.enter_background();
    assert!(api.network_status().is_connected());
}

#[test]
fn test_foreground_without_suspend_is_ignored() {
    let source = Arc::new(ManualPathSource::new());
    let lifecycle = Arc::new(LifecycleSource::new());
    let api = api_with(&source);
    api.attach_lifecycle(&lifecycle);

    lifecycle.enter_foreground();
    assert_eq!(api.network_status(), ConnectivityStatus::Unavailable);
    assert!(!source.is_started());
}

#[test]
fn test_dropping_api_unsubscribes_lifecycle() {
    let source = Arc::new(ManualPathSource::new());
    let lifecycle = Arc::new(LifecycleSource::new());
    let api = api_with(&source);
    api.attach_lifecycle(&lifecycle);
    assert_eq!(lifecycle.subscriber_count(), 1);

    drop(api);
    assert_eq!(lifecycle.subscriber_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_runtime_queue_preserves_order() {
    let source = Arc::new(ManualPathSource::new());
    let monitor = ConnectivityMonitor::new(source.clone());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<StatusChange>();
    monitor.status_changed.connect(move |change| {
        let _ = tx.send(*change);
    });

    monitor
        .start(DeliveryQueue::Runtime(tokio::runtime::Handle::current()))
        .expect("monitor starts");
    source.push(PathSnapshot::connected(ConnectionKind::Wifi));
    source.push(PathSnapshot::disconnected());

    let mut received = Vec::new();
    for _ in 0..3 {
        let change = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("change delivered in time")
            .expect("channel open");
        received.push(change.new);
    }

    assert_eq!(
        received,
        vec![
            ConnectivityStatus::Undetermined,
            ConnectivityStatus::Connected(ConnectionKind::Wifi),
            ConnectivityStatus::Disconnected(Some(ConnectionKind::Wifi)),
        ]
    );
    assert_eq!(
        monitor.status(),
        ConnectivityStatus::Disconnected(Some(ConnectionKind::Wifi))
    );
}
