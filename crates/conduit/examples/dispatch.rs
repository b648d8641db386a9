//! Conduit dispatch walkthrough
//!
//! Exercises the dispatcher end to end against the in-memory transport:
//! - classified failures reaching both listeners and callers
//! - path-scoped cancellation
//! - connectivity transitions and background suspension
//!
//! Run with: RUST_LOG=debug cargo run -p conduit --example dispatch

use std::sync::Arc;

use bytes::Bytes;
use conduit::prelude::*;
use conduit::{ManualPathSource, MockTransport, PathSnapshot, TransportOutcome};
use tracing_subscriber::EnvFilter;

/// Signs the user out on 401 and reports reachability.
struct SessionGuard;

impl NetworkListener for SessionGuard {
    fn on_unauthorized(&self, response: &Response) {
        tracing::warn!(path = %response.request.path, "session expired");
    }

    fn on_connectivity_changed(&self, new: ConnectivityStatus, old: ConnectivityStatus) {
        tracing::info!("network: {old} -> {new}");
    }

    fn on_suspended(&self) {
        tracing::info!("network monitoring suspended");
    }
}

fn main() -> Result<(), NetworkError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let transport = Arc::new(MockTransport::with_responder(|request| match request.path.as_str() {
        "/status" => Some(TransportOutcome::status(200, Some(Bytes::from_static(b"{\"ok\":true}")))),
        "/me" => Some(TransportOutcome::status(401, None)),
        _ => None,
    }));
    let reachability = Arc::new(ManualPathSource::with_initial(PathSnapshot::connected(
        ConnectionKind::Wifi,
    )));
    let lifecycle = Arc::new(LifecycleSource::new());

    let api = Api::builder("https://api.example.com")
        .default_header("Accept", "application/json")
        .transport(transport.clone())
        .path_source(reachability.clone())
        .lifecycle(lifecycle.clone())
        .build()?;

    let guard = Arc::new(SessionGuard);
    api.add_listener(&guard);
    api.start_network_monitoring(DeliveryQueue::Immediate)?;

    api.get("/status")
        .on_decoded(JsonStrategy::new().key_path("ok"), |decoded: Decoded<bool>| {
            println!("status ok: {:?}", decoded.value);
        })
        .build()
        .send();

    api.get("/me")
        .on_response(|response| println!("/me -> {:?}", response.error))
        .build()
        .send();

    for _ in 0..3 {
        api.get("/repos")
            .ignore_result_on_cancel(false)
            .on_response(|response| println!("/repos cancelled: {}", response.error.is_some()))
            .build()
            .send();
    }
    println!("in flight: {}", api.registry().task_count());
    println!("cancelled: {}", api.cancel_endpoints_with_path("/repos"));

    reachability.push(PathSnapshot::disconnected());
    lifecycle.enter_background();
    reachability.push(PathSnapshot::connected(ConnectionKind::Ethernet));
    lifecycle.enter_foreground();
    println!("final status: {}", api.network_status());

    api.stop_network_monitoring();
    Ok(())
}
