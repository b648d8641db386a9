//! Global network listeners.
//!
//! A [`NetworkListener`] receives classified failures and connectivity
//! changes for every endpoint an [`Api`](crate::dispatch::Api) dispatches.
//! Listeners run in parallel with, not instead of, each endpoint's own
//! continuation. Every method has an empty default, so an implementation
//! only overrides what it cares about.
//!
//! The dispatcher holds listeners weakly: dropping the last `Arc` to a
//! listener unregisters it the next time listeners are notified.

use crate::connectivity::{ConnectionKind, ConnectivityStatus};
use crate::response::Response;

pub use conduit_core::ObserverId as ListenerId;

/// Observer of failures and connectivity across all endpoints.
#[allow(unused_variables)]
pub trait NetworkListener: Send + Sync {
    /// A request was rejected with HTTP 401.
    fn on_unauthorized(&self, response: &Response) {}

    /// A request failed with a 4xx status other than 401.
    fn on_defective_client(&self, response: &Response) {}

    /// A request failed with a 5xx status.
    fn on_unresponsive_server(&self, response: &Response) {}

    /// A request failed because the network could not be reached.
    fn on_unavailable_network(&self, response: &Response) {}

    /// Connectivity moved from `old` to `new`.
    fn on_connectivity_changed(&self, new: ConnectivityStatus, old: ConnectivityStatus) {}

    /// A usable path over `kind` became available.
    fn on_network_connected(&self, kind: ConnectionKind) {}

    /// The usable path was lost; `last` is the kind it ran over.
    fn on_network_disconnected(&self, last: Option<ConnectionKind>) {}

    /// Monitoring paused because the host went to the background.
    fn on_suspended(&self) {}
}
