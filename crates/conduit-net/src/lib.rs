//! Endpoint dispatch for Conduit.
//!
//! This crate sits between application code that describes HTTP calls and a
//! transport that performs them:
//!
//! - **Endpoints**: [`Endpoint`], a configured and sendable HTTP operation
//!   with per-call behavior flags and a result continuation
//! - **Dispatcher**: [`Api`], which intercepts, dispatches, classifies and
//!   routes every call
//! - **Error taxonomy**: [`NetworkError`], one deterministic classification
//!   per failure
//! - **Task registry**: path-scoped cancellation of in-flight calls
//! - **Listeners**: global observers of failures and connectivity
//! - **Connectivity**: [`ConnectivityMonitor`], reachability status driven by
//!   a platform path source
//!
//! # Example
//!
//! ```ignore
//! use conduit_net::prelude::*;
//!
//! let api = Api::builder("https://api.example.com")
//!     .default_header("Accept", "application/json")
//!     .build()?;
//!
//! let endpoint = api
//!     .get("/users/42")
//!     .on_response(|response| {
//!         if let Some(error) = &response.error {
//!             eprintln!("request failed: {error}");
//!         }
//!     })
//!     .build();
//!
//! endpoint.send();
//!
//! // Later: abandon everything under /users.
//! api.cancel_endpoints_relative_to("/users");
//! ```
//!
//! # Listeners
//!
//! ```ignore
//! struct SignOut;
//!
//! impl NetworkListener for SignOut {
//!     fn on_unauthorized(&self, _response: &Response) {
//!         // drop the session
//!     }
//! }
//!
//! let listener = Arc::new(SignOut);
//! let id = api.add_listener(&listener);
//! ```
//!
//! # Features
//!
//! - `reqwest-transport` (default): [`ReqwestTransport`](transport::ReqwestTransport)
//! - `interface-monitor` (default): [`InterfacePathSource`](connectivity::InterfacePathSource)

pub mod classify;
pub mod connectivity;
pub mod dispatch;
pub mod endpoint;
mod error;
pub mod listener;
pub mod logger;
pub mod registry;
pub mod request;
pub mod response;
pub mod session;
pub mod transport;

pub use error::{
    ConnectionErrorReason, EndpointOperationError, FailureFamily, HttpErrorReason, NetworkError,
    RequestEncodingReason, ResponseSerializationReason, Result, TransportFailure,
};

pub use connectivity::{
    ConnectionKind, ConnectivityMonitor, ConnectivityStatus, DeliveryQueue, ManualPathSource,
    PathSnapshot, PathSource, StatusChange,
};
pub use dispatch::{Api, ApiBuilder, ApiConfig, Interceptor, Routing, route};
pub use endpoint::{Endpoint, EndpointBuilder, EndpointFlags, EndpointOperatable};
pub use listener::{ListenerId, NetworkListener};
pub use logger::{Logger, NoopLogger, TracingLogger};
pub use registry::TaskRegistry;
pub use request::{
    CachePolicy, HeaderPolicy, HttpMethod, MultipartForm, MultipartPart, OperationKind,
    RequestBody, RequestDescriptor,
};
pub use response::{Decoded, DecodeStrategy, JsonStrategy, RawStrategy, Response, TextStrategy};
pub use session::{Credentials, KeyValueStore, MemoryStore, Session};
pub use transport::{MockTask, MockTransport, TaskHandle, TaskId, Transport, TransportOutcome, TransportTask};

/// Commonly used types.
pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::{
        Api, ApiBuilder, ConnectionKind, ConnectivityStatus, Decoded, DeliveryQueue, Endpoint,
        EndpointFlags, EndpointOperatable, HeaderPolicy, HttpMethod, JsonStrategy, NetworkError,
        NetworkListener, Response, StatusChange,
    };
}
