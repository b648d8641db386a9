//! Prelude module for Conduit.
//!
//! ```ignore
//! use conduit::prelude::*;
//! ```
//!
//! This provides access to:
//! - The dispatcher and its builder (`Api`, `ApiBuilder`)
//! - Endpoints and their operations (`Endpoint`, `EndpointOperatable`)
//! - Results and errors (`Response`, `NetworkError`, `Decoded`)
//! - Listeners and connectivity (`NetworkListener`, `ConnectivityStatus`)

pub use conduit_net::prelude::*;

pub use conduit_core::{LifecycleEvent, LifecycleSource};
pub use conduit_net::{
    ApiConfig, CachePolicy, Credentials, FailureFamily, HttpErrorReason, ListenerId,
    MultipartForm, Session, TextStrategy,
};
