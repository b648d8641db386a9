//! Conduit: client-side endpoint dispatch.
//!
//! This is the umbrella crate that re-exports the public APIs of
//! `conduit-core` and `conduit-net`.
//!
//! # Example
//!
//! ```no_run
//! use conduit::prelude::*;
//!
//! fn main() -> Result<(), NetworkError> {
//!     let api = Api::builder("https://api.example.com")
//!         .default_header("Accept", "application/json")
//!         .build()?;
//!
//!     api.get("/users/42")
//!         .on_response(|response| println!("{:?}", response.status_code))
//!         .build()
//!         .send();
//!     Ok(())
//! }
//! ```

pub use conduit_net::*;

pub mod prelude;

/// Signals, observer sets and host lifecycle events.
pub use conduit_core;

pub use conduit_core::{LifecycleEvent, LifecycleSource, Signal};
