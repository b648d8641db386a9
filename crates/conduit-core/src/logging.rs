//! Logging facilities for Conduit.
//!
//! Conduit uses the `tracing` crate for instrumentation. To see logs, install
//! a tracing subscriber in your application:
//!
//! ```ignore
//! fn main() {
//!     tracing_subscriber::fmt::init();
//!     // Your application code...
//! }
//! ```
//!
//! Every event is emitted with one of the [`targets`] below, so a filter such
//! as `RUST_LOG=conduit_net::dispatch=debug` narrows output to one subsystem.

/// Target names for log filtering.
pub mod targets {
    /// Core crate target.
    pub const CORE: &str = "conduit_core";
    /// Signal/slot system target.
    pub const SIGNAL: &str = "conduit_core::signal";
    /// Observer set target.
    pub const OBSERVER: &str = "conduit_core::observer";
    /// Host lifecycle target.
    pub const LIFECYCLE: &str = "conduit_core::lifecycle";
    /// Endpoint dispatch target.
    pub const DISPATCH: &str = "conduit_net::dispatch";
    /// Request/response log events.
    pub const HTTP: &str = "conduit_net::http";
    /// Task registry target.
    pub const REGISTRY: &str = "conduit_net::registry";
    /// Transport target.
    pub const TRANSPORT: &str = "conduit_net::transport";
    /// Connectivity monitor target.
    pub const CONNECTIVITY: &str = "conduit_net::connectivity";
    /// Session/credential storage target.
    pub const SESSION: &str = "conduit_net::session";
}

/// Span names used for tracing.
pub mod span_names {
    /// One endpoint dispatch attempt.
    pub const DISPATCH: &str = "conduit::dispatch";
    /// Completion handling for one dispatch attempt.
    pub const COMPLETION: &str = "conduit::completion";
}
