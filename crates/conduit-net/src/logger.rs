//! Request/response logging hooks.
//!
//! The dispatcher calls [`Logger::log_request`] once per dispatch attempt and
//! [`Logger::log_response`] once per completion. [`TracingLogger`] is the
//! default and forwards pre-formatted events to `tracing`.

use std::time::Duration;

use conduit_core::logging::targets;

use crate::connectivity::StatusChange;
use crate::request::RequestDescriptor;
use crate::response::Response;

/// Receives request, response and connectivity log events.
pub trait Logger: Send + Sync {
    /// A request is about to be handed to the transport.
    fn log_request(&self, request: &RequestDescriptor);

    /// A dispatch attempt finished, successfully or not.
    fn log_response(&self, response: &Response);

    /// Connectivity changed.
    fn log_connectivity(&self, change: &StatusChange) {
        let _ = change;
    }
}

/// Logs through `tracing` on the `conduit_net::http` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log_request(&self, request: &RequestDescriptor) {
        tracing::info!(
            target: targets::HTTP,
            method = %request.method,
            path = %request.path,
            kind = request.kind.name(),
            body_bytes = request.body.len_hint(),
            "--> {} {}{}",
            request.method,
            request.base_url.trim_end_matches('/'),
            request.path
        );
    }

    fn log_response(&self, response: &Response) {
        let status = response
            .status_code
            .map(|s| s.to_string())
            .unwrap_or_else(|| "---".to_string());
        let size = response.data.as_ref().map_or(0, |d| d.len());
        let elapsed_ms = whole_millis(response.elapsed);

        match &response.error {
            None => tracing::info!(
                target: targets::HTTP,
                status = %status,
                elapsed_ms,
                body_bytes = size,
                "<-- {status} {} ({elapsed_ms}ms, {size} bytes)",
                response.request.summary()
            ),
            Some(error) => tracing::warn!(
                target: targets::HTTP,
                status = %status,
                elapsed_ms,
                body_bytes = size,
                error = %error,
                "<-- {status} {} ({elapsed_ms}ms): {error}",
                response.request.summary()
            ),
        }
    }

    fn log_connectivity(&self, change: &StatusChange) {
        tracing::info!(target: targets::HTTP, new = %change.new, old = %change.old, "connectivity {} -> {}", change.old, change.new);
    }
}

/// Milliseconds in `elapsed`, saturating at `u64::MAX`.
fn whole_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log_request(&self, _request: &RequestDescriptor) {}

    fn log_response(&self, _response: &Response) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_millis_saturates() {
        assert_eq!(whole_millis(Duration::from_micros(2500)), 2);
        assert_eq!(whole_millis(Duration::MAX), u64::MAX);
    }
}
