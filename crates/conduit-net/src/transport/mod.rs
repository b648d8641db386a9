//! Transport abstraction.
//!
//! The transport performs the actual socket-level exchange. The dispatcher
//! only sees the [`Transport`] trait: it hands over a request snapshot and a
//! completion handler, and receives a [`TransportTask`] handle it can
//! register for cancellation.
//!
//! Two implementations ship with this crate:
//!
//! - [`ReqwestTransport`] (feature `reqwest-transport`): reqwest on a tokio runtime
//! - [`MockTransport`]: in-memory, manually completed tasks for tests and
//!   offline hosts

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use crate::error::{Result, TransportFailure};
use crate::request::RequestDescriptor;

mod mock;
#[cfg(feature = "reqwest-transport")]
mod reqwest_transport;

pub use mock::{MockTask, MockTransport};
#[cfg(feature = "reqwest-transport")]
pub use reqwest_transport::{ReqwestTransport, ReqwestTransportBuilder, ReqwestTransportConfig, runtime};

/// Process-unique identifier of a transport task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Allocate the next identifier.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Handle to one in-flight transport operation.
pub trait TransportTask: Send + Sync {
    /// Stable identifier.
    fn id(&self) -> TaskId;

    /// Whether the operation has not yet completed or been cancelled.
    fn is_in_progress(&self) -> bool;

    /// Cancel the operation. Best-effort and idempotent; a cancelled task
    /// completes with [`TransportFailure::Cancelled`] unless it already
    /// finished.
    fn cancel(&self);
}

/// Shared handle to a transport task.
pub type TaskHandle = Arc<dyn TransportTask>;

/// Raw result of one transport operation.
#[derive(Clone, Debug, Default)]
pub struct TransportOutcome {
    /// HTTP status code, if the server answered.
    pub status: Option<u16>,
    /// Response headers.
    pub headers: http::HeaderMap,
    /// Response body.
    pub data: Option<Bytes>,
    /// Transport failure, if the exchange did not complete.
    pub failure: Option<TransportFailure>,
    /// Set when the transport refused an otherwise completed exchange, for
    /// example a response that failed validation or a download that could
    /// not be written.
    pub rejection: Option<String>,
}

impl TransportOutcome {
    /// An outcome with a status and body.
    pub fn status(status: u16, data: impl Into<Option<Bytes>>) -> Self {
        Self {
            status: Some(status),
            data: data.into(),
            ..Self::default()
        }
    }

    /// An outcome with only a failure code.
    pub fn failure(failure: TransportFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::default()
        }
    }

    /// An outcome the transport refused after the server answered.
    pub fn rejected(status: u16, message: impl Into<String>, data: impl Into<Option<Bytes>>) -> Self {
        Self {
            status: Some(status),
            data: data.into(),
            rejection: Some(message.into()),
            ..Self::default()
        }
    }

    /// Attach a header.
    pub fn with_header(mut self, name: http::HeaderName, value: http::HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Invoked exactly once when a transport operation finishes, with the ID of
/// the finished task. The task must already report `is_in_progress() ==
/// false` when the handler runs.
pub type CompletionHandler = Box<dyn FnOnce(TaskId, TransportOutcome) + Send + 'static>;

/// The lower-level HTTP executor.
pub trait Transport: Send + Sync {
    /// Start executing `request`.
    ///
    /// Returns the task handle on success. A synchronous failure (for
    /// example a malformed URL) is returned as `Err` and `on_complete` is
    /// dropped without being called.
    ///
    /// `validate_response` asks the transport to reject responses that do
    /// not match what the request asked for (e.g. an unexpected content type).
    fn execute(
        &self,
        request: RequestDescriptor,
        validate_response: bool,
        on_complete: CompletionHandler,
    ) -> Result<TaskHandle>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn execute(
        &self,
        request: RequestDescriptor,
        validate_response: bool,
        on_complete: CompletionHandler,
    ) -> Result<TaskHandle> {
        (**self).execute(request, validate_response, on_complete)
    }
}
