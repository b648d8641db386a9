//! Endpoints: configured, sendable HTTP operations.
//!
//! An [`EndpointBuilder`] collects the request descriptor, behavior flags
//! and result continuation; [`EndpointBuilder::build`] freezes them into an
//! [`Endpoint`]. The endpoint keeps a mutable copy of its descriptor for
//! [`set_additional_header`](EndpointOperatable::set_additional_header), but
//! every send hands the transport a snapshot, so later edits never reach a
//! call already in flight.
//!
//! # Example
//!
//! ```ignore
//! let endpoint = api
//!     .get("/users/42")
//!     .header("Accept", "application/json")?
//!     .notify_listeners_on_unauthorized(false)
//!     .on_decoded(JsonStrategy::new(), |decoded: Decoded<User>| match decoded.value {
//!         Ok(user) => println!("{}", user.name),
//!         Err(err) => eprintln!("{err}"),
//!     })
//!     .build();
//!
//! endpoint.send();
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::dispatch::Api;
use crate::error::{FailureFamily, NetworkError, Result};
use crate::request::{
    CachePolicy, HeaderPolicy, HttpMethod, MultipartForm, OperationKind, RequestBody,
    RequestDescriptor, normalize_path, parse_header,
};
use crate::response::{DecodeStrategy, Decoded, Response};
use crate::transport::TaskHandle;

/// Per-call behavior flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointFlags {
    /// Ask the transport to validate the response before completing.
    pub validate: bool,
    /// Drop cancelled results instead of forwarding them.
    pub ignore_result_on_cancel: bool,
    /// Drop results that were already reported to listeners.
    pub ignore_result_when_listeners_notified: bool,
    /// Report 401 responses to listeners.
    pub notify_listeners_on_unauthorized: bool,
    /// Report connection failures to listeners.
    pub notify_listeners_on_unavailable_network: bool,
    /// Report 4xx responses other than 401 to listeners.
    pub notify_listeners_on_defective_client: bool,
    /// Report 5xx responses to listeners.
    pub notify_listeners_on_unresponsive_server: bool,
}

impl Default for EndpointFlags {
    fn default() -> Self {
        Self {
            validate: true,
            ignore_result_on_cancel: true,
            ignore_result_when_listeners_notified: false,
            notify_listeners_on_unauthorized: true,
            notify_listeners_on_unavailable_network: true,
            notify_listeners_on_defective_client: true,
            notify_listeners_on_unresponsive_server: true,
        }
    }
}

impl EndpointFlags {
    /// Whether listeners should hear about `family`.
    pub fn notifies(&self, family: FailureFamily) -> bool {
        match family {
            FailureFamily::Unauthorized => self.notify_listeners_on_unauthorized,
            FailureFamily::DefectiveClient => self.notify_listeners_on_defective_client,
            FailureFamily::UnresponsiveServer => self.notify_listeners_on_unresponsive_server,
            FailureFamily::UnavailableNetwork => self.notify_listeners_on_unavailable_network,
            FailureFamily::Cancelled => false,
        }
    }
}

/// Result continuation of an endpoint.
pub type Continuation = Arc<dyn Fn(Response) + Send + Sync>;

/// Operations available on a built endpoint.
pub trait EndpointOperatable {
    /// Dispatch the endpoint.
    fn send(&self);

    /// Dispatch again. Fails with
    /// [`RetryBeforeSent`](crate::error::EndpointOperationError::RetryBeforeSent),
    /// delivered through the continuation, if the endpoint was never sent.
    fn retry(&self);

    /// Cancel the in-flight call, if any. Idempotent.
    fn cancel(&self);

    /// Merge a header into the descriptor used by future sends.
    fn set_additional_header(&self, name: &str, value: &str, policy: HeaderPolicy) -> Result<()>;
}

/// Mutable builder for an [`Endpoint`].
pub struct EndpointBuilder {
    api: Api,
    descriptor: RequestDescriptor,
    flags: EndpointFlags,
    continuation: Option<Continuation>,
}

impl EndpointBuilder {
    pub(crate) fn new(api: Api, descriptor: RequestDescriptor, flags: EndpointFlags) -> Self {
        Self {
            api,
            descriptor,
            flags,
            continuation: None,
        }
    }

    /// Set the HTTP method.
    pub fn method(mut self, method: HttpMethod) -> Self {
        self.descriptor.method = method;
        self
    }

    /// Set the path relative to the base URL.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.descriptor.path = normalize_path(path.into());
        self
    }

    /// Add a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.descriptor.query.push((key.into(), value.to_string()));
        self
    }

    /// Add several query parameters.
    pub fn queries<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: ToString,
    {
        for (key, value) in params {
            self.descriptor.query.push((key.into(), value.to_string()));
        }
        self
    }

    /// Set a header, replacing existing values.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let (name, value) = parse_header(name, value)?;
        self.descriptor.apply_header(name, value, HeaderPolicy::Replace);
        Ok(self)
    }

    /// Set a JSON body serialized from `body`.
    ///
    /// A value that cannot be serialized is reported as
    /// [`RequestEncodingReason::InvalidBody`](crate::error::RequestEncodingReason::InvalidBody).
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body).map_err(|e| {
            crate::error::RequestEncodingReason::InvalidBody {
                field: "body".to_string(),
                message: e.to_string(),
            }
        })?;
        self.descriptor.body = RequestBody::Json(value);
        Ok(self)
    }

    /// Set a plain text body.
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.descriptor.body = RequestBody::Text(body.into());
        self
    }

    /// Set a URL-encoded form body.
    pub fn form<K, V>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.descriptor.body = RequestBody::Form(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Set a raw binary body.
    pub fn bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.descriptor.body = RequestBody::Bytes(body.into());
        self
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.descriptor.timeout = Some(timeout);
        self
    }

    /// Set the cache policy.
    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.descriptor.cache_policy = policy;
        self
    }

    /// Upload `data` as the request body.
    pub fn upload(mut self, data: impl Into<Bytes>) -> Self {
        self.descriptor.kind = OperationKind::Upload(data.into());
        self
    }

    /// Upload a multipart form.
    pub fn multipart(mut self, form: MultipartForm) -> Self {
        self.descriptor.kind = OperationKind::Multipart(form);
        self
    }

    /// Write the response body to `destination`.
    pub fn download(mut self, destination: impl Into<PathBuf>) -> Self {
        self.descriptor.kind = OperationKind::Download {
            destination: destination.into(),
        };
        self
    }

    /// Replace all behavior flags.
    pub fn flags(mut self, flags: EndpointFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Ask the transport to validate the response.
    pub fn validate(mut self, validate: bool) -> Self {
        self.flags.validate = validate;
        self
    }

    /// Drop cancelled results instead of forwarding them.
    pub fn ignore_result_on_cancel(mut self, ignore: bool) -> Self {
        self.flags.ignore_result_on_cancel = ignore;
        self
    }

    /// Drop results that were reported to listeners.
    pub fn ignore_result_when_listeners_notified(mut self, ignore: bool) -> Self {
        self.flags.ignore_result_when_listeners_notified = ignore;
        self
    }

    /// Report 401 responses to listeners.
    pub fn notify_listeners_on_unauthorized(mut self, notify: bool) -> Self {
        self.flags.notify_listeners_on_unauthorized = notify;
        self
    }

    /// Report connection failures to listeners.
    pub fn notify_listeners_on_unavailable_network(mut self, notify: bool) -> Self {
        self.flags.notify_listeners_on_unavailable_network = notify;
        self
    }

    /// Report 4xx responses other than 401 to listeners.
    pub fn notify_listeners_on_defective_client(mut self, notify: bool) -> Self {
        self.flags.notify_listeners_on_defective_client = notify;
        self
    }

    /// Report 5xx responses to listeners.
    pub fn notify_listeners_on_unresponsive_server(mut self, notify: bool) -> Self {
        self.flags.notify_listeners_on_unresponsive_server = notify;
        self
    }

    /// Receive the raw [`Response`].
    pub fn on_response<F>(mut self, continuation: F) -> Self
    where
        F: Fn(Response) + Send + Sync + 'static,
    {
        self.continuation = Some(Arc::new(continuation));
        self
    }

    /// Receive the response decoded with `strategy`.
    ///
    /// A body that fails to decode is reported as a response serialization
    /// error even when the HTTP status was successful.
    pub fn on_decoded<T, S, F>(mut self, strategy: S, continuation: F) -> Self
    where
        S: DecodeStrategy<T> + 'static,
        F: Fn(Decoded<T>) + Send + Sync + 'static,
        T: 'static,
    {
        self.continuation = Some(Arc::new(move |response| {
            continuation(Decoded::from_response(response, &strategy));
        }));
        self
    }

    /// Freeze the configuration into an [`Endpoint`].
    pub fn build(self) -> Endpoint {
        Endpoint {
            shared: Arc::new(EndpointShared {
                api: self.api,
                flags: self.flags,
                continuation: self.continuation,
                state: Mutex::new(EndpointState {
                    descriptor: self.descriptor,
                    task: None,
                    send_count: 0,
                    in_flight: false,
                }),
            }),
        }
    }
}

pub(crate) struct EndpointState {
    pub(crate) descriptor: RequestDescriptor,
    pub(crate) task: Option<TaskHandle>,
    pub(crate) send_count: u64,
    pub(crate) in_flight: bool,
}

impl EndpointState {
    /// Clear the in-flight marker if `attempt` is still the latest send.
    pub(crate) fn finish(&mut self, attempt: u64) {
        if self.send_count == attempt {
            self.in_flight = false;
            self.task = None;
        }
    }
}

pub(crate) struct EndpointShared {
    api: Api,
    pub(crate) flags: EndpointFlags,
    continuation: Option<Continuation>,
    pub(crate) state: Mutex<EndpointState>,
}

/// A built endpoint. Clones share state.
#[derive(Clone)]
pub struct Endpoint {
    pub(crate) shared: Arc<EndpointShared>,
}

impl Endpoint {
    /// Snapshot of the descriptor the next send will use.
    pub fn descriptor(&self) -> RequestDescriptor {
        self.shared.state.lock().descriptor.clone()
    }

    /// The path, which is also the registry key.
    pub fn path(&self) -> String {
        self.shared.state.lock().descriptor.path.clone()
    }

    /// Behavior flags.
    pub fn flags(&self) -> EndpointFlags {
        self.shared.flags
    }

    /// Whether the endpoint was dispatched at least once.
    pub fn has_been_sent(&self) -> bool {
        self.shared.state.lock().send_count > 0
    }

    /// Number of dispatch attempts so far.
    pub fn send_count(&self) -> u64 {
        self.shared.state.lock().send_count
    }

    /// Whether a call is currently in flight.
    pub fn is_in_flight(&self) -> bool {
        self.shared.state.lock().in_flight
    }

    /// The transport task of the call in flight.
    pub fn current_task(&self) -> Option<TaskHandle> {
        self.shared.state.lock().task.clone()
    }

    /// The dispatcher this endpoint belongs to.
    pub fn api(&self) -> &Api {
        &self.shared.api
    }

    pub(crate) fn deliver(&self, response: Response) {
        if let Some(continuation) = &self.shared.continuation {
            continuation(response);
        }
    }

    /// Deliver a failure that never reached the transport.
    pub(crate) fn deliver_error(&self, error: NetworkError) {
        let request = self.descriptor();
        self.deliver(Response::failed(request, error));
    }
}

impl EndpointOperatable for Endpoint {
    fn send(&self) {
        self.shared.api.send(self);
    }

    fn retry(&self) {
        self.shared.api.retry(self);
    }

    fn cancel(&self) {
        self.shared.api.cancel(self);
    }

    fn set_additional_header(&self, name: &str, value: &str, policy: HeaderPolicy) -> Result<()> {
        let (name, value) = parse_header(name, value)?;
        self.shared
            .state
            .lock()
            .descriptor
            .apply_header(name, value, policy);
        Ok(())
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Endpoint")
            .field("request", &state.descriptor.summary())
            .field("flags", &self.shared.flags)
            .field("send_count", &state.send_count)
            .field("in_flight", &state.in_flight)
            .finish()
    }
}
