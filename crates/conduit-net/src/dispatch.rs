//! The dispatcher.
//!
//! [`Api`] turns endpoints into transport calls and routes the results:
//!
//! 1. request interceptors run on a snapshot of the endpoint's descriptor
//! 2. the logger records the request and the transport starts the call
//! 3. the returned task is registered under the request path
//! 4. on completion the task is deregistered, the outcome classified once,
//!    and [`route`] decides whether listeners hear about it and whether the
//!    endpoint's continuation receives it
//!
//! # Example
//!
//! ```ignore
//! use conduit_net::prelude::*;
//!
//! let api = Api::builder("https://api.example.com")
//!     .default_header("Accept", "application/json")
//!     .add_request_interceptor(|request| {
//!         request.query.push(("locale".into(), "en".into()));
//!     })
//!     .build()?;
//!
//! let listener = Arc::new(SessionExpiry::default());
//! api.add_listener(&listener);
//!
//! api.get("/users/42")
//!     .on_response(|response| println!("{:?}", response.status_code))
//!     .build()
//!     .send();
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use conduit_core::logging::{span_names, targets};
use conduit_core::{ConnectionGuard, ConnectionId, LifecycleEvent, LifecycleSource, ObserverSet};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::classify::classify_outcome;
use crate::connectivity::{
    ConnectivityMonitor, ConnectivityStatus, DeliveryQueue, PathSource, StatusChange,
};
use crate::endpoint::{Endpoint, EndpointBuilder, EndpointFlags};
use crate::error::{EndpointOperationError, FailureFamily, NetworkError, Result};
use crate::listener::{ListenerId, NetworkListener};
use crate::logger::{Logger, TracingLogger};
use crate::registry::TaskRegistry;
use crate::request::{CachePolicy, HttpMethod, RequestDescriptor, parse_header};
use crate::response::Response;
use crate::transport::{TaskId, Transport, TransportOutcome};

/// Hook that may edit every request before it is dispatched.
pub type Interceptor = Arc<dyn Fn(&mut RequestDescriptor) + Send + Sync>;

/// Dispatcher configuration.
///
/// Loadable from TOML:
///
/// ```
/// use conduit_net::dispatch::ApiConfig;
///
/// let config = ApiConfig::from_toml_str(r#"
///     base_url = "https://api.example.com"
///     timeout_ms = 15000
///
///     [default_headers]
///     Accept = "application/json"
///
///     [flags]
///     ignore_result_when_listeners_notified = true
/// "#).unwrap();
/// assert_eq!(config.base_url, "https://api.example.com");
/// assert!(config.flags.ignore_result_when_listeners_notified);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL every endpoint path is appended to.
    pub base_url: String,
    /// Headers added to every endpoint.
    pub default_headers: BTreeMap<String, String>,
    /// Default per-request timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Default cache policy.
    pub cache_policy: CachePolicy,
    /// Default endpoint flags.
    pub flags: EndpointFlags,
    /// User agent for the default transport.
    pub user_agent: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            default_headers: BTreeMap::new(),
            timeout_ms: None,
            cache_policy: CachePolicy::default(),
            flags: EndpointFlags::default(),
            user_agent: None,
        }
    }
}

impl ApiConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// The default timeout as a duration.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// How one classified result is delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Routing {
    /// Family to report to listeners, if any.
    pub notify: Option<FailureFamily>,
    /// Whether the endpoint's continuation receives the response.
    pub forward: bool,
}

/// Decide listener notification and forwarding for one result.
///
/// - success and unclassified failures are forwarded
/// - a cancellation is forwarded unless `ignore_result_on_cancel` is set
/// - any other failure family notifies listeners when its flag allows, and
///   is then dropped only if `ignore_result_when_listeners_notified` is set
pub fn route(flags: &EndpointFlags, error: Option<&NetworkError>) -> Routing {
    let forward_only = Routing {
        notify: None,
        forward: true,
    };
    let Some(family) = error.and_then(NetworkError::family) else {
        return forward_only;
    };

    match family {
        FailureFamily::Cancelled => Routing {
            notify: None,
            forward: !flags.ignore_result_on_cancel,
        },
        family if flags.notifies(family) => Routing {
            notify: Some(family),
            forward: !flags.ignore_result_when_listeners_notified,
        },
        _ => forward_only,
    }
}

/// Builder for [`Api`].
pub struct ApiBuilder {
    config: ApiConfig,
    transport: Option<Arc<dyn Transport>>,
    #[cfg(feature = "reqwest-transport")]
    transport_config: Option<crate::transport::ReqwestTransportConfig>,
    interceptors: Vec<Interceptor>,
    logger: Option<Arc<dyn Logger>>,
    path_source: Option<Arc<dyn PathSource>>,
    lifecycle: Option<Arc<LifecycleSource>>,
}

impl ApiBuilder {
    /// Create a builder for `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::from_config(ApiConfig {
            base_url: base_url.into(),
            ..ApiConfig::default()
        })
    }

    /// Create a builder from a loaded configuration.
    pub fn from_config(config: ApiConfig) -> Self {
        Self {
            config,
            transport: None,
            #[cfg(feature = "reqwest-transport")]
            transport_config: None,
            interceptors: Vec::new(),
            logger: None,
            path_source: None,
            lifecycle: None,
        }
    }

    /// Add a header sent with every endpoint. Validated by [`build`](Self::build).
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(name.into(), value.into());
        self
    }

    /// Set the default per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Set the default cache policy.
    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.config.cache_policy = policy;
        self
    }

    /// Set the default endpoint flags.
    pub fn flags(mut self, flags: EndpointFlags) -> Self {
        self.config.flags = flags;
        self
    }

    /// Set the user agent of the default transport.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Use a specific transport.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Configure the default reqwest transport.
    #[cfg(feature = "reqwest-transport")]
    pub fn transport_config(mut self, config: crate::transport::ReqwestTransportConfig) -> Self {
        self.transport_config = Some(config);
        self
    }

    /// Add a request interceptor. Interceptors run in insertion order.
    pub fn add_request_interceptor<F>(mut self, interceptor: F) -> Self
    where
        F: Fn(&mut RequestDescriptor) + Send + Sync + 'static,
    {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Add a shared request interceptor.
    pub fn request_interceptor(mut self, interceptor: Interceptor) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Replace the default [`TracingLogger`].
    pub fn logger(mut self, logger: impl Logger + 'static) -> Self {
        self.logger = Some(Arc::new(logger));
        self
    }

    /// Use a specific reachability source for network monitoring.
    pub fn path_source(mut self, source: impl PathSource + 'static) -> Self {
        self.path_source = Some(Arc::new(source));
        self
    }

    /// Follow host foreground/background transitions.
    pub fn lifecycle(mut self, source: Arc<LifecycleSource>) -> Self {
        self.lifecycle = Some(source);
        self
    }

    /// Build the dispatcher.
    pub fn build(self) -> Result<Api> {
        let mut default_headers = http::HeaderMap::new();
        for (name, value) in &self.config.default_headers {
            let (name, value) = parse_header(name, value)?;
            default_headers.insert(name, value);
        }

        let transport = match self.transport {
            Some(transport) => transport,
            #[cfg(feature = "reqwest-transport")]
            None => reqwest_transport(&self.config, self.transport_config)?,
            #[cfg(not(feature = "reqwest-transport"))]
            None => {
                return Err(NetworkError::unexpected(
                    "no transport configured; enable `reqwest-transport` or call ApiBuilder::transport",
                ));
            }
        };

        let path_source = self.path_source.unwrap_or_else(default_path_source);

        let api = Api {
            inner: Arc::new(ApiInner {
                config: self.config,
                default_headers,
                transport,
                interceptors: self.interceptors,
                logger: self.logger.unwrap_or_else(|| Arc::new(TracingLogger)),
                registry: TaskRegistry::new(),
                listeners: ObserverSet::new(),
                monitor: ConnectivityMonitor::with_source(path_source),
                monitor_subscription: Mutex::new(None),
                lifecycle_subscription: Mutex::new(None),
            }),
        };

        if let Some(lifecycle) = self.lifecycle {
            api.attach_lifecycle(&lifecycle);
        }
        Ok(api)
    }
}

#[cfg(feature = "reqwest-transport")]
fn reqwest_transport(
    config: &ApiConfig,
    transport_config: Option<crate::transport::ReqwestTransportConfig>,
) -> Result<Arc<dyn Transport>> {
    let mut builder = crate::transport::ReqwestTransport::builder()
        .config(transport_config.unwrap_or_default());
    if let Some(ua) = &config.user_agent {
        builder = builder.user_agent(ua.clone());
    }
    Ok(Arc::new(builder.build()?))
}

#[cfg(feature = "interface-monitor")]
fn default_path_source() -> Arc<dyn PathSource> {
    Arc::new(crate::connectivity::InterfacePathSource::new())
}

#[cfg(not(feature = "interface-monitor"))]
fn default_path_source() -> Arc<dyn PathSource> {
    Arc::new(crate::connectivity::ManualPathSource::new())
}

struct ApiInner {
    config: ApiConfig,
    default_headers: http::HeaderMap,
    transport: Arc<dyn Transport>,
    interceptors: Vec<Interceptor>,
    logger: Arc<dyn Logger>,
    registry: TaskRegistry,
    listeners: ObserverSet<dyn NetworkListener>,
    monitor: ConnectivityMonitor,
    monitor_subscription: Mutex<Option<ConnectionGuard<StatusChange>>>,
    lifecycle_subscription: Mutex<Option<(Weak<LifecycleSource>, ConnectionId)>>,
}

impl ApiInner {
    fn notify_failure(&self, family: FailureFamily, response: &Response) {
        let notified = self.listeners.for_each(|listener| match family {
            FailureFamily::Unauthorized => listener.on_unauthorized(response),
            FailureFamily::DefectiveClient => listener.on_defective_client(response),
            FailureFamily::UnresponsiveServer => listener.on_unresponsive_server(response),
            FailureFamily::UnavailableNetwork => listener.on_unavailable_network(response),
            FailureFamily::Cancelled => {}
        });
        tracing::debug!(target: targets::DISPATCH, ?family, listeners = notified, "listeners notified");
    }

    fn on_status_change(&self, change: &StatusChange) {
        self.logger.log_connectivity(change);
        self.listeners.for_each(|listener| {
            listener.on_connectivity_changed(change.new, change.old);
            match change.new {
                ConnectivityStatus::Connected(kind) => listener.on_network_connected(kind),
                ConnectivityStatus::Disconnected(last) => listener.on_network_disconnected(last),
                ConnectivityStatus::Suspended => listener.on_suspended(),
                ConnectivityStatus::Unavailable | ConnectivityStatus::Undetermined => {}
            }
        });
    }

    fn on_lifecycle(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Background => self.monitor.suspend(),
            LifecycleEvent::Foreground => {
                if let Err(err) = self.monitor.resume() {
                    tracing::warn!(target: targets::CONNECTIVITY, error = %err, "failed to resume network monitoring");
                }
            }
        }
    }
}

impl Drop for ApiInner {
    fn drop(&mut self) {
        if let Some((source, id)) = self.lifecycle_subscription.get_mut().take()
            && let Some(source) = source.upgrade()
        {
            source.unsubscribe(id);
        }
    }
}

/// The dispatcher. Clones share state.
#[derive(Clone)]
pub struct Api {
    inner: Arc<ApiInner>,
}

impl Api {
    /// Create a builder for `base_url`.
    pub fn builder(base_url: impl Into<String>) -> ApiBuilder {
        ApiBuilder::new(base_url)
    }

    /// The configuration the dispatcher was built with.
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    /// Start an endpoint with the configured defaults.
    pub fn endpoint(&self, method: HttpMethod, path: impl Into<String>) -> EndpointBuilder {
        let config = &self.inner.config;
        let mut descriptor = RequestDescriptor::new(config.base_url.clone(), method, path);
        descriptor.headers = self.inner.default_headers.clone();
        descriptor.timeout = config.timeout();
        descriptor.cache_policy = config.cache_policy;
        EndpointBuilder::new(self.clone(), descriptor, config.flags)
    }

    /// Start a GET endpoint.
    pub fn get(&self, path: impl Into<String>) -> EndpointBuilder {
        self.endpoint(HttpMethod::Get, path)
    }

    /// Start a POST endpoint.
    pub fn post(&self, path: impl Into<String>) -> EndpointBuilder {
        self.endpoint(HttpMethod::Post, path)
    }

    /// Start a PUT endpoint.
    pub fn put(&self, path: impl Into<String>) -> EndpointBuilder {
        self.endpoint(HttpMethod::Put, path)
    }

    /// Start a PATCH endpoint.
    pub fn patch(&self, path: impl Into<String>) -> EndpointBuilder {
        self.endpoint(HttpMethod::Patch, path)
    }

    /// Start a DELETE endpoint.
    pub fn delete(&self, path: impl Into<String>) -> EndpointBuilder {
        self.endpoint(HttpMethod::Delete, path)
    }

    /// Dispatch `endpoint`.
    ///
    /// An endpoint already in flight is not dispatched again; its
    /// continuation receives
    /// [`AlreadyInFlight`](EndpointOperationError::AlreadyInFlight) instead.
    pub fn send(&self, endpoint: &Endpoint) {
        let (mut request, attempt) = {
            let mut state = endpoint.shared.state.lock();
            if state.in_flight {
                drop(state);
                tracing::warn!(target: targets::DISPATCH, endpoint = ?endpoint, "endpoint already in flight");
                endpoint.deliver_error(EndpointOperationError::AlreadyInFlight.into());
                return;
            }
            state.in_flight = true;
            state.send_count += 1;
            (state.descriptor.clone(), state.send_count)
        };

        for interceptor in &self.inner.interceptors {
            interceptor(&mut request);
        }

        let span = tracing::debug_span!(
            target: targets::DISPATCH,
            span_names::DISPATCH,
            request = %request.summary(),
            attempt
        );
        let _enter = span.enter();

        self.inner.logger.log_request(&request);
        let path = request.path.clone();
        let started = Instant::now();

        let on_complete = {
            let api = self.clone();
            let endpoint = endpoint.clone();
            let request = request.clone();
            Box::new(move |task_id: TaskId, outcome: TransportOutcome| {
                api.complete(&endpoint, attempt, request, task_id, outcome, started.elapsed());
            })
        };

        match self
            .inner
            .transport
            .execute(request.clone(), endpoint.flags().validate, on_complete)
        {
            Ok(task) => {
                if self.inner.registry.add(task.clone(), &path) {
                    let mut state = endpoint.shared.state.lock();
                    if state.in_flight && state.send_count == attempt {
                        state.task = Some(task);
                    }
                }
            }
            Err(error) => {
                tracing::debug!(target: targets::DISPATCH, error = %error, "dispatch failed synchronously");
                endpoint.shared.state.lock().finish(attempt);
                let response = Response::failed(request, error);
                self.inner.logger.log_response(&response);
                self.deliver(endpoint, response);
            }
        }
    }

    /// Dispatch `endpoint` again.
    ///
    /// An endpoint that was never sent receives
    /// [`RetryBeforeSent`](EndpointOperationError::RetryBeforeSent) through
    /// its continuation and the transport is not involved.
    pub fn retry(&self, endpoint: &Endpoint) {
        if !endpoint.has_been_sent() {
            tracing::warn!(target: targets::DISPATCH, endpoint = ?endpoint, "retry before first send");
            endpoint.deliver_error(EndpointOperationError::RetryBeforeSent.into());
            return;
        }
        self.send(endpoint);
    }

    /// Cancel the call `endpoint` has in flight. A no-op otherwise.
    pub fn cancel(&self, endpoint: &Endpoint) {
        if let Some(task) = endpoint.current_task() {
            tracing::debug!(target: targets::DISPATCH, task = %task.id(), "cancelling endpoint");
            task.cancel();
        }
    }

    /// Cancel every call whose path is exactly `path`.
    pub fn cancel_endpoints_with_path(&self, path: &str) -> usize {
        self.inner.registry.cancel_all_for_path(path)
    }

    /// Cancel every call whose path contains `path`.
    pub fn cancel_endpoints_relative_to(&self, path: &str) -> usize {
        self.inner.registry.cancel_all_with_prefix(path)
    }

    /// Cancel every call in flight.
    pub fn cancel_all_endpoints(&self) -> usize {
        self.inner.registry.cancel_all()
    }

    /// Register a listener. Only a weak reference is kept.
    pub fn add_listener<L>(&self, listener: &Arc<L>) -> ListenerId
    where
        L: NetworkListener + 'static,
    {
        let listener: Arc<dyn NetworkListener> = listener.clone();
        self.inner.listeners.insert(&listener)
    }

    /// Unregister a listener. Returns `true` if it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    /// Number of registered listeners, including ones not yet pruned.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Start reporting connectivity changes to listeners.
    pub fn start_network_monitoring(&self, queue: DeliveryQueue) -> Result<()> {
        {
            let mut subscription = self.inner.monitor_subscription.lock();
            if subscription.is_none() {
                let weak = Arc::downgrade(&self.inner);
                *subscription = Some(self.inner.monitor.status_changed.connect_scoped(
                    move |change: &StatusChange| {
                        if let Some(inner) = weak.upgrade() {
                            inner.on_status_change(change);
                        }
                    },
                ));
            }
        }
        self.inner.monitor.start(queue)
    }

    /// Stop network monitoring and release the path source.
    pub fn stop_network_monitoring(&self) {
        self.inner.monitor.stop();
        self.inner.monitor_subscription.lock().take();
    }

    /// Current connectivity status.
    pub fn network_status(&self) -> ConnectivityStatus {
        self.inner.monitor.status()
    }

    /// The connectivity monitor.
    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.inner.monitor
    }

    /// Suspend monitoring on background and resume it on foreground.
    ///
    /// Replaces any previously attached source.
    pub fn attach_lifecycle(&self, source: &Arc<LifecycleSource>) {
        self.detach_lifecycle();
        let weak = Arc::downgrade(&self.inner);
        let id = source.subscribe(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_lifecycle(*event);
            }
        });
        *self.inner.lifecycle_subscription.lock() = Some((Arc::downgrade(source), id));
    }

    /// Stop following host lifecycle transitions.
    pub fn detach_lifecycle(&self) {
        let previous = self.inner.lifecycle_subscription.lock().take();
        if let Some((source, id)) = previous
            && let Some(source) = source.upgrade()
        {
            source.unsubscribe(id);
        }
    }

    /// The task registry.
    pub fn registry(&self) -> &TaskRegistry {
        &self.inner.registry
    }

    fn complete(
        &self,
        endpoint: &Endpoint,
        attempt: u64,
        request: RequestDescriptor,
        task_id: TaskId,
        outcome: TransportOutcome,
        elapsed: Duration,
    ) {
        let span = tracing::debug_span!(
            target: targets::DISPATCH,
            span_names::COMPLETION,
            task = %task_id,
            request = %request.summary()
        );
        let _enter = span.enter();

        self.inner.registry.remove(task_id, &request.path);
        let error = classify_outcome(&outcome);
        let response = Response {
            request,
            status_code: outcome.status,
            headers: outcome.headers,
            data: outcome.data,
            error,
            elapsed,
        };

        endpoint.shared.state.lock().finish(attempt);
        self.inner.logger.log_response(&response);
        self.deliver(endpoint, response);
    }

    fn deliver(&self, endpoint: &Endpoint, response: Response) {
        let routing = route(&endpoint.flags(), response.error.as_ref());
        if let Some(family) = routing.notify {
            self.inner.notify_failure(family, &response);
        }
        if routing.forward {
            endpoint.deliver(response);
        } else {
            tracing::trace!(target: targets::DISPATCH, "result suppressed");
        }
    }
}

impl std::fmt::Debug for Api {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Api")
            .field("base_url", &self.inner.config.base_url)
            .field("registry", &self.inner.registry)
            .field("listeners", &self.inner.listeners.len())
            .field("network_status", &self.inner.monitor.status())
            .finish()
    }
}
