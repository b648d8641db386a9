//! reqwest-backed transport.
//!
//! Each `execute` call builds the reqwest request synchronously, so encoding
//! problems surface as an immediate `Err`, then spawns the exchange on a tokio
//! runtime. The spawned future races the request against a oneshot cancel
//! channel; whichever finishes first decides the outcome.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use conduit_core::logging::targets;
use parking_lot::Mutex;
use reqwest::redirect::Policy;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use super::{CompletionHandler, TaskHandle, TaskId, Transport, TransportOutcome, TransportTask};
use crate::classify::classify_failure;
use crate::error::{NetworkError, RequestEncodingReason, Result, TransportFailure};
use crate::request::{MultipartForm, MultipartPart, OperationKind, RequestBody, RequestDescriptor};

/// Configuration for the reqwest client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReqwestTransportConfig {
    /// Default request timeout; requests may override it.
    pub timeout: Option<Duration>,
    /// Connect timeout.
    pub connect_timeout: Option<Duration>,
    /// Whether to follow redirects.
    pub follow_redirects: bool,
    /// Maximum number of redirects to follow.
    pub max_redirects: usize,
    /// Whether to keep a cookie store.
    pub cookies_enabled: bool,
    /// User agent sent with every request.
    pub user_agent: Option<String>,
    /// Proxy URL.
    pub proxy: Option<String>,
}

impl Default for ReqwestTransportConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(60)),
            connect_timeout: Some(Duration::from_secs(10)),
            follow_redirects: true,
            max_redirects: 10,
            cookies_enabled: true,
            user_agent: Some(format!("Conduit/{} (Rust)", env!("CARGO_PKG_VERSION"))),
            proxy: None,
        }
    }
}

/// Builder for [`ReqwestTransport`].
#[derive(Default)]
pub struct ReqwestTransportBuilder {
    config: ReqwestTransportConfig,
    runtime: Option<Handle>,
}

impl ReqwestTransportBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ReqwestTransportConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Disable the default request timeout.
    pub fn no_timeout(mut self) -> Self {
        self.config.timeout = None;
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Disable redirect following.
    pub fn no_redirects(mut self) -> Self {
        self.config.follow_redirects = false;
        self
    }

    /// Set the maximum number of redirects to follow.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config.max_redirects = max;
        self
    }

    /// Disable the cookie store.
    pub fn no_cookies(mut self) -> Self {
        self.config.cookies_enabled = false;
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Route every request through a proxy.
    pub fn proxy(mut self, proxy_url: impl Into<String>) -> Self {
        self.config.proxy = Some(proxy_url.into());
        self
    }

    /// Spawn exchanges on this runtime instead of the ambient or global one.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Build the transport.
    pub fn build(self) -> Result<ReqwestTransport> {
        let mut builder = reqwest::Client::builder();

        if let Some(timeout) = self.config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(connect_timeout) = self.config.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }

        if self.config.follow_redirects {
            builder = builder.redirect(Policy::limited(self.config.max_redirects));
        } else {
            builder = builder.redirect(Policy::none());
        }

        if self.config.cookies_enabled {
            builder = builder.cookie_store(true);
        }
        if let Some(ref ua) = self.config.user_agent {
            builder = builder.user_agent(ua);
        }
        if let Some(ref proxy_url) = self.config.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| NetworkError::unexpected(format!("invalid proxy '{proxy_url}': {e}")))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build()?;
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => runtime::handle()?,
        };

        Ok(ReqwestTransport {
            client,
            config: self.config,
            runtime,
        })
    }
}

struct ReqwestTask {
    id: TaskId,
    in_progress: AtomicBool,
    cancel_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl ReqwestTask {
    fn finish(&self) {
        self.cancel_tx.lock().take();
        self.in_progress.store(false, Ordering::SeqCst);
    }
}

impl TransportTask for ReqwestTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        if let Some(tx) = self.cancel_tx.lock().take() {
            let _ = tx.send(());
        }
    }
}

/// A [`Transport`] that performs requests with reqwest.
///
/// The transport is cheap to share behind an `Arc`; all clones of the inner
/// `reqwest::Client` share one connection pool.
///
/// ```ignore
/// let transport = ReqwestTransport::builder()
///     .timeout(Duration::from_secs(15))
///     .no_cookies()
///     .build()?;
/// let api = Api::builder("https://api.example.com").transport(transport).build()?;
/// ```
pub struct ReqwestTransport {
    client: reqwest::Client,
    config: ReqwestTransportConfig,
    runtime: Handle,
}

impl ReqwestTransport {
    /// Create a transport with default configuration.
    pub fn new() -> Result<Self> {
        ReqwestTransportBuilder::new().build()
    }

    /// Create a builder.
    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::new()
    }

    /// The configuration the client was built with.
    pub fn config(&self) -> &ReqwestTransportConfig {
        &self.config
    }

    fn build_request(&self, request: &RequestDescriptor) -> Result<reqwest::RequestBuilder> {
        let url = request.url()?;
        let mut builder = self
            .client
            .request(request.method.to_http(), url)
            .headers(request.headers.clone());
        if let Some(directive) = request.cache_policy.cache_control()
            && !request.headers.contains_key(http::header::CACHE_CONTROL)
        {
            builder = builder.header(http::header::CACHE_CONTROL, directive);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        builder = match &request.kind {
            OperationKind::Upload(bytes) => builder.body(bytes.clone()),
            OperationKind::Multipart(form) => builder.multipart(multipart_form(form)?),
            OperationKind::Data | OperationKind::Download { .. } => match &request.body {
                RequestBody::None => builder,
                RequestBody::Text(text) => builder.body(text.clone()),
                RequestBody::Json(value) => builder.json(value),
                RequestBody::Form(fields) => builder.form(fields),
                RequestBody::Bytes(bytes) => builder.body(bytes.clone()),
            },
        };

        Ok(builder)
    }
}

impl Transport for ReqwestTransport {
    fn execute(
        &self,
        request: RequestDescriptor,
        validate_response: bool,
        on_complete: CompletionHandler,
    ) -> Result<TaskHandle> {
        let builder = self.build_request(&request)?;
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let task = Arc::new(ReqwestTask {
            id: TaskId::next(),
            in_progress: AtomicBool::new(true),
            cancel_tx: Mutex::new(Some(cancel_tx)),
        });

        tracing::trace!(target: targets::TRANSPORT, task = %task.id, request = %request.summary(), kind = request.kind.name(), "spawning exchange");

        let spawned = task.clone();
        self.runtime.spawn(async move {
            let outcome = tokio::select! {
                outcome = exchange(builder, &request, validate_response) => outcome,
                _ = cancel_rx => {
                    tracing::debug!(target: targets::TRANSPORT, task = %spawned.id, "exchange cancelled");
                    TransportOutcome::failure(TransportFailure::Cancelled)
                }
            };
            spawned.finish();
            on_complete(spawned.id, outcome);
        });

        Ok(task)
    }
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("config", &self.config)
            .finish()
    }
}

async fn exchange(
    builder: reqwest::RequestBuilder,
    request: &RequestDescriptor,
    validate_response: bool,
) -> TransportOutcome {
    let response = match builder.send().await {
        Ok(response) => response,
        Err(err) => {
            tracing::debug!(target: targets::TRANSPORT, request = %request.summary(), error = %err, "exchange failed");
            return TransportOutcome::failure(failure_from_reqwest(&err));
        }
    };

    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let data = match response.bytes().await {
        Ok(data) => data,
        Err(err) => {
            return TransportOutcome {
                status: Some(status),
                headers,
                failure: Some(failure_from_reqwest(&err)),
                ..TransportOutcome::default()
            };
        }
    };

    let mut outcome = TransportOutcome {
        status: Some(status),
        headers,
        data: (!data.is_empty()).then_some(data),
        ..TransportOutcome::default()
    };

    if validate_response
        && let Some(message) = validation_failure(request, &outcome)
    {
        outcome.rejection = Some(message);
        return outcome;
    }

    if let OperationKind::Download { destination } = &request.kind
        && (200..300).contains(&status)
    {
        let body = outcome.data.take().unwrap_or_default();
        if let Err(err) = tokio::fs::write(destination, &body).await {
            outcome.rejection = Some(format!(
                "failed to write download to {}: {err}",
                destination.display()
            ));
            outcome.data = Some(body);
        }
    }

    outcome
}

/// Check the response against the request's `Accept` header.
fn validation_failure(request: &RequestDescriptor, outcome: &TransportOutcome) -> Option<String> {
    let accept = request
        .headers
        .get(http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())?;

    match outcome
        .headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    {
        Some(content_type) if content_type_matches(accept, content_type) => None,
        Some(content_type) => Some(format!(
            "response content type '{content_type}' does not match accepted '{accept}'"
        )),
        None if outcome.data.is_none() => None,
        None => Some(format!("response without content type does not match accepted '{accept}'")),
    }
}

/// Whether `content_type` satisfies any media range in `accept`.
fn content_type_matches(accept: &str, content_type: &str) -> bool {
    let essence = |s: &str| s.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    let actual = essence(content_type);
    let (actual_type, actual_subtype) = actual.split_once('/').unwrap_or((actual.as_str(), ""));

    accept.split(',').map(essence).any(|range| match range.split_once('/') {
        Some(("*", "*")) => true,
        Some((kind, "*")) => kind == actual_type,
        Some((kind, subtype)) => kind == actual_type && subtype == actual_subtype,
        None => range == "*",
    })
}

fn multipart_form(form: &MultipartForm) -> Result<reqwest::multipart::Form> {
    let mut out = reqwest::multipart::Form::new();
    for part in form.parts() {
        out = match part {
            MultipartPart::Text { name, value } => out.text(name.clone(), value.clone()),
            MultipartPart::File {
                name,
                bytes,
                filename,
                mime_type,
            } => {
                let mut file = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name(filename.clone());
                if let Some(mime) = mime_type {
                    file = file.mime_str(mime).map_err(|e| RequestEncodingReason::InvalidBody {
                        field: name.clone(),
                        message: e.to_string(),
                    })?;
                }
                out.part(name.clone(), file)
            }
        };
    }
    Ok(out)
}

/// Map a reqwest error onto a transport failure code.
pub(crate) fn failure_from_reqwest(err: &reqwest::Error) -> TransportFailure {
    if err.is_timeout() {
        TransportFailure::TimedOut
    } else if err.is_connect() {
        let message = err.to_string().to_ascii_lowercase();
        if message.contains("dns") {
            TransportFailure::DnsLookupFailed
        } else {
            TransportFailure::CannotConnectToHost
        }
    } else if err.is_redirect() {
        TransportFailure::from_code(-1007)
    } else if err.is_body() || err.is_decode() {
        TransportFailure::NetworkConnectionLost
    } else {
        TransportFailure::BadServerResponse
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::unexpected(err.to_string())
        } else {
            classify_failure(failure_from_reqwest(&err))
        }
    }
}

/// Runtime management for transport exchanges.
///
/// Exchanges run on the ambient tokio runtime when one exists. Otherwise a
/// small process-wide runtime is created on first use.
pub mod runtime {
    use std::sync::OnceLock;

    use tokio::runtime::{Handle, Runtime};

    use crate::error::Result;

    static RUNTIME: OnceLock<Runtime> = OnceLock::new();

    /// Get the process-wide runtime, creating it if needed.
    pub fn get() -> Result<&'static Runtime> {
        if let Some(runtime) = RUNTIME.get() {
            return Ok(runtime);
        }
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("conduit-transport")
            .enable_all()
            .build()?;
        Ok(RUNTIME.get_or_init(|| runtime))
    }

    /// A handle to the ambient runtime, or to the process-wide one.
    pub fn handle() -> Result<Handle> {
        match Handle::try_current() {
            Ok(handle) => Ok(handle),
            Err(_) => Ok(get()?.handle().clone()),
        }
    }
}
