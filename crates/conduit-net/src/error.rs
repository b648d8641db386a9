//! Error taxonomy for endpoint dispatch.
//!
//! Every failure an endpoint can observe is described by exactly one
//! [`NetworkError`] variant. Variants carry enough context to render a
//! human-readable message and, where a response body was received, the raw
//! bytes so callers can still decode a server-provided error payload.
//!
//! `NetworkError` is `Clone`: the same classified error travels to global
//! listeners and to the caller's result continuation.

use bytes::Bytes;

/// Why a request could not be encoded before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestEncodingReason {
    /// No base URL (or an empty one) was configured.
    #[error("the request URL is empty")]
    EmptyUrl,
    /// The URL could not be parsed.
    #[error("invalid URL '{url}': {message}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Parser message.
        message: String,
    },
    /// A query parameter could not be encoded.
    #[error("invalid query parameter '{field}'")]
    InvalidQuery {
        /// Name of the field.
        field: String,
    },
    /// A body field could not be encoded.
    #[error("body field '{field}' could not be encoded: {message}")]
    InvalidBody {
        /// Name of the field.
        field: String,
        /// Encoder message.
        message: String,
    },
    /// A header name or value is not valid HTTP.
    #[error("invalid header '{name}'")]
    InvalidHeader {
        /// Name of the header.
        name: String,
    },
}

/// Why a received body could not be turned into the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResponseSerializationReason {
    /// The body is not valid for the requested representation (e.g. not UTF-8).
    #[error("response data is corrupted")]
    CorruptedData,
    /// A body was required but none (or an empty one) was received.
    #[error("response data is empty")]
    EmptyData,
    /// Deserialization failed.
    #[error("response could not be decoded: {message}")]
    Decoding {
        /// Underlying decoder message.
        message: String,
    },
}

/// Classification of an HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpErrorReason {
    /// 3xx.
    Redirection,
    /// 400.
    BadRequest,
    /// 401.
    Unauthorized,
    /// 403.
    Forbidden,
    /// 404.
    NotFound,
    /// Any other 4xx.
    Client,
    /// 501.
    NotImplemented,
    /// 503.
    ServiceUnavailable,
    /// Any other 5xx.
    Server,
    /// Anything outside 300..600.
    Unknown,
}

impl HttpErrorReason {
    /// Classify a non-success HTTP status code.
    ///
    /// This is a pure function of the status code; 2xx codes map to
    /// [`HttpErrorReason::Unknown`] and should be filtered out by the caller.
    pub fn from_status(status: u16) -> Self {
        match status {
            300..=399 => Self::Redirection,
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            402..=499 => Self::Client,
            501 => Self::NotImplemented,
            503 => Self::ServiceUnavailable,
            500..=599 => Self::Server,
            _ => Self::Unknown,
        }
    }

    /// Human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Redirection => "redirection",
            Self::BadRequest => "bad request",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not found",
            Self::Client => "client error",
            Self::NotImplemented => "not implemented",
            Self::ServiceUnavailable => "service unavailable",
            Self::Server => "server error",
            Self::Unknown => "unknown status",
        }
    }
}

impl std::fmt::Display for HttpErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Transport-level failure codes reported when no HTTP status is available.
///
/// The numeric codes follow the conventional URL-loading error codes so
/// values coming from platform transports round-trip through
/// [`TransportFailure::from_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportFailure {
    /// The task was cancelled.
    Cancelled,
    /// The request timed out.
    TimedOut,
    /// The host name could not be found.
    CannotFindHost,
    /// The host refused or dropped the connection attempt.
    CannotConnectToHost,
    /// DNS lookup failed.
    DnsLookupFailed,
    /// The connection was lost mid-request.
    NetworkConnectionLost,
    /// No network route (airplane mode, no interface up).
    NotConnectedToInternet,
    /// Cellular roaming is disabled.
    InternationalRoamingOff,
    /// Cellular data is disabled for this process.
    DataNotAllowed,
    /// A voice call prevents data use.
    CallIsActive,
    /// TLS handshake failed.
    SecureConnectionFailed,
    /// The server sent an unparseable response.
    BadServerResponse,
    /// Any other transport-specific code.
    Other(i64),
}

impl TransportFailure {
    /// Numeric code of this failure.
    pub fn code(&self) -> i64 {
        match self {
            Self::Cancelled => -999,
            Self::TimedOut => -1001,
            Self::CannotFindHost => -1003,
            Self::CannotConnectToHost => -1004,
            Self::NetworkConnectionLost => -1005,
            Self::DnsLookupFailed => -1006,
            Self::NotConnectedToInternet => -1009,
            Self::BadServerResponse => -1011,
            Self::InternationalRoamingOff => -1018,
            Self::CallIsActive => -1019,
            Self::DataNotAllowed => -1020,
            Self::SecureConnectionFailed => -1200,
            Self::Other(code) => *code,
        }
    }

    /// Map a numeric code back to a failure.
    pub fn from_code(code: i64) -> Self {
        match code {
            -999 => Self::Cancelled,
            -1001 => Self::TimedOut,
            -1003 => Self::CannotFindHost,
            -1004 => Self::CannotConnectToHost,
            -1005 => Self::NetworkConnectionLost,
            -1006 => Self::DnsLookupFailed,
            -1009 => Self::NotConnectedToInternet,
            -1011 => Self::BadServerResponse,
            -1018 => Self::InternationalRoamingOff,
            -1019 => Self::CallIsActive,
            -1020 => Self::DataNotAllowed,
            -1200 => Self::SecureConnectionFailed,
            other => Self::Other(other),
        }
    }

    /// Whether this failure means "the device is not usefully online".
    pub fn is_connectivity_failure(&self) -> bool {
        matches!(
            self,
            Self::TimedOut
                | Self::CannotFindHost
                | Self::CannotConnectToHost
                | Self::DnsLookupFailed
                | Self::NetworkConnectionLost
                | Self::NotConnectedToInternet
                | Self::InternationalRoamingOff
                | Self::DataNotAllowed
                | Self::CallIsActive
        )
    }
}

impl std::fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Other(code) => write!(f, "transport error {code}"),
            other => write!(f, "{other:?} ({})", other.code()),
        }
    }
}

/// Connection-level failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionErrorReason {
    /// The device could not reach the network.
    #[error("not connected to the internet")]
    NotConnectedToInternet,
    /// The request was cancelled.
    #[error("the request was cancelled")]
    Cancelled,
    /// Any other transport failure.
    #[error("unexpected connection failure: {0}")]
    Unexpected(TransportFailure),
}

/// Misuse of the endpoint operation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EndpointOperationError {
    /// `retry()` was called before the endpoint was ever sent.
    #[error("retry called before the endpoint was sent")]
    RetryBeforeSent,
    /// `send()`/`retry()` was called while a previous send is still in flight.
    #[error("the endpoint is already in flight")]
    AlreadyInFlight,
}

/// Global listener families a classified failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureFamily {
    /// HTTP 401.
    Unauthorized,
    /// HTTP 4xx other than 401.
    DefectiveClient,
    /// HTTP 5xx.
    UnresponsiveServer,
    /// Connection-level failures other than cancellation.
    UnavailableNetwork,
    /// The request was cancelled.
    Cancelled,
}

/// A classified dispatch failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    /// The request could not be encoded.
    #[error("request encoding failed: {0}")]
    RequestEncoding(#[from] RequestEncodingReason),

    /// The response body could not be decoded.
    #[error("response serialization failed: {reason}")]
    ResponseSerialization {
        /// What went wrong.
        reason: ResponseSerializationReason,
        /// The raw body, if any was received.
        response_data: Option<Bytes>,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status_code}: {reason}")]
    Http {
        /// The HTTP status code.
        status_code: u16,
        /// Derived classification of the status code.
        reason: HttpErrorReason,
        /// The raw body, if any was received.
        response_data: Option<Bytes>,
    },

    /// The transport failed before an HTTP status was received.
    #[error("connection error: {0}")]
    Connection(ConnectionErrorReason),

    /// The endpoint surface was misused.
    #[error("endpoint operation error: {0}")]
    EndpointOperation(#[from] EndpointOperationError),

    /// Any failure that fits no other category.
    #[error("unexpected error: {message}")]
    Unexpected {
        /// Rendered underlying cause.
        message: String,
        /// The raw body, if any was received.
        response_data: Option<Bytes>,
    },
}

impl NetworkError {
    /// Create an HTTP error for a status code.
    pub fn http(status_code: u16, response_data: Option<Bytes>) -> Self {
        Self::Http {
            status_code,
            reason: HttpErrorReason::from_status(status_code),
            response_data,
        }
    }

    /// Create a deserialization error.
    pub fn decoding(message: impl Into<String>, response_data: Option<Bytes>) -> Self {
        Self::ResponseSerialization {
            reason: ResponseSerializationReason::Decoding {
                message: message.into(),
            },
            response_data,
        }
    }

    /// Create an unexpected error.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            message: message.into(),
            response_data: None,
        }
    }

    /// The HTTP status code, for [`NetworkError::Http`].
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// The HTTP classification, for [`NetworkError::Http`].
    pub fn http_reason(&self) -> Option<HttpErrorReason> {
        match self {
            Self::Http { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// The raw response body carried by this error, if any.
    pub fn response_data(&self) -> Option<&Bytes> {
        match self {
            Self::ResponseSerialization { response_data, .. }
            | Self::Http { response_data, .. }
            | Self::Unexpected { response_data, .. } => response_data.as_ref(),
            _ => None,
        }
    }

    /// Whether this error represents a cancelled request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Connection(ConnectionErrorReason::Cancelled))
    }

    /// The listener family this error belongs to, if any.
    pub fn family(&self) -> Option<FailureFamily> {
        match self {
            Self::Http { reason, .. } => match reason {
                HttpErrorReason::Unauthorized => Some(FailureFamily::Unauthorized),
                HttpErrorReason::BadRequest
                | HttpErrorReason::Forbidden
                | HttpErrorReason::NotFound
                | HttpErrorReason::Client => Some(FailureFamily::DefectiveClient),
                HttpErrorReason::NotImplemented
                | HttpErrorReason::ServiceUnavailable
                | HttpErrorReason::Server => Some(FailureFamily::UnresponsiveServer),
                HttpErrorReason::Redirection | HttpErrorReason::Unknown => None,
            },
            Self::Connection(ConnectionErrorReason::Cancelled) => Some(FailureFamily::Cancelled),
            Self::Connection(_) => Some(FailureFamily::UnavailableNetwork),
            _ => None,
        }
    }
}

impl From<url::ParseError> for NetworkError {
    fn from(err: url::ParseError) -> Self {
        Self::RequestEncoding(RequestEncodingReason::InvalidUrl {
            url: String::new(),
            message: err.to_string(),
        })
    }
}

impl From<serde_json::Error> for NetworkError {
    fn from(err: serde_json::Error) -> Self {
        Self::decoding(err.to_string(), None)
    }
}

impl From<std::io::Error> for NetworkError {
    fn from(err: std::io::Error) -> Self {
        Self::unexpected(err.to_string())
    }
}

impl From<toml::de::Error> for NetworkError {
    fn from(err: toml::de::Error) -> Self {
        Self::unexpected(format!("invalid configuration: {err}"))
    }
}

/// A specialized Result type for network operations.
pub type Result<T> = std::result::Result<T, NetworkError>;
