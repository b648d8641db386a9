//! Request descriptor types.
//!
//! A [`RequestDescriptor`] is the transport-agnostic description of one HTTP
//! call: where it goes, how it is encoded, and how the transport should
//! treat it. Endpoints own a descriptor and hand a snapshot of it to the
//! transport on every send, so later mutation never affects a call that has
//! already been dispatched.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{RequestEncodingReason, Result};

/// HTTP request methods.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// HTTP GET method.
    #[default]
    Get,
    /// HTTP POST method.
    Post,
    /// HTTP PUT method.
    Put,
    /// HTTP DELETE method.
    Delete,
    /// HTTP PATCH method.
    Patch,
    /// HTTP HEAD method.
    Head,
    /// HTTP OPTIONS method.
    Options,
}

impl HttpMethod {
    /// Convert to the `http` crate's method type.
    pub fn to_http(self) -> http::Method {
        match self {
            Self::Get => http::Method::GET,
            Self::Post => http::Method::POST,
            Self::Put => http::Method::PUT,
            Self::Delete => http::Method::DELETE,
            Self::Patch => http::Method::PATCH,
            Self::Head => http::Method::HEAD,
            Self::Options => http::Method::OPTIONS,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Delete => write!(f, "DELETE"),
            Self::Patch => write!(f, "PATCH"),
            Self::Head => write!(f, "HEAD"),
            Self::Options => write!(f, "OPTIONS"),
        }
    }
}

/// The body of an HTTP request.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum RequestBody {
    /// No body.
    #[default]
    None,
    /// Plain text body.
    Text(String),
    /// JSON body (serialized from a value).
    Json(serde_json::Value),
    /// URL-encoded form data.
    Form(HashMap<String, String>),
    /// Raw binary body.
    Bytes(Bytes),
}

impl RequestBody {
    /// Whether there is no body.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Approximate encoded size in bytes, for logging.
    pub fn len_hint(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Text(text) => text.len(),
            Self::Json(value) => value.to_string().len(),
            Self::Form(fields) => fields.iter().map(|(k, v)| k.len() + v.len() + 2).sum(),
            Self::Bytes(bytes) => bytes.len(),
        }
    }
}

/// How the transport may use cached responses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Follow the protocol's caching semantics.
    #[default]
    UseProtocolCachePolicy,
    /// Always go to the origin.
    ReloadIgnoringCache,
    /// Use a cached response if present, regardless of age.
    ReturnCacheElseLoad,
    /// Only use a cached response; never load.
    ReturnCacheDontLoad,
}

impl CachePolicy {
    /// The `Cache-Control` request directive that expresses this policy, if any.
    pub fn cache_control(&self) -> Option<&'static str> {
        match self {
            Self::UseProtocolCachePolicy => None,
            Self::ReloadIgnoringCache => Some("no-cache"),
            Self::ReturnCacheElseLoad => Some("max-stale"),
            Self::ReturnCacheDontLoad => Some("only-if-cached"),
        }
    }
}

/// How to merge a header into existing ones.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HeaderPolicy {
    /// Replace any existing value.
    #[default]
    Replace,
    /// Add another value next to existing ones.
    Append,
    /// Only set the header if it is not already present.
    KeepExisting,
}

/// One part of a multipart form.
#[derive(Clone, Debug, PartialEq)]
pub enum MultipartPart {
    /// A text field.
    Text {
        /// Field name.
        name: String,
        /// Field value.
        value: String,
    },
    /// A file field.
    File {
        /// Field name.
        name: String,
        /// File contents.
        bytes: Bytes,
        /// File name sent to the server.
        filename: String,
        /// MIME type, if known.
        mime_type: Option<String>,
    },
}

/// Multipart form data for file uploads.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MultipartForm {
    parts: Vec<MultipartPart>,
}

impl MultipartForm {
    /// Create a new empty multipart form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text field to the form.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(MultipartPart::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Add a file field from bytes.
    pub fn file_bytes(
        mut self,
        name: impl Into<String>,
        bytes: impl Into<Bytes>,
        filename: impl Into<String>,
        mime_type: Option<&str>,
    ) -> Self {
        self.parts.push(MultipartPart::File {
            name: name.into(),
            bytes: bytes.into(),
            filename: filename.into(),
            mime_type: mime_type.map(str::to_string),
        });
        self
    }

    /// The parts in insertion order.
    pub fn parts(&self) -> &[MultipartPart] {
        &self.parts
    }

    /// Whether the form has no parts.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// What kind of transfer the transport should perform.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum OperationKind {
    /// Plain request; the response body is returned in memory.
    #[default]
    Data,
    /// Upload raw bytes as the request body.
    Upload(Bytes),
    /// Upload a multipart form.
    Multipart(MultipartForm),
    /// Stream the response body to a file.
    Download {
        /// Where to write the body.
        destination: PathBuf,
    },
}

impl OperationKind {
    /// Short name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Upload(_) => "upload",
            Self::Multipart(_) => "multipart",
            Self::Download { .. } => "download",
        }
    }
}

/// Transport-agnostic description of one HTTP call.
#[derive(Clone, Debug)]
pub struct RequestDescriptor {
    /// Base URL (scheme, host, optional path prefix).
    pub base_url: String,
    /// Path relative to the base URL; also the task registry key.
    pub path: String,
    /// The HTTP method.
    pub method: HttpMethod,
    /// Query parameters, in order.
    pub query: Vec<(String, String)>,
    /// Request body.
    pub body: RequestBody,
    /// Request headers.
    pub headers: http::HeaderMap,
    /// Per-request timeout; `None` uses the transport default.
    pub timeout: Option<Duration>,
    /// Cache policy.
    pub cache_policy: CachePolicy,
    /// Transfer kind.
    pub kind: OperationKind,
}

impl RequestDescriptor {
    /// Create a descriptor with no query, body, or headers.
    pub fn new(base_url: impl Into<String>, method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path: normalize_path(path.into()),
            method,
            query: Vec::new(),
            body: RequestBody::None,
            headers: http::HeaderMap::new(),
            timeout: None,
            cache_policy: CachePolicy::default(),
            kind: OperationKind::Data,
        }
    }

    /// Build the full URL, including query parameters.
    pub fn url(&self) -> Result<Url> {
        let base = self.base_url.trim();
        if base.is_empty() {
            return Err(RequestEncodingReason::EmptyUrl.into());
        }

        let joined = format!("{}{}", base.trim_end_matches('/'), self.path);
        let mut url = Url::parse(&joined).map_err(|e| RequestEncodingReason::InvalidUrl {
            url: joined.clone(),
            message: e.to_string(),
        })?;
        if url.cannot_be_a_base() {
            return Err(RequestEncodingReason::InvalidUrl {
                url: joined,
                message: "URL cannot carry a path".to_string(),
            }
            .into());
        }

        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (position, (key, value)) in self.query.iter().enumerate() {
                if key.is_empty() {
                    return Err(RequestEncodingReason::InvalidQuery {
                        field: format!("<empty key at {position}>"),
                    }
                    .into());
                }
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    /// Merge a header according to `policy`.
    pub fn apply_header(
        &mut self,
        name: http::HeaderName,
        value: http::HeaderValue,
        policy: HeaderPolicy,
    ) {
        match policy {
            HeaderPolicy::Replace => {
                self.headers.insert(name, value);
            }
            HeaderPolicy::Append => {
                self.headers.append(name, value);
            }
            HeaderPolicy::KeepExisting => {
                self.headers.entry(name).or_insert(value);
            }
        }
    }

    /// `METHOD path` summary, for logging.
    pub fn summary(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Parse a header pair, reporting the header name on failure.
pub(crate) fn parse_header(
    name: impl AsRef<str>,
    value: impl AsRef<str>,
) -> Result<(http::HeaderName, http::HeaderValue)> {
    let name_str = name.as_ref();
    let invalid = || RequestEncodingReason::InvalidHeader {
        name: name_str.to_string(),
    };
    let header_name = http::HeaderName::try_from(name_str).map_err(|_| invalid())?;
    let header_value = http::HeaderValue::try_from(value.as_ref()).map_err(|_| invalid())?;
    Ok((header_name, header_value))
}

pub(crate) fn normalize_path(path: String) -> String {
    if path.is_empty() || path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkError;

    #[test]
    fn test_url_joins_base_and_path() {
        let request = RequestDescriptor::new("https://api.example.com/", HttpMethod::Get, "users/42");
        assert_eq!(request.path, "/users/42");
        assert_eq!(
            request.url().expect("valid url").as_str(),
            "https://api.example.com/users/42"
        );
    }

    #[test]
    fn test_url_with_query() {
        let mut request = RequestDescriptor::new("https://api.example.com", HttpMethod::Get, "/search");
        request.query.push(("q".into(), "rust lang".into()));
        request.query.push(("page".into(), "2".into()));
        assert_eq!(
            request.url().expect("valid url").as_str(),
            "https://api.example.com/search?q=rust+lang&page=2"
        );
    }

    #[test]
    fn test_empty_base_url() {
        let request = RequestDescriptor::new("  ", HttpMethod::Get, "/users");
        assert_eq!(
            request.url().unwrap_err(),
            NetworkError::RequestEncoding(RequestEncodingReason::EmptyUrl)
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let request = RequestDescriptor::new("not a url", HttpMethod::Get, "/users");
        assert!(matches!(
            request.url(),
            Err(NetworkError::RequestEncoding(RequestEncodingReason::InvalidUrl { .. }))
        ));
    }

    #[test]
    fn test_empty_query_key_rejected() {
        let mut request = RequestDescriptor::new("https://api.example.com", HttpMethod::Get, "/a");
        request.query.push(("page".into(), "2".into()));
        request.query.push((String::new(), "orphan".into()));
        assert_eq!(
            request.url().err(),
            Some(NetworkError::RequestEncoding(RequestEncodingReason::InvalidQuery {
                field: "<empty key at 1>".to_string(),
            }))
        );
    }

    #[test]
    fn test_header_policies() {
        let mut request = RequestDescriptor::new("https://api.example.com", HttpMethod::Get, "/a");
        let (name, first) = parse_header("X-Trace", "one").expect("valid header");
        let (_, second) = parse_header("X-Trace", "two").expect("valid header");

        request.apply_header(name.clone(), first.clone(), HeaderPolicy::Replace);
        request.apply_header(name.clone(), second.clone(), HeaderPolicy::KeepExisting);
        assert_eq!(request.headers.get(&name), Some(&first));

        request.apply_header(name.clone(), second.clone(), HeaderPolicy::Append);
        assert_eq!(request.headers.get_all(&name).iter().count(), 2);

        request.apply_header(name.clone(), second.clone(), HeaderPolicy::Replace);
        assert_eq!(request.headers.get_all(&name).iter().count(), 1);
        assert_eq!(request.headers.get(&name), Some(&second));
    }

    #[test]
    fn test_invalid_header_reports_name() {
        assert_eq!(
            parse_header("bad header", "x").unwrap_err(),
            NetworkError::RequestEncoding(RequestEncodingReason::InvalidHeader {
                name: "bad header".to_string()
            })
        );
    }

    #[test]
    fn test_cache_policy_directives() {
        assert_eq!(CachePolicy::UseProtocolCachePolicy.cache_control(), None);
        assert_eq!(CachePolicy::ReloadIgnoringCache.cache_control(), Some("no-cache"));
    }
}
