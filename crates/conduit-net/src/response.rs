//! Responses and body decoding.
//!
//! A [`Response`] is the immutable result of one dispatched call. It always
//! reaches the caller, whether or not the call succeeded; `error` holds the
//! classified failure, if any.
//!
//! Decoding is explicit: callers pass a [`DecodeStrategy`] value to
//! [`Response::decode`] instead of relying on type-level configuration.
//!
//! ```ignore
//! let users: Vec<User> = response.decode(&JsonStrategy::new().key_path("data.users"))?;
//! let text: String = response.decode(&TextStrategy)?;
//! ```

use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::error::{NetworkError, ResponseSerializationReason, Result};
use crate::request::RequestDescriptor;

/// The immutable result of one dispatched call.
#[derive(Clone, Debug)]
pub struct Response {
    /// The request as it was dispatched.
    pub request: RequestDescriptor,
    /// HTTP status code, if the server answered.
    pub status_code: Option<u16>,
    /// Raw response headers.
    pub headers: http::HeaderMap,
    /// Raw body bytes, if any.
    pub data: Option<Bytes>,
    /// The classified error; `None` on success.
    pub error: Option<NetworkError>,
    /// Time from dispatch to completion.
    pub elapsed: Duration,
}

impl Response {
    /// Build a response that failed before reaching the transport.
    pub fn failed(request: RequestDescriptor, error: NetworkError) -> Self {
        Self {
            request,
            status_code: None,
            headers: http::HeaderMap::new(),
            data: None,
            error: Some(error),
            elapsed: Duration::ZERO,
        }
    }

    /// Whether the call succeeded (no classified error).
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Get a specific header value.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    /// Get the Content-Type header value.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Decode the body with the given strategy.
    ///
    /// Decoding uses the body even when the call failed, so server error
    /// payloads can be decoded too.
    pub fn decode<T, S>(&self, strategy: &S) -> Result<T>
    where
        S: DecodeStrategy<T> + ?Sized,
    {
        strategy.decode(self.data.as_ref())
    }
}

/// Strategy that turns raw body bytes into a value.
pub trait DecodeStrategy<T>: Send + Sync {
    /// Decode `data` into a value.
    fn decode(&self, data: Option<&Bytes>) -> Result<T>;
}

/// Decode a JSON body, optionally descending into a nested key path first.
#[derive(Clone, Debug, Default)]
pub struct JsonStrategy {
    key_path: Option<String>,
    allow_empty: bool,
}

impl JsonStrategy {
    /// Decode the whole body.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the value found at a dotted key path (e.g. `"data.items"`).
    pub fn key_path(mut self, path: impl Into<String>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    /// Treat an empty body as JSON `null` instead of an error.
    pub fn allow_empty(mut self) -> Self {
        self.allow_empty = true;
        self
    }
}

impl<T: DeserializeOwned> DecodeStrategy<T> for JsonStrategy {
    fn decode(&self, data: Option<&Bytes>) -> Result<T> {
        let data = match data {
            Some(data) if !data.is_empty() => data,
            _ if self.allow_empty => {
                return serde_json::from_value(serde_json::Value::Null)
                    .map_err(|e| NetworkError::decoding(e.to_string(), None));
            }
            other => return Err(serialization(ResponseSerializationReason::EmptyData, other)),
        };

        let decode_err = |e: serde_json::Error| NetworkError::decoding(e.to_string(), Some(data.clone()));

        match &self.key_path {
            None => serde_json::from_slice(data).map_err(decode_err),
            Some(path) => {
                let root: serde_json::Value = serde_json::from_slice(data).map_err(decode_err)?;
                let pointer = format!("/{}", path.replace('.', "/"));
                let nested = root.pointer(&pointer).cloned().ok_or_else(|| {
                    NetworkError::decoding(format!("key path '{path}' not found"), Some(data.clone()))
                })?;
                serde_json::from_value(nested).map_err(decode_err)
            }
        }
    }
}

/// Decode a UTF-8 text body.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextStrategy;

impl DecodeStrategy<String> for TextStrategy {
    fn decode(&self, data: Option<&Bytes>) -> Result<String> {
        let data = data.ok_or_else(|| serialization(ResponseSerializationReason::EmptyData, None))?;
        String::from_utf8(data.to_vec())
            .map_err(|_| serialization(ResponseSerializationReason::CorruptedData, Some(data)))
    }
}

/// Return the raw body; fails only if no body was received.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawStrategy;

impl DecodeStrategy<Bytes> for RawStrategy {
    fn decode(&self, data: Option<&Bytes>) -> Result<Bytes> {
        data.cloned()
            .ok_or_else(|| serialization(ResponseSerializationReason::EmptyData, None))
    }
}

/// A response paired with the outcome of decoding its body.
#[derive(Clone, Debug)]
pub struct Decoded<T> {
    /// The response. When decoding failed on an otherwise successful
    /// response, `response.error` holds the serialization error.
    pub response: Response,
    /// The decoded value, or the error that prevented it.
    pub value: Result<T>,
}

impl<T> Decoded<T> {
    /// Decode `response` with `strategy`.
    ///
    /// A classified transport/HTTP error is reported as-is. Otherwise a
    /// decoding failure is reported as a response serialization error, even
    /// when the HTTP status was successful.
    pub fn from_response<S>(mut response: Response, strategy: &S) -> Self
    where
        S: DecodeStrategy<T> + ?Sized,
    {
        if let Some(error) = response.error.clone() {
            return Self {
                response,
                value: Err(error),
            };
        }

        let value = response.decode(strategy);
        if let Err(error) = &value {
            response.error = Some(error.clone());
        }
        Self { response, value }
    }

    /// Whether decoding produced a value.
    pub fn is_success(&self) -> bool {
        self.value.is_ok()
    }
}

fn serialization(reason: ResponseSerializationReason, data: Option<&Bytes>) -> NetworkError {
    NetworkError::ResponseSerialization {
        reason,
        response_data: data.cloned(),
    }
}
