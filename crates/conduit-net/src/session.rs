//! Session credentials.
//!
//! A [`Session`] persists [`Credentials`] as an opaque JSON blob in a
//! [`KeyValueStore`] under [`CREDENTIALS_KEY`], and can produce a request
//! [`Interceptor`] that authorizes every dispatched request.
//!
//! ```
//! use conduit_net::session::{Credentials, MemoryStore, Session};
//!
//! let session = Session::new(MemoryStore::new());
//! session.store_credentials(&Credentials::bearer("abc123")).unwrap();
//! assert!(session.is_authenticated());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use conduit_core::logging::targets;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::dispatch::Interceptor;
use crate::error::Result;
use crate::request::{HeaderPolicy, RequestDescriptor, parse_header};

/// Fixed identifier the credentials blob is stored under.
pub const CREDENTIALS_KEY: &str = "conduit.session.credentials";

/// Opaque byte storage keyed by string, typically backed by a secure store.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: Bytes) -> Result<()>;

    /// Remove the value under `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<Bytes>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: Bytes) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, Bytes>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: Bytes) -> Result<()> {
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.write().remove(key);
        Ok(())
    }
}

/// Authentication credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Token sent with every request.
    pub access_token: String,
    /// Token used to obtain a new access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Authorization scheme, e.g. `Bearer`.
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Credentials {
    /// Bearer credentials without a refresh token.
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: default_token_type(),
        }
    }

    /// Attach a refresh token.
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// The `Authorization` header value.
    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

// Tokens stay out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token_type", &self.token_type)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish_non_exhaustive()
    }
}

/// Credential persistence on top of a [`KeyValueStore`]. Clones share the store.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn KeyValueStore>,
}

impl Session {
    /// Create a session over `store`.
    pub fn new(store: impl KeyValueStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// The stored credentials, if any.
    ///
    /// A blob that no longer decodes is treated as absent.
    pub fn credentials(&self) -> Result<Option<Credentials>> {
        let Some(blob) = self.store.get(CREDENTIALS_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_slice(&blob) {
            Ok(credentials) => Ok(Some(credentials)),
            Err(err) => {
                tracing::warn!(target: targets::SESSION, error = %err, "discarding unreadable credentials");
                Ok(None)
            }
        }
    }

    /// Persist `credentials`, replacing any previous ones.
    pub fn store_credentials(&self, credentials: &Credentials) -> Result<()> {
        let blob = serde_json::to_vec(credentials)?;
        self.store.set(CREDENTIALS_KEY, Bytes::from(blob))?;
        tracing::debug!(target: targets::SESSION, token_type = %credentials.token_type, "credentials stored");
        Ok(())
    }

    /// Forget the stored credentials.
    pub fn clear(&self) -> Result<()> {
        self.store.remove(CREDENTIALS_KEY)?;
        tracing::debug!(target: targets::SESSION, "credentials cleared");
        Ok(())
    }

    /// Whether credentials are stored.
    pub fn is_authenticated(&self) -> bool {
        matches!(self.credentials(), Ok(Some(_)))
    }

    /// An interceptor adding `Authorization` to requests that lack one.
    ///
    /// Credentials are read on every request, so later calls to
    /// [`store_credentials`](Self::store_credentials) or [`clear`](Self::clear)
    /// take effect immediately.
    pub fn interceptor(&self) -> Interceptor {
        let session = self.clone();
        Arc::new(move |request: &mut RequestDescriptor| {
            let credentials = match session.credentials() {
                Ok(Some(credentials)) => credentials,
                Ok(None) => return,
                Err(err) => {
                    tracing::warn!(target: targets::SESSION, error = %err, "credential store unavailable");
                    return;
                }
            };
            match parse_header("Authorization", credentials.authorization()) {
                Ok((name, value)) => request.apply_header(name, value, HeaderPolicy::KeepExisting),
                Err(err) => {
                    tracing::warn!(target: targets::SESSION, error = %err, "stored token is not a valid header value");
                }
            }
        })
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}
