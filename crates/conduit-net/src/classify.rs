//! Classification of raw transport outcomes into the error taxonomy.
//!
//! Classification happens exactly once per completion, in the dispatcher.
//! The rules are a pure function of the HTTP status code and the transport
//! failure code:
//!
//! | Signal | Result |
//! |--------|--------|
//! | no status, cancelled | `Connection(Cancelled)` |
//! | no status, connectivity failure | `Connection(NotConnectedToInternet)` |
//! | no status, other failure | `Connection(Unexpected(code))` |
//! | no status, no failure | `Unexpected` |
//! | rejected by the transport | `Unexpected` |
//! | 2xx, body read failed | as the failure with no status |
//! | 2xx | success |
//! | 3xx .. 5xx | `Http` with [`from_status`](crate::error::HttpErrorReason::from_status) |
//! | anything else | `Http(Unknown)` |

use bytes::Bytes;

use crate::error::{ConnectionErrorReason, NetworkError, TransportFailure};
use crate::transport::TransportOutcome;

/// Whether a status code counts as success.
pub fn is_success_status(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Classify a transport-level failure that happened before any status.
pub fn classify_failure(failure: TransportFailure) -> NetworkError {
    let reason = if failure == TransportFailure::Cancelled {
        ConnectionErrorReason::Cancelled
    } else if failure.is_connectivity_failure() {
        ConnectionErrorReason::NotConnectedToInternet
    } else {
        ConnectionErrorReason::Unexpected(failure)
    };
    NetworkError::Connection(reason)
}

/// Classify a completed transport outcome.
///
/// Returns `None` when the outcome is a success. A non-2xx status always
/// wins over a transport failure code: the server answered. A 2xx status
/// with a failure means the body was lost in transit.
pub fn classify(
    status: Option<u16>,
    failure: Option<TransportFailure>,
    data: Option<&Bytes>,
) -> Option<NetworkError> {
    match (status, failure) {
        (Some(status), Some(failure)) if is_success_status(status) => {
            Some(classify_failure(failure))
        }
        (Some(status), None) if is_success_status(status) => None,
        (Some(status), _) => Some(NetworkError::http(status, data.cloned())),
        (None, Some(failure)) => Some(classify_failure(failure)),
        (None, None) => Some(NetworkError::Unexpected {
            message: "transport completed without a status or failure".to_string(),
            response_data: data.cloned(),
        }),
    }
}

/// Classify everything a transport reported for one completion.
///
/// A rejection recorded by the transport only applies to responses whose
/// status would otherwise count as success.
pub fn classify_outcome(outcome: &TransportOutcome) -> Option<NetworkError> {
    let error = classify(outcome.status, outcome.failure, outcome.data.as_ref());
    match (&error, &outcome.rejection) {
        (None, Some(message)) => Some(NetworkError::Unexpected {
            message: message.clone(),
            response_data: outcome.data.clone(),
        }),
        _ => error,
    }
}
