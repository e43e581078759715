//! Error types for the Stratos client.

use stratos_types::ErrorResponse;
use thiserror::Error;

/// Local validation failure.
///
/// The logical operation is rejected before any request is built: no
/// transport call is made and no [`Reply`](crate::Reply) is created. Client
/// methods surface this as `None`; the detail is logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The mutation payload is an empty object; there is nothing to send.
    #[error("payload is empty, no operation to perform")]
    EmptyPayload,

    /// The payload is missing a non-empty `objectType` field.
    #[error("payload is missing a non-empty objectType")]
    MissingObjectType,

    /// The payload is missing the backend-assigned `id` field.
    #[error("payload is missing the object id")]
    MissingObjectId,

    /// An upload's associated object does not declare an `objectType`.
    #[error("upload association is missing object.objectType")]
    MissingFileAssociation,

    /// The request URL could not be constructed from the configured base.
    #[error("could not build request url: {0}")]
    InvalidUrl(String),

    /// The payload could not be serialized into a request body.
    #[error("could not serialize payload: {0}")]
    Serialize(String),
}

/// Errors delivered through a [`Reply`](crate::Reply)'s single completion,
/// plus construction-time configuration failures.
///
/// Never panics, never thrown synchronously from an operation: everything
/// network-shaped arrives as the finished reply's outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The transport exchange itself failed (connection, timeout, TLS).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The borrowed transport was dropped by its owner, or the binding was
    /// replaced while the request was pending.
    #[error("transport is no longer available")]
    TransportGone,

    /// The backend answered with a non-success HTTP status.
    #[error("backend error ({status}): {message}")]
    Backend {
        /// HTTP status code.
        status: u16,
        /// Backend-supplied error code, when present in the body.
        code: Option<String>,
        /// Backend-supplied message, or the raw body text.
        message: String,
    },

    /// A success response carried a body that could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The client was constructed with an unusable configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Build a [`ClientError::Backend`] from a non-success response body,
    /// parsing the structured error shape when possible.
    pub(crate) fn from_error_body(status: u16, body: &[u8]) -> Self {
        if let Ok(parsed) = serde_json::from_slice::<ErrorResponse>(body) {
            if let Some(detail) = parsed.first() {
                return Self::Backend {
                    status,
                    code: detail.reason.clone(),
                    message: detail.message.clone(),
                };
            }
        }
        let message = String::from_utf8_lossy(body).trim().to_string();
        Self::Backend { status, code: None, message }
    }

    /// The HTTP status associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Backend { status, .. } => Some(*status),
            _ => None,
        }
    }
}
