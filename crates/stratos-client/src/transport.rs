//! The network seam.
//!
//! The core never performs I/O itself: it hands a [`RequestDescriptor`] to a
//! [`Transport`] and consumes the eventual [`TransportResponse`] or
//! [`TransportFailure`]. [`HttpTransport`] is the reqwest-backed default; any
//! implementation (including test doubles) can be bound through
//! [`TransportBinding`].

use crate::error::ClientError;
use crate::request::{Method, RequestBody, RequestDescriptor};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;

/// Raw outcome of a completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, lower-cased names.
    pub headers: BTreeMap<String, String>,
    /// Response body.
    pub body: Bytes,
}

impl TransportResponse {
    /// Whether the status is in the HTTP success range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport-level failure: the exchange never produced an HTTP response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    /// Connection could not be established or was dropped.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The exchange exceeded the configured timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// TLS handshake or certificate validation failed.
    #[error("tls failure: {0}")]
    Tls(String),
}

/// One asynchronous HTTP exchange. Correlation and completion routing live
/// in the dispatcher; a transport only turns a descriptor into an outcome.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, request: RequestDescriptor) -> Result<TransportResponse, TransportFailure>;
}

/// How the dispatcher holds its transport.
///
/// `Owned` keeps the transport alive for the binding's lifetime; `Borrowed`
/// leaves the lifetime with the caller, and a dropped borrowed transport
/// surfaces as [`ClientError::TransportGone`](crate::ClientError::TransportGone)
/// on subsequent submissions. Never implicit.
pub enum TransportBinding {
    /// The dispatcher owns the transport and drops it with the binding.
    Owned(Arc<dyn Transport>),
    /// The transport is caller-managed; the dispatcher never extends its
    /// lifetime.
    Borrowed(Weak<dyn Transport>),
}

impl TransportBinding {
    /// Borrow a caller-managed transport.
    pub fn borrowed(transport: &Arc<dyn Transport>) -> Self {
        Self::Borrowed(Arc::downgrade(transport))
    }

    pub(crate) fn acquire(&self) -> Option<Arc<dyn Transport>> {
        match self {
            Self::Owned(transport) => Some(transport.clone()),
            Self::Borrowed(transport) => transport.upgrade(),
        }
    }
}

/// Configuration of the default HTTP transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Accept invalid TLS certificates. Opt-in, intended only for
    /// non-production endpoints; the client refuses to honor it against the
    /// production URL.
    pub accept_invalid_certs: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(60), accept_invalid_certs: false }
    }
}

/// Default transport on reqwest.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder().timeout(config.timeout);
        if config.accept_invalid_certs {
            tracing::warn!(
                "TLS certificate validation is DISABLED; all certificate errors will be ignored"
            );
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder.build().map_err(|e| ClientError::Config(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: RequestDescriptor) -> Result<TransportResponse, TransportFailure> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(bytes) => builder.body(bytes),
            RequestBody::File(path) => {
                let bytes = tokio::fs::read(&path).await.map_err(|e| {
                    TransportFailure::Connection(format!("could not read {}: {e}", path.display()))
                })?;
                builder.body(bytes)
            }
        };

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let mut headers = BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_string(), value.to_string());
            }
        }
        let body = response.bytes().await.map_err(classify)?;
        Ok(TransportResponse { status, headers, body })
    }
}

fn classify(error: reqwest::Error) -> TransportFailure {
    let message = error.to_string();
    if error.is_timeout() {
        TransportFailure::Timeout(message)
    } else if message.contains("certificate") || message.contains("tls") {
        TransportFailure::Tls(message)
    } else {
        TransportFailure::Connection(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_range_is_2xx() {
        let response =
            TransportResponse { status: 204, headers: BTreeMap::new(), body: Bytes::new() };
        assert!(response.is_success());
        let response = TransportResponse { status: 301, ..response };
        assert!(!response.is_success());
    }

    #[test]
    fn borrowed_binding_does_not_extend_lifetime() {
        struct NullTransport;
        #[async_trait]
        impl Transport for NullTransport {
            async fn send(
                &self,
                _request: RequestDescriptor,
            ) -> Result<TransportResponse, TransportFailure> {
                Err(TransportFailure::Connection("null".to_string()))
            }
        }

        let transport: Arc<dyn Transport> = Arc::new(NullTransport);
        let binding = TransportBinding::borrowed(&transport);
        assert!(binding.acquire().is_some());

        drop(transport);
        assert!(binding.acquire().is_none());
    }
}
