//! The client facade: session, registry, serializer and dispatcher wired
//! together behind a cheaply cloneable handle.

use crate::dispatcher::Dispatcher;
use crate::error::ClientError;
use crate::identity::IdentityProvider;
use crate::registry::ObjectFactoryRegistry;
use crate::reply::Reply;
use crate::request::{JsonSerializer, OperationKind, RequestBuilder, Serializer};
use crate::session::{Session, SessionEvent, DEFAULT_API_URL};
use crate::transport::{HttpTransport, TransportBinding, TransportConfig};
use parking_lot::Mutex;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use stratos_types::{ObjectFactory, RemoteObject};
use url::Url;

/// Client construction parameters.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend id, from the Stratos dashboard.
    pub backend_id: String,
    /// Backend secret, from the Stratos dashboard.
    pub backend_secret: String,
    /// API endpoint; defaults to production.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Accept invalid TLS certificates. Honored only against non-production
    /// endpoints, and loudly logged when in effect.
    pub accept_invalid_certs: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_id: String::new(),
            backend_secret: String::new(),
            base_url: DEFAULT_API_URL.to_string(),
            timeout_secs: 60,
            accept_invalid_certs: false,
        }
    }
}

struct ClientInner {
    session: Session,
    registry: Arc<Mutex<ObjectFactoryRegistry>>,
    builder: RequestBuilder,
    dispatcher: Dispatcher,
}

/// Handle to one Stratos backend. Cloning shares the session, registry and
/// dispatcher. Must be created within a Tokio runtime.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Create a client with the default reqwest transport, owned by the
    /// dispatcher.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let base_url = parse_base(&config.base_url)?;
        let accept_invalid_certs = if config.accept_invalid_certs {
            if is_production(&base_url) {
                tracing::warn!(
                    "refusing to disable TLS validation against the production endpoint"
                );
                false
            } else {
                true
            }
        } else {
            false
        };
        let transport = HttpTransport::new(TransportConfig {
            timeout: Duration::from_secs(config.timeout_secs),
            accept_invalid_certs,
        })?;
        Ok(Self::assemble(config, base_url, TransportBinding::Owned(Arc::new(transport))))
    }

    /// Create a client over a caller-supplied transport binding.
    pub fn with_transport(
        config: ClientConfig,
        binding: TransportBinding,
    ) -> Result<Self, ClientError> {
        let base_url = parse_base(&config.base_url)?;
        Ok(Self::assemble(config, base_url, binding))
    }

    fn assemble(config: ClientConfig, base_url: Url, binding: TransportBinding) -> Self {
        let serializer: Arc<dyn Serializer> = Arc::new(JsonSerializer);
        let registry = Arc::new(Mutex::new(ObjectFactoryRegistry::new()));
        let session = Session::new(base_url);
        session.set_backend_id(&config.backend_id);
        session.set_backend_secret(&config.backend_secret);

        tracing::debug!(backend_id = %config.backend_id, "client created");
        Self {
            inner: Arc::new(ClientInner {
                session,
                registry: registry.clone(),
                builder: RequestBuilder::new(serializer.clone()),
                dispatcher: Dispatcher::new(binding, registry, serializer),
            }),
        }
    }

    /// The session holding identity and auth state.
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// Whether backend id and secret are both set.
    pub fn is_initialized(&self) -> bool {
        self.inner.session.is_initialized()
    }

    /// Subscribe to session state changes.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.inner.session.subscribe()
    }

    /// Replace the transport binding; see
    /// [`Dispatcher` semantics](crate::TransportBinding).
    pub fn set_transport(&self, binding: TransportBinding) {
        self.inner.dispatcher.set_transport(binding);
    }

    /// Install an identity provider; it is invoked by [`login`](Self::login).
    pub fn set_identity(&self, identity: Option<Arc<dyn IdentityProvider>>) {
        self.inner.session.set_identity(identity);
    }

    /// Acquire a session token through the installed identity provider and
    /// store it in the session.
    pub async fn login(&self) -> Result<(), ClientError> {
        let Some(identity) = self.inner.session.identity() else {
            return Err(ClientError::Config("no identity provider installed".to_string()));
        };
        let token = identity.acquire_token(self).await?;
        self.inner.session.set_auth_token(&token);
        self.inner.session.emit(SessionEvent::Authenticated);
        tracing::info!("session authenticated");
        Ok(())
    }

    /// Discard the session token and notify subscribers that the
    /// authenticated session ended. No-op while unauthenticated.
    pub fn logout(&self) {
        if self.inner.session.auth_token().is_empty() {
            return;
        }
        self.inner.session.set_auth_token("");
        self.inner.session.emit(SessionEvent::Terminated);
        tracing::info!("session terminated");
    }

    /// Register a custom object factory; newest registration wins.
    pub fn register_object_factory(&self, factory: Box<dyn ObjectFactory>) -> u64 {
        self.inner.registry.lock().register(factory)
    }

    /// Unregister a factory by the id returned from
    /// [`register_object_factory`](Self::register_object_factory).
    pub fn unregister_object_factory(&self, factory_id: u64) {
        self.inner.registry.lock().unregister(factory_id);
    }

    /// Construct an object of `object_type` through the factory chain.
    /// Never fails; unrecognized types yield the generic object.
    pub fn create_object(&self, object_type: &str, id: Option<&str>) -> Box<dyn RemoteObject> {
        self.inner.registry.lock().create_for_type(object_type, id)
    }

    pub(crate) fn registry(&self) -> Arc<Mutex<ObjectFactoryRegistry>> {
        self.inner.registry.clone()
    }

    /// Query objects. `None` means the payload failed local validation and
    /// no request was made.
    pub fn query(&self, payload: Value) -> Option<Reply> {
        self.submit(OperationKind::Query, &payload)
    }

    /// Full-text search. `None` on local validation failure.
    pub fn search(&self, payload: Value) -> Option<Reply> {
        self.submit(OperationKind::Search, &payload)
    }

    /// Create an object. `None` on local validation failure (e.g. an empty
    /// payload).
    pub fn create(&self, payload: Value) -> Option<Reply> {
        self.submit(OperationKind::Create, &payload)
    }

    /// Update fields of an existing object. `None` on local validation
    /// failure.
    pub fn update(&self, payload: Value) -> Option<Reply> {
        self.submit(OperationKind::Update, &payload)
    }

    /// Remove an existing object. `None` on local validation failure.
    pub fn remove(&self, payload: Value) -> Option<Reply> {
        self.submit(OperationKind::Remove, &payload)
    }

    /// Upload a file associated with an existing object. The association must
    /// declare `object.objectType`; otherwise no request is built.
    pub fn upload_file(&self, association: Value, file: impl AsRef<Path>) -> Option<Reply> {
        let snapshot = self.inner.session.snapshot();
        match self.inner.builder.upload_file(&association, file.as_ref(), &snapshot) {
            Ok(descriptor) => Some(self.inner.dispatcher.submit(descriptor)),
            Err(err) => {
                tracing::debug!(%err, "upload rejected locally; no request built");
                None
            }
        }
    }

    /// Exchange used by identity providers: posts to the identity endpoint
    /// without the session token header.
    pub fn auth_request(&self, payload: Value) -> Option<Reply> {
        let snapshot = self.inner.session.snapshot();
        match self.inner.builder.auth(&payload, &snapshot) {
            Ok(descriptor) => Some(self.inner.dispatcher.submit(descriptor)),
            Err(err) => {
                tracing::debug!(%err, "auth request rejected locally");
                None
            }
        }
    }

    fn submit(&self, kind: OperationKind, payload: &Value) -> Option<Reply> {
        let snapshot = self.inner.session.snapshot();
        match self.inner.builder.build(kind, payload, &snapshot) {
            Ok(descriptor) => Some(self.inner.dispatcher.submit(descriptor)),
            Err(err) => {
                tracing::debug!(%err, operation = ?kind, "operation rejected locally; no request built");
                None
            }
        }
    }
}

fn parse_base(base_url: &str) -> Result<Url, ClientError> {
    Url::parse(base_url).map_err(|e| ClientError::Config(format!("invalid base url: {e}")))
}

fn is_production(base_url: &Url) -> bool {
    Url::parse(DEFAULT_API_URL)
        .ok()
        .and_then(|default| default.host_str().map(str::to_string))
        .as_deref()
        == base_url.host_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{HEADER_BACKEND_ID, HEADER_SESSION_TOKEN};
    use crate::testing::{json_response, MockTransport};
    use serde_json::json;

    fn client(transport: Arc<MockTransport>) -> Client {
        let config = ClientConfig {
            backend_id: "backend-1".to_string(),
            backend_secret: "s3cr3t".to_string(),
            ..ClientConfig::default()
        };
        Client::with_transport(config, TransportBinding::Owned(transport))
            .expect("client assembles")
    }

    #[tokio::test]
    async fn empty_mutation_payloads_make_no_transport_calls() {
        let transport = MockTransport::new();
        let client = client(transport.clone());

        assert!(client.create(json!({})).is_none());
        assert!(client.update(json!({})).is_none());
        assert!(client.remove(json!({})).is_none());
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn upload_without_association_type_makes_no_transport_calls() {
        let transport = MockTransport::new();
        let client = client(transport.clone());

        let reply = client.upload_file(json!({"object": {"id": "b-1"}}), "/tmp/cover.png");
        assert!(reply.is_none());
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn built_requests_carry_session_headers() {
        let transport = MockTransport::new();
        let client = client(transport.clone());
        client.session().set_auth_token("tok");

        let reply = client
            .query(json!({"objectType": "objects.Book"}))
            .expect("valid query payload");
        reply.wait().await.expect("default mock response is 200");

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].headers.get(HEADER_BACKEND_ID).map(String::as_str),
            Some("backend-1")
        );
        assert_eq!(requests[0].headers.get(HEADER_SESSION_TOKEN).map(String::as_str), Some("tok"));
    }

    #[tokio::test]
    async fn login_stores_token_from_identity_provider() {
        let transport = MockTransport::new();
        transport.push_response(json_response(200, json!({"sessionToken": "tok-99"})));
        let client = client(transport.clone());
        let mut events = client.subscribe();

        client.set_identity(Some(Arc::new(crate::identity::PasswordIdentity::new("u", "p"))));
        client.login().await.expect("login succeeds");

        assert_eq!(client.session().auth_token(), "tok-99");
        let requests = transport.requests();
        assert_eq!(requests[0].url.path(), "/v1/auth/identity");
        assert!(!requests[0].headers.contains_key(HEADER_SESSION_TOKEN));

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen.contains(&SessionEvent::Authenticated));
    }

    #[tokio::test]
    async fn logout_clears_token_and_notifies() {
        let client = client(MockTransport::new());
        client.session().set_auth_token("tok");
        let mut events = client.subscribe();

        client.logout();
        assert_eq!(client.session().auth_token(), "");
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen.contains(&SessionEvent::Terminated));

        // Logging out while unauthenticated is silent.
        let mut events = client.subscribe();
        client.logout();
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn login_without_identity_is_a_config_error() {
        let client = client(MockTransport::new());
        let err = client.login().await.expect_err("no identity installed");
        assert!(matches!(err, ClientError::Config(_)));
    }
}
