//! Backend identity and authentication state.
//!
//! A [`Session`] holds the backend id/secret pair, the current session
//! token, and an optional identity provider. Every mutation regenerates the
//! fixed header set used by subsequently built requests; requests built
//! earlier carry an immutable [`SessionSnapshot`] and are never altered
//! retroactively.

use crate::identity::IdentityProvider;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use url::Url;

/// Header carrying the backend id.
pub const HEADER_BACKEND_ID: &str = "Stratos-Backend-Id";
/// Header carrying the backend secret.
pub const HEADER_BACKEND_SECRET: &str = "Stratos-Backend-Secret";
/// Header carrying the authenticated session token.
pub const HEADER_SESSION_TOKEN: &str = "Stratos-Session-Token";

/// Production API endpoint. Overridable per client; pointing elsewhere marks
/// the session as non-production.
pub const DEFAULT_API_URL: &str = "https://api.stratos-cloud.io/";

/// Session state-change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The backend id changed.
    BackendIdChanged,
    /// The backend secret changed.
    BackendSecretChanged,
    /// The session token changed.
    AuthTokenChanged,
    /// The identity provider was replaced.
    IdentityChanged,
    /// The API base URL changed.
    ApiUrlChanged,
    /// Backend id and secret both became non-empty for the first time since
    /// the session was last incomplete. Fired once per transition.
    Initialized,
    /// An identity provider successfully supplied a session token.
    Authenticated,
    /// The session token was discarded by a logout.
    Terminated,
}

struct SessionState {
    backend_id: String,
    backend_secret: String,
    auth_token: String,
    identity: Option<Arc<dyn IdentityProvider>>,
    base_url: Url,
    headers: BTreeMap<String, String>,
    initialized: bool,
}

impl SessionState {
    fn rebuild_headers(&mut self) {
        self.headers.clear();
        self.headers.insert(HEADER_BACKEND_ID.to_string(), self.backend_id.clone());
        self.headers.insert(HEADER_BACKEND_SECRET.to_string(), self.backend_secret.clone());
        if !self.auth_token.is_empty() {
            self.headers.insert(HEADER_SESSION_TOKEN.to_string(), self.auth_token.clone());
        }
    }

    fn complete(&self) -> bool {
        !self.backend_id.is_empty() && !self.backend_secret.is_empty()
    }
}

/// Immutable view of the session taken at request-build time.
///
/// Once built, a request carries no back-reference to the session; later
/// setter calls cannot change it.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// The fixed auth headers (backend id/secret, token when present).
    pub headers: BTreeMap<String, String>,
    /// The API base URL, guaranteed to end in a slash.
    pub base_url: Url,
}

/// Shared, interior-mutable session. Owned by the client for its lifetime.
pub struct Session {
    state: RwLock<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    pub(crate) fn new(base_url: Url) -> Self {
        let (events, _) = broadcast::channel(32);
        let mut state = SessionState {
            backend_id: String::new(),
            backend_secret: String::new(),
            auth_token: String::new(),
            identity: None,
            base_url: normalize_base(base_url),
            headers: BTreeMap::new(),
            initialized: false,
        };
        state.rebuild_headers();
        Self { state: RwLock::new(state), events }
    }

    /// Subscribe to session state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    /// Current backend id.
    pub fn backend_id(&self) -> String {
        self.state.read().backend_id.clone()
    }

    /// Change the backend id. No-op when unchanged.
    pub fn set_backend_id(&self, backend_id: &str) {
        self.update(SessionEvent::BackendIdChanged, |state| {
            if state.backend_id == backend_id {
                return false;
            }
            state.backend_id = backend_id.to_string();
            true
        });
    }

    /// Current backend secret.
    pub fn backend_secret(&self) -> String {
        self.state.read().backend_secret.clone()
    }

    /// Change the backend secret. No-op when unchanged.
    pub fn set_backend_secret(&self, backend_secret: &str) {
        self.update(SessionEvent::BackendSecretChanged, |state| {
            if state.backend_secret == backend_secret {
                return false;
            }
            state.backend_secret = backend_secret.to_string();
            true
        });
    }

    /// Current session token; empty when not authenticated.
    pub fn auth_token(&self) -> String {
        self.state.read().auth_token.clone()
    }

    /// Change the session token. No-op when unchanged.
    pub fn set_auth_token(&self, token: &str) {
        self.update(SessionEvent::AuthTokenChanged, |state| {
            if state.auth_token == token {
                return false;
            }
            state.auth_token = token.to_string();
            true
        });
    }

    /// The configured identity provider, if any.
    pub fn identity(&self) -> Option<Arc<dyn IdentityProvider>> {
        self.state.read().identity.clone()
    }

    /// Install or clear the identity provider. No-op when the same provider
    /// instance is already installed.
    pub fn set_identity(&self, identity: Option<Arc<dyn IdentityProvider>>) {
        let changed = {
            let mut state = self.state.write();
            let same = match (&state.identity, &identity) {
                (Some(current), Some(next)) => Arc::ptr_eq(current, next),
                (None, None) => true,
                _ => false,
            };
            if same {
                false
            } else {
                state.identity = identity;
                true
            }
        };
        if changed {
            self.emit(SessionEvent::IdentityChanged);
        }
    }

    /// The API base URL.
    pub fn api_url(&self) -> Url {
        self.state.read().base_url.clone()
    }

    /// Point the session at a different API endpoint. No-op when unchanged.
    pub fn set_api_url(&self, url: Url) {
        let url = normalize_base(url);
        let changed = {
            let mut state = self.state.write();
            if state.base_url == url {
                false
            } else {
                state.base_url = url;
                true
            }
        };
        if changed {
            self.emit(SessionEvent::ApiUrlChanged);
        }
    }

    /// Whether both backend id and secret are non-empty.
    pub fn is_initialized(&self) -> bool {
        self.state.read().complete()
    }

    /// Take an immutable snapshot for request building.
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read();
        SessionSnapshot { headers: state.headers.clone(), base_url: state.base_url.clone() }
    }

    /// Apply a credential mutation: detect change, rebuild headers, emit the
    /// change event, and fire `Initialized` on the incomplete → complete
    /// edge.
    fn update(&self, event: SessionEvent, apply: impl FnOnce(&mut SessionState) -> bool) {
        let initialized = {
            let mut state = self.state.write();
            if !apply(&mut state) {
                return;
            }
            state.rebuild_headers();
            let complete = state.complete();
            let edge = complete && !state.initialized;
            state.initialized = complete;
            edge
        };
        self.emit(event);
        if initialized {
            tracing::debug!("session initialized");
            self.emit(SessionEvent::Initialized);
        }
    }
}

/// Base URLs must end in a slash so that `Url::join` appends instead of
/// replacing the last path segment.
fn normalize_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(Url::parse(DEFAULT_API_URL).expect("default url parses"))
    }

    fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn setters_rebuild_headers() {
        let session = session();
        session.set_backend_id("backend-1");
        session.set_backend_secret("s3cr3t");
        session.set_auth_token("tok");

        let snapshot = session.snapshot();
        assert_eq!(snapshot.headers.get(HEADER_BACKEND_ID).map(String::as_str), Some("backend-1"));
        assert_eq!(snapshot.headers.get(HEADER_BACKEND_SECRET).map(String::as_str), Some("s3cr3t"));
        assert_eq!(snapshot.headers.get(HEADER_SESSION_TOKEN).map(String::as_str), Some("tok"));
    }

    #[test]
    fn empty_token_has_no_header() {
        let session = session();
        session.set_backend_id("backend-1");
        assert!(!session.snapshot().headers.contains_key(HEADER_SESSION_TOKEN));

        session.set_auth_token("tok");
        assert!(session.snapshot().headers.contains_key(HEADER_SESSION_TOKEN));
        session.set_auth_token("");
        assert!(!session.snapshot().headers.contains_key(HEADER_SESSION_TOKEN));
    }

    #[test]
    fn snapshots_are_immutable() {
        let session = session();
        session.set_backend_id("before");
        let snapshot = session.snapshot();

        session.set_backend_id("after");
        assert_eq!(snapshot.headers.get(HEADER_BACKEND_ID).map(String::as_str), Some("before"));
        assert_eq!(
            session.snapshot().headers.get(HEADER_BACKEND_ID).map(String::as_str),
            Some("after")
        );
    }

    #[test]
    fn unchanged_value_emits_nothing() {
        let session = session();
        session.set_backend_id("backend-1");

        let mut rx = session.subscribe();
        session.set_backend_id("backend-1");
        session.set_auth_token("");
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn initialized_fires_once_per_transition() {
        let session = session();
        let mut rx = session.subscribe();

        session.set_backend_id("backend-1");
        assert!(!session.is_initialized());
        session.set_backend_secret("s3cr3t");
        assert!(session.is_initialized());

        let events = drain(&mut rx);
        assert_eq!(events.iter().filter(|e| **e == SessionEvent::Initialized).count(), 1);

        // Re-setting the same complete pair must not re-fire.
        session.set_backend_id("backend-1");
        session.set_backend_secret("s3cr3t");
        assert!(drain(&mut rx).is_empty());

        // Changing a credential while initialized does not re-fire either.
        session.set_backend_secret("rotated");
        let events = drain(&mut rx);
        assert!(events.contains(&SessionEvent::BackendSecretChanged));
        assert!(!events.contains(&SessionEvent::Initialized));
    }

    #[test]
    fn initialized_refires_after_deinitialization() {
        let session = session();
        session.set_backend_id("backend-1");
        session.set_backend_secret("s3cr3t");

        let mut rx = session.subscribe();
        session.set_backend_secret("");
        assert!(!session.is_initialized());
        session.set_backend_secret("s3cr3t");

        let events = drain(&mut rx);
        assert_eq!(events.iter().filter(|e| **e == SessionEvent::Initialized).count(), 1);
    }

    #[test]
    fn base_url_is_normalized_for_joining() {
        let session = session();
        session.set_api_url(Url::parse("https://staging.example.com/api").expect("url parses"));
        assert_eq!(session.api_url().path(), "/api/");
    }
}
