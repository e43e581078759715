//! The observable outcome of one in-flight request.
//!
//! A [`Reply`] is Pending until the dispatcher routes its completion, then
//! Finished forever: the outcome is set exactly once and re-reading it is
//! idempotent. Callers can attach a single `on_finished` observer (delivered
//! immediately if the reply already finished) or `wait().await` for the
//! outcome. Dropping every clone abandons the reply; the dispatcher holds
//! only a weak reference and discards the result after its bookkeeping.

use crate::error::ClientError;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::Arc;
use stratos_types::RemoteObject;
use tokio::sync::watch;

/// Shared, lockable handle to a deserialized result object. The list model
/// and reply payloads reference the same objects, so reconciliation through
/// one is visible through the other.
pub type ObjectHandle = Arc<RwLock<Box<dyn RemoteObject>>>;

/// Wrap a freshly constructed object into a shared handle.
pub fn object_handle(object: Box<dyn RemoteObject>) -> ObjectHandle {
    Arc::new(RwLock::new(object))
}

/// Successful completion payload.
#[derive(Debug)]
pub struct ReplyPayload {
    /// HTTP status of the response.
    pub status: u16,
    /// Raw decoded response value.
    pub data: Value,
    /// Result objects built through the factory registry: one per element of
    /// a `results` array, or a single object for singular responses.
    pub objects: Vec<ObjectHandle>,
}

impl ReplyPayload {
    /// The first (or only) result object.
    pub fn first_object(&self) -> Option<&ObjectHandle> {
        self.objects.first()
    }
}

/// The single outcome of a reply.
pub type ReplyOutcome = Result<Arc<ReplyPayload>, ClientError>;

type Observer = Box<dyn FnOnce(&ReplyOutcome) + Send>;

struct ReplyState {
    outcome: Option<ReplyOutcome>,
    observer: Option<Observer>,
    finished_at: Option<DateTime<Utc>>,
}

pub(crate) struct ReplyShared {
    state: Mutex<ReplyState>,
    finished: watch::Sender<bool>,
}

impl ReplyShared {
    /// Transition Pending → Finished. At most once; late duplicates are
    /// logged and dropped.
    pub(crate) fn finish(&self, outcome: ReplyOutcome) {
        let observer = {
            let mut state = self.state.lock();
            if state.outcome.is_some() {
                tracing::warn!("duplicate completion for an already finished reply; dropped");
                return;
            }
            state.outcome = Some(outcome.clone());
            state.finished_at = Some(Utc::now());
            state.observer.take()
        };
        if let Some(observer) = observer {
            observer(&outcome);
        }
        let _ = self.finished.send(true);
    }
}

/// Handle to one in-flight (or finished) request.
#[derive(Clone)]
pub struct Reply {
    shared: Arc<ReplyShared>,
}

impl Reply {
    /// A new Pending reply.
    pub(crate) fn pending() -> Self {
        let (finished, _) = watch::channel(false);
        Self {
            shared: Arc::new(ReplyShared {
                state: Mutex::new(ReplyState { outcome: None, observer: None, finished_at: None }),
                finished,
            }),
        }
    }

    /// A reply that is already finished with `outcome`; used when a request
    /// fails before reaching the transport.
    pub(crate) fn finished_with(outcome: ReplyOutcome) -> Self {
        let reply = Self::pending();
        reply.shared.finish(outcome);
        reply
    }

    pub(crate) fn downgrade(&self) -> std::sync::Weak<ReplyShared> {
        Arc::downgrade(&self.shared)
    }

    pub(crate) fn finish(&self, outcome: ReplyOutcome) {
        self.shared.finish(outcome);
    }

    /// Whether the reply has finished.
    pub fn is_finished(&self) -> bool {
        self.shared.state.lock().outcome.is_some()
    }

    /// The outcome, if finished. Idempotent.
    pub fn outcome(&self) -> Option<ReplyOutcome> {
        self.shared.state.lock().outcome.clone()
    }

    /// The success payload, if finished successfully.
    pub fn payload(&self) -> Option<Arc<ReplyPayload>> {
        match self.outcome() {
            Some(Ok(payload)) => Some(payload),
            _ => None,
        }
    }

    /// The error, if finished with one.
    pub fn error(&self) -> Option<ClientError> {
        match self.outcome() {
            Some(Err(err)) => Some(err),
            _ => None,
        }
    }

    /// When the reply finished, if it has.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.shared.state.lock().finished_at
    }

    /// Attach the single "finished" observer.
    ///
    /// Attaching after completion delivers immediately; delivery is exactly
    /// once overall. Attaching a second observer before completion replaces
    /// the first.
    pub fn on_finished<F>(&self, observer: F)
    where
        F: FnOnce(&ReplyOutcome) + Send + 'static,
    {
        let observer: Observer = Box::new(observer);
        let ready = {
            let mut state = self.shared.state.lock();
            match state.outcome.clone() {
                Some(outcome) => Some((observer, outcome)),
                None => {
                    if state.observer.replace(observer).is_some() {
                        tracing::warn!("replacing a previously attached reply observer");
                    }
                    None
                }
            }
        };
        if let Some((observer, outcome)) = ready {
            observer(&outcome);
        }
    }

    /// Wait asynchronously for the outcome.
    pub async fn wait(&self) -> ReplyOutcome {
        let mut rx = self.shared.finished.subscribe();
        loop {
            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                // The sender lives inside our own shared state, so this is
                // unreachable while the reply is alive; fail closed anyway.
                return self.outcome().unwrap_or(Err(ClientError::TransportGone));
            }
        }
    }
}
