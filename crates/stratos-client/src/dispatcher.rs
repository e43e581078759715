//! Pending-operation bookkeeping and completion routing.
//!
//! The dispatcher owns exactly one transport binding. `submit` records a
//! pending entry keyed by an ascending correlation id, spawns the exchange,
//! and returns the Pending reply immediately. A single routing task consumes
//! completions off one channel, so the pending table sees one logical writer
//! and no overlapping completions. Completions for unknown correlations are
//! stale and dropped; completions for abandoned replies finish bookkeeping
//! and discard the result.

use crate::error::ClientError;
use crate::registry::ObjectFactoryRegistry;
use crate::reply::{Reply, ReplyOutcome, ReplyPayload, ReplyShared};
use crate::request::{RequestDescriptor, Serializer};
use crate::transport::{TransportBinding, TransportFailure, TransportResponse};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

struct Completion {
    correlation: u64,
    outcome: Result<TransportResponse, TransportFailure>,
}

struct DispatcherInner {
    binding: RwLock<TransportBinding>,
    pending: Mutex<HashMap<u64, Weak<ReplyShared>>>,
    next_correlation: AtomicU64,
    registry: Arc<Mutex<ObjectFactoryRegistry>>,
    serializer: Arc<dyn Serializer>,
}

/// Routes transport completions to their pending replies.
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
    completions: mpsc::UnboundedSender<Completion>,
}

impl Dispatcher {
    /// Create a dispatcher and start its routing task. Must be called within
    /// a Tokio runtime; the task stops when the dispatcher is dropped.
    pub fn new(
        binding: TransportBinding,
        registry: Arc<Mutex<ObjectFactoryRegistry>>,
        serializer: Arc<dyn Serializer>,
    ) -> Self {
        let inner = Arc::new(DispatcherInner {
            binding: RwLock::new(binding),
            pending: Mutex::new(HashMap::new()),
            next_correlation: AtomicU64::new(1),
            registry,
            serializer,
        });

        let (completions, mut rx) = mpsc::unbounded_channel::<Completion>();
        let routing = inner.clone();
        tokio::spawn(async move {
            while let Some(completion) = rx.recv().await {
                routing.route(completion);
            }
            tracing::debug!("[Dispatcher] completion routing stopped");
        });

        Self { inner, completions }
    }

    /// Replace the transport binding. Completion routing for the previous
    /// binding is torn down: still-pending replies finish with
    /// [`ClientError::TransportGone`] and any late completions are dropped as
    /// stale.
    pub fn set_transport(&self, binding: TransportBinding) {
        *self.inner.binding.write() = binding;
        let orphaned: Vec<Weak<ReplyShared>> =
            self.inner.pending.lock().drain().map(|(_, reply)| reply).collect();
        if !orphaned.is_empty() {
            tracing::debug!(count = orphaned.len(), "[Dispatcher] failing requests pending on the replaced transport");
        }
        for reply in orphaned {
            if let Some(reply) = reply.upgrade() {
                reply.finish(Err(ClientError::TransportGone));
            }
        }
    }

    /// Submit a built request. Never blocks; the returned reply finishes
    /// exactly once, on this dispatcher's routing task.
    pub fn submit(&self, descriptor: RequestDescriptor) -> Reply {
        let Some(transport) = self.inner.binding.read().acquire() else {
            tracing::warn!("[Dispatcher] transport binding is gone; failing request immediately");
            return Reply::finished_with(Err(ClientError::TransportGone));
        };

        let reply = Reply::pending();
        let correlation = self.inner.next_correlation.fetch_add(1, Ordering::Relaxed);
        self.inner.pending.lock().insert(correlation, reply.downgrade());
        tracing::debug!(correlation, method = ?descriptor.method, url = %descriptor.url, "submitting request");

        let completions = self.completions.clone();
        tokio::spawn(async move {
            let outcome = transport.send(descriptor).await;
            // Routing may already be gone during shutdown; nothing to do then.
            let _ = completions.send(Completion { correlation, outcome });
        });

        reply
    }

    /// Number of requests awaiting completion.
    #[cfg(test)]
    pub(crate) fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }
}

impl DispatcherInner {
    fn route(&self, completion: Completion) {
        let entry = self.pending.lock().remove(&completion.correlation);
        let Some(reply) = entry else {
            tracing::trace!(correlation = completion.correlation, "stale completion dropped");
            return;
        };
        let Some(reply) = reply.upgrade() else {
            tracing::trace!(
                correlation = completion.correlation,
                "reply abandoned by its owner; discarding result"
            );
            return;
        };

        let outcome = match completion.outcome {
            Ok(response) if response.is_success() => self.decode(response),
            Ok(response) => {
                tracing::debug!(
                    correlation = completion.correlation,
                    status = response.status,
                    "backend reported an error"
                );
                Err(ClientError::from_error_body(response.status, &response.body))
            }
            Err(failure) => {
                tracing::debug!(correlation = completion.correlation, %failure, "transport failure");
                Err(ClientError::Transport(failure.to_string()))
            }
        };
        reply.finish(outcome);
    }

    /// Success path: body bytes → structured value → registry-built objects.
    fn decode(&self, response: TransportResponse) -> ReplyOutcome {
        if response.body.is_empty() {
            return Ok(Arc::new(ReplyPayload {
                status: response.status,
                data: Value::Null,
                objects: Vec::new(),
            }));
        }
        let data = self
            .serializer
            .from_bytes(&response.body)
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        let objects = self.registry.lock().objects_from_response(&data);
        Ok(Arc::new(ReplyPayload { status: response.status, data, objects }))
    }
}
