//! Test doubles shared by the unit tests: a scripted spy transport and small
//! polling helpers.

use crate::request::{Method, RequestBody, RequestDescriptor};
use crate::transport::{Transport, TransportFailure, TransportResponse};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use url::Url;

type ScriptedOutcome = Result<TransportResponse, TransportFailure>;

/// Records every descriptor it receives and answers from a scripted queue.
/// An optional gate holds each exchange in flight until a permit is added.
pub(crate) struct MockTransport {
    requests: Mutex<Vec<RequestDescriptor>>,
    responses: Mutex<VecDeque<ScriptedOutcome>>,
    gate: Option<Arc<Semaphore>>,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self { requests: Mutex::new(Vec::new()), responses: Mutex::new(VecDeque::new()), gate: None })
    }

    /// A transport whose exchanges block until `gate.add_permits(1)`.
    pub(crate) fn gated() -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let transport = Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
            gate: Some(gate.clone()),
        });
        (transport, gate)
    }

    pub(crate) fn push_response(&self, response: TransportResponse) {
        self.responses.lock().push_back(Ok(response));
    }

    pub(crate) fn push_failure(&self, failure: TransportFailure) {
        self.responses.lock().push_back(Err(failure));
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub(crate) fn requests(&self) -> Vec<RequestDescriptor> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: RequestDescriptor) -> ScriptedOutcome {
        self.requests.lock().push(request);
        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.expect("gate closed");
            permit.forget();
        }
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(raw_response(200, b"")))
    }
}

pub(crate) fn json_response(status: u16, body: Value) -> TransportResponse {
    TransportResponse {
        status,
        headers: BTreeMap::new(),
        body: Bytes::from(body.to_string()),
    }
}

pub(crate) fn raw_response(status: u16, body: &[u8]) -> TransportResponse {
    TransportResponse { status, headers: BTreeMap::new(), body: Bytes::copy_from_slice(body) }
}

/// A minimal valid descriptor for dispatcher-level tests.
pub(crate) fn descriptor() -> RequestDescriptor {
    RequestDescriptor {
        method: Method::Get,
        url: Url::parse("https://api.test.invalid/v1/objects/Book").expect("static url parses"),
        headers: BTreeMap::new(),
        body: RequestBody::Empty,
    }
}

/// Poll `condition` until it holds or two seconds elapse.
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached within 2s");
}
