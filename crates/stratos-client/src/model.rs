//! Live, incrementally loaded view over a query's results.
//!
//! A [`ListModel`] binds one query (plain or search mode) to a client and
//! keeps an ordered row cache fed by on-demand page fetches. Mutations are
//! optimistic: `append`/`remove`/`set_property` change the cache immediately
//! and mirror the change remotely; a failed remote operation surfaces its
//! error on the returned reply and never rolls the local change back — the
//! cache is a soft, rebuildable projection of remote state.

use crate::client::Client;
use crate::error::ClientError;
use crate::reply::{object_handle, ObjectHandle, Reply, ReplyPayload};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use stratos_types::{OBJECT_ID_FIELD, OBJECT_TYPE_FIELD};

/// Default page size for incremental fetches.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Which backend operation feeds the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Plain object query.
    Query,
    /// Backend full-text search.
    Search,
}

struct Row {
    /// Local identity, stable across reconciliation; rows created by
    /// `append` have no backend id until the create confirms.
    tag: u64,
    object: ObjectHandle,
}

struct ModelState {
    query: Option<Value>,
    mode: QueryMode,
    rows: Vec<Row>,
    offset: usize,
    page_size: usize,
    fetch_in_flight: bool,
    exhausted: bool,
    /// Bumped on every invalidation; in-flight pages from an older epoch are
    /// dropped instead of applied.
    epoch: u64,
}

struct ModelInner {
    client: Client,
    state: Mutex<ModelState>,
    next_tag: AtomicU64,
}

/// Incrementally loaded list over a remote collection.
#[derive(Clone)]
pub struct ListModel {
    inner: Arc<ModelInner>,
}

impl ListModel {
    pub fn new(client: Client) -> Self {
        Self {
            inner: Arc::new(ModelInner {
                client,
                state: Mutex::new(ModelState {
                    query: None,
                    mode: QueryMode::Query,
                    rows: Vec::new(),
                    offset: 0,
                    page_size: DEFAULT_PAGE_SIZE,
                    fetch_in_flight: false,
                    exhausted: false,
                    epoch: 0,
                }),
                next_tag: AtomicU64::new(1),
            }),
        }
    }

    /// The bound query payload, if any.
    pub fn query(&self) -> Option<Value> {
        self.inner.state.lock().query.clone()
    }

    /// Bind a query payload (e.g. `{"objectType": "objects.Book"}`).
    /// Invalidates the cache and refetches from the start. No-op when the
    /// query is unchanged.
    pub fn set_query(&self, query: Value) {
        {
            let mut state = self.inner.state.lock();
            if state.query.as_ref() == Some(&query) {
                return;
            }
            state.query = Some(query);
            Self::invalidate(&mut state);
        }
        tracing::debug!("query changed; refetching from start");
        self.fetch_more();
    }

    /// Current operation mode.
    pub fn mode(&self) -> QueryMode {
        self.inner.state.lock().mode
    }

    /// Switch between plain query and search mode. Invalidates the cache and
    /// refetches from the start. No-op when unchanged.
    pub fn set_mode(&self, mode: QueryMode) {
        {
            let mut state = self.inner.state.lock();
            if state.mode == mode {
                return;
            }
            state.mode = mode;
            Self::invalidate(&mut state);
        }
        tracing::debug!(?mode, "operation mode changed; refetching from start");
        self.fetch_more();
    }

    /// Page size for subsequent fetches.
    pub fn set_page_size(&self, page_size: usize) {
        self.inner.state.lock().page_size = page_size.max(1);
    }

    /// Number of cached rows.
    pub fn row_count(&self) -> usize {
        self.inner.state.lock().rows.len()
    }

    /// Read one field of the row at `row`, by name.
    pub fn data(&self, row: usize, field: &str) -> Option<Value> {
        let state = self.inner.state.lock();
        state.rows.get(row).and_then(|r| r.object.read().field(field))
    }

    /// The shared object handle backing the row at `row`.
    pub fn object_at(&self, row: usize) -> Option<ObjectHandle> {
        self.inner.state.lock().rows.get(row).map(|r| r.object.clone())
    }

    /// Whether another page may exist: a query is bound and the backend has
    /// not signaled exhaustion (the last page came back short).
    pub fn can_fetch_more(&self) -> bool {
        let state = self.inner.state.lock();
        state.query.is_some() && !state.exhausted
    }

    /// Fetch the next page. Returns the page's reply, or `None` when a fetch
    /// is already in flight, the model is not query-bound, the client is not
    /// initialized, or the collection is exhausted.
    pub fn fetch_more(&self) -> Option<Reply> {
        let (payload, mode, epoch) = {
            let mut state = self.inner.state.lock();
            if state.fetch_in_flight {
                tracing::debug!("page fetch already in flight; ignoring fetch_more");
                return None;
            }
            if state.exhausted || !self.inner.client.is_initialized() {
                return None;
            }
            let query = state.query.as_ref()?;
            let mut payload = query.clone();
            if let Some(map) = payload.as_object_mut() {
                map.insert("limit".to_string(), json!(state.page_size));
                map.insert("offset".to_string(), json!(state.offset));
            }
            state.fetch_in_flight = true;
            (payload, state.mode, state.epoch)
        };

        let reply = match mode {
            QueryMode::Query => self.inner.client.query(payload),
            QueryMode::Search => self.inner.client.search(payload),
        };
        let Some(reply) = reply else {
            self.inner.state.lock().fetch_in_flight = false;
            return None;
        };

        let inner = self.inner.clone();
        let page = reply.clone();
        tokio::spawn(async move {
            let outcome = page.wait().await;
            inner.apply_page(epoch, outcome);
        });
        Some(reply)
    }

    /// Optimistically insert `value` as the last row and create it remotely.
    /// On success the row is reconciled with server-assigned fields; on
    /// failure it stays as inserted and the error is on the returned reply.
    /// `None` means local validation rejected the payload (nothing was
    /// inserted).
    pub fn append(&self, value: Value) -> Option<Reply> {
        let reply = self.inner.client.create(value.clone())?;

        let object = self.inner.client.registry().lock().object_from_value(&value);
        let tag = self.inner.next_tag.fetch_add(1, Ordering::Relaxed);
        {
            let mut state = self.inner.state.lock();
            state.rows.push(Row { tag, object: object_handle(object) });
        }

        let inner = self.inner.clone();
        let confirmation = reply.clone();
        tokio::spawn(async move {
            match confirmation.wait().await {
                Ok(payload) => inner.reconcile_append(tag, &payload),
                Err(err) => {
                    tracing::warn!(%err, "create not confirmed by backend; keeping local row");
                }
            }
        });
        Some(reply)
    }

    /// Optimistically delete the row at `row` and remove it remotely. Rows
    /// that never received a backend id are removed locally only. Remote
    /// failure surfaces on the reply; the row is not re-inserted.
    ///
    /// Returns `None` both for an out-of-range `row` (nothing changed) and
    /// for a local-only removal (the row is gone);
    /// [`row_count`](Self::row_count) tells the two apart.
    pub fn remove(&self, row: usize) -> Option<Reply> {
        let (id, object_type) = {
            let mut state = self.inner.state.lock();
            if row >= state.rows.len() {
                return None;
            }
            let removed = state.rows.remove(row);
            let object = removed.object.read();
            (object.id(), object.object_type())
        };
        let Some(id) = id else {
            tracing::debug!(row, "removed row had no backend id; local removal only");
            return None;
        };
        let mut payload = serde_json::Map::new();
        payload.insert(OBJECT_ID_FIELD.to_string(), json!(id));
        payload.insert(OBJECT_TYPE_FIELD.to_string(), json!(object_type));
        self.inner.client.remove(Value::Object(payload))
    }

    /// Optimistically set one field of the row at `row` and update it
    /// remotely, sending only the changed field. Rows without a backend id
    /// are changed locally only (`None`). Remote failure surfaces on the
    /// reply; the local value is not reverted.
    pub fn set_property(&self, row: usize, field: &str, value: Value) -> Option<Reply> {
        let (id, object_type) = {
            let state = self.inner.state.lock();
            let entry = state.rows.get(row)?;
            let mut object = entry.object.write();
            object.set_field(field, value.clone());
            (object.id(), object.object_type())
        };
        let Some(id) = id else {
            tracing::debug!(row, field, "row has no backend id yet; local change only");
            return None;
        };
        let mut payload = serde_json::Map::new();
        payload.insert(OBJECT_ID_FIELD.to_string(), json!(id));
        payload.insert(OBJECT_TYPE_FIELD.to_string(), json!(object_type));
        payload.insert(field.to_string(), value);
        self.inner.client.update(Value::Object(payload))
    }

    fn invalidate(state: &mut ModelState) {
        state.rows.clear();
        state.offset = 0;
        state.exhausted = false;
        state.fetch_in_flight = false;
        state.epoch += 1;
    }
}

impl ModelInner {
    fn apply_page(&self, epoch: u64, outcome: Result<Arc<ReplyPayload>, ClientError>) {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            tracing::trace!("page for an invalidated query dropped");
            return;
        }
        state.fetch_in_flight = false;
        match outcome {
            Ok(payload) => {
                let fetched = payload.objects.len();
                for object in &payload.objects {
                    let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);
                    state.rows.push(Row { tag, object: object.clone() });
                }
                state.offset += fetched;
                if fetched < state.page_size {
                    state.exhausted = true;
                }
                tracing::debug!(fetched, rows = state.rows.len(), "page applied");
            }
            Err(err) => {
                tracing::warn!(%err, "page fetch failed; cache left as is");
            }
        }
    }

    /// Merge server-assigned fields (id, timestamps) into the optimistic row.
    fn reconcile_append(&self, tag: u64, payload: &ReplyPayload) {
        let Some(value) = server_object(&payload.data) else {
            return;
        };
        let state = self.state.lock();
        if let Some(row) = state.rows.iter().find(|row| row.tag == tag) {
            row.object.write().apply_json(value);
            tracing::debug!(id = ?row.object.read().id(), "appended row reconciled");
        }
        // The row may have been removed or the query invalidated meanwhile;
        // nothing to reconcile then.
    }
}

fn server_object(data: &Value) -> Option<&Value> {
    match data.get("results").and_then(Value::as_array) {
        Some(results) => results.first(),
        None if data.is_object() => Some(data),
        None => None,
    }
}
