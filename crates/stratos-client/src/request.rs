//! Logical operations → transport-ready request descriptors.
//!
//! [`RequestBuilder`] is a pure function of (operation kind, payload,
//! session snapshot): it validates the payload locally, resolves the URL
//! under the snapshot's base, serializes the body through the injected
//! [`Serializer`], and stamps the snapshot's auth headers plus a
//! content-type. Validation failures mean no request is built and no
//! transport call happens.

use crate::error::ValidationError;
use crate::session::SessionSnapshot;
use bytes::Bytes;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stratos_types::{OBJECT_ID_FIELD, OBJECT_TYPE_FIELD};
use thiserror::Error;
use url::Url;

/// The kind of logical operation a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Fetch objects matching a query.
    Query,
    /// Full-text search across object types.
    Search,
    /// Create a new object.
    Create,
    /// Update fields of an existing object.
    Update,
    /// Delete an existing object.
    Remove,
    /// Upload a file associated with an existing object.
    UploadFile,
}

/// HTTP method of a built request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// Body of a built request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// No body.
    Empty,
    /// Serialized JSON payload.
    Json(Bytes),
    /// File contents, read by the transport at send time.
    File(PathBuf),
}

/// A transport-ready request. Value type: carries no back-reference to the
/// session it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: Url,
    pub headers: BTreeMap<String, String>,
    pub body: RequestBody,
}

/// Structured value ⇄ wire bytes. Injected; a serde_json-backed
/// implementation is the default.
pub trait Serializer: Send + Sync {
    /// Serialize a structured value into body bytes.
    fn to_bytes(&self, value: &Value) -> Result<Bytes, SerializerError>;
    /// Parse response bytes into a structured value.
    fn from_bytes(&self, bytes: &[u8]) -> Result<Value, SerializerError>;
}

/// Failure inside a [`Serializer`] implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct SerializerError(pub String);

/// Default serializer on serde_json.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn to_bytes(&self, value: &Value) -> Result<Bytes, SerializerError> {
        serde_json::to_vec(value).map(Bytes::from).map_err(|e| SerializerError(e.to_string()))
    }

    fn from_bytes(&self, bytes: &[u8]) -> Result<Value, SerializerError> {
        serde_json::from_slice(bytes).map_err(|e| SerializerError(e.to_string()))
    }
}

/// Builds request descriptors for every operation kind.
pub struct RequestBuilder {
    serializer: Arc<dyn Serializer>,
}

impl RequestBuilder {
    pub fn new(serializer: Arc<dyn Serializer>) -> Self {
        Self { serializer }
    }

    /// Build a descriptor for one of the JSON operation kinds.
    pub fn build(
        &self,
        kind: OperationKind,
        payload: &Value,
        session: &SessionSnapshot,
    ) -> Result<RequestDescriptor, ValidationError> {
        match kind {
            OperationKind::Query => self.query(payload, session),
            OperationKind::Search => self.search(payload, session),
            OperationKind::Create => self.create(payload, session),
            OperationKind::Update => self.update(payload, session),
            OperationKind::Remove => self.remove(payload, session),
            OperationKind::UploadFile => Err(ValidationError::MissingFileAssociation),
        }
    }

    /// GET `{base}/v1/{type-path}` with `q`/`limit`/`offset` parameters.
    pub fn query(
        &self,
        payload: &Value,
        session: &SessionSnapshot,
    ) -> Result<RequestDescriptor, ValidationError> {
        let object_type = required_type(payload)?;
        let mut url = join(&session.base_url, &object_path(&object_type))?;
        append_paging(&mut url, payload);
        if let Some(filter) = payload.get("query") {
            url.query_pairs_mut().append_pair("q", &compact(filter));
        }
        Ok(descriptor(Method::Get, url, session, RequestBody::Empty))
    }

    /// GET `{base}/v1/search` with `q`/`objectTypes`/`limit`/`offset`.
    pub fn search(
        &self,
        payload: &Value,
        session: &SessionSnapshot,
    ) -> Result<RequestDescriptor, ValidationError> {
        if is_empty_object(payload) {
            return Err(ValidationError::EmptyPayload);
        }
        let mut url = join(&session.base_url, "v1/search")?;
        append_paging(&mut url, payload);
        if let Some(types) = payload.get("objectTypes") {
            url.query_pairs_mut().append_pair("objectTypes", &compact(types));
        }
        if let Some(search) = payload.get("search") {
            url.query_pairs_mut().append_pair("q", &compact(search));
        }
        Ok(descriptor(Method::Get, url, session, RequestBody::Empty))
    }

    /// POST `{base}/v1/{type-path}` with the object as body.
    pub fn create(
        &self,
        payload: &Value,
        session: &SessionSnapshot,
    ) -> Result<RequestDescriptor, ValidationError> {
        if is_empty_object(payload) {
            return Err(ValidationError::EmptyPayload);
        }
        let object_type = required_type(payload)?;
        let url = join(&session.base_url, &object_path(&object_type))?;
        let body = self.json_body(payload)?;
        Ok(descriptor(Method::Post, url, session, body))
    }

    /// PUT `{base}/v1/{type-path}/{id}` with the changed fields as body.
    pub fn update(
        &self,
        payload: &Value,
        session: &SessionSnapshot,
    ) -> Result<RequestDescriptor, ValidationError> {
        if is_empty_object(payload) {
            return Err(ValidationError::EmptyPayload);
        }
        let object_type = required_type(payload)?;
        let id = required_id(payload)?;
        let url = join(&session.base_url, &format!("{}/{id}", object_path(&object_type)))?;
        let body = self.json_body(payload)?;
        Ok(descriptor(Method::Put, url, session, body))
    }

    /// DELETE `{base}/v1/{type-path}/{id}`.
    pub fn remove(
        &self,
        payload: &Value,
        session: &SessionSnapshot,
    ) -> Result<RequestDescriptor, ValidationError> {
        if is_empty_object(payload) {
            return Err(ValidationError::EmptyPayload);
        }
        let object_type = required_type(payload)?;
        let id = required_id(payload)?;
        let url = join(&session.base_url, &format!("{}/{id}", object_path(&object_type)))?;
        Ok(descriptor(Method::Delete, url, session, RequestBody::Empty))
    }

    /// POST `{base}/v1/files` with the association in the `object` query
    /// parameter and the file contents as an octet-stream body.
    pub fn upload_file(
        &self,
        association: &Value,
        file: &Path,
        session: &SessionSnapshot,
    ) -> Result<RequestDescriptor, ValidationError> {
        let declared = association
            .get("object")
            .and_then(|object| object.get(OBJECT_TYPE_FIELD))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if declared.is_empty() {
            return Err(ValidationError::MissingFileAssociation);
        }
        let mut url = join(&session.base_url, "v1/files")?;
        url.query_pairs_mut().append_pair("object", &compact(association));

        let mut request = descriptor(Method::Post, url, session, RequestBody::File(file.to_path_buf()));
        request
            .headers
            .insert("Content-Type".to_string(), "application/octet-stream".to_string());
        Ok(request)
    }

    /// POST `{base}/v1/auth/identity` without the session token header, so
    /// identity providers can bootstrap a token.
    pub fn auth(
        &self,
        payload: &Value,
        session: &SessionSnapshot,
    ) -> Result<RequestDescriptor, ValidationError> {
        if is_empty_object(payload) {
            return Err(ValidationError::EmptyPayload);
        }
        let url = join(&session.base_url, "v1/auth/identity")?;
        let body = self.json_body(payload)?;
        let mut request = descriptor(Method::Post, url, session, body);
        request.headers.remove(crate::session::HEADER_SESSION_TOKEN);
        Ok(request)
    }

    fn json_body(&self, payload: &Value) -> Result<RequestBody, ValidationError> {
        self.serializer
            .to_bytes(payload)
            .map(RequestBody::Json)
            .map_err(|e| ValidationError::Serialize(e.to_string()))
    }
}

/// `objects.Book` → `v1/objects/Book`; built-in collections like `users`
/// map straight to `v1/users`.
fn object_path(object_type: &str) -> String {
    format!("v1/{}", object_type.replace('.', "/"))
}

fn join(base: &Url, path: &str) -> Result<Url, ValidationError> {
    base.join(path).map_err(|e| ValidationError::InvalidUrl(e.to_string()))
}

fn descriptor(
    method: Method,
    url: Url,
    session: &SessionSnapshot,
    body: RequestBody,
) -> RequestDescriptor {
    let mut headers = session.headers.clone();
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    RequestDescriptor { method, url, headers, body }
}

fn is_empty_object(payload: &Value) -> bool {
    payload.as_object().map_or(true, serde_json::Map::is_empty)
}

fn required_type(payload: &Value) -> Result<String, ValidationError> {
    match payload.get(OBJECT_TYPE_FIELD).and_then(Value::as_str) {
        Some(object_type) if !object_type.is_empty() => Ok(object_type.to_string()),
        _ => Err(ValidationError::MissingObjectType),
    }
}

fn required_id(payload: &Value) -> Result<String, ValidationError> {
    match payload.get(OBJECT_ID_FIELD).and_then(Value::as_str) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(ValidationError::MissingObjectId),
    }
}

fn append_paging(url: &mut Url, payload: &Value) {
    if let Some(limit) = payload.get("limit").and_then(Value::as_u64) {
        url.query_pairs_mut().append_pair("limit", &limit.to_string());
    }
    if let Some(offset) = payload.get("offset").and_then(Value::as_u64) {
        url.query_pairs_mut().append_pair("offset", &offset.to_string());
    }
}

fn compact(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}
