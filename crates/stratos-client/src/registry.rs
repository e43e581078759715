//! Ordered chain of pluggable object factories.
//!
//! Most recently registered wins: `register` prepends, `create_for_type`
//! walks front to back and takes the first claimed construction. The generic
//! JSON object is the terminal fallback, so construction never fails.

use crate::reply::{object_handle, ObjectHandle};
use serde_json::Value;
use stratos_types::{GenericObject, ObjectFactory, RemoteObject, OBJECT_ID_FIELD, OBJECT_TYPE_FIELD};

struct FactoryEntry {
    id: u64,
    factory: Box<dyn ObjectFactory>,
}

/// Registry of custom object factories, owned by the client.
#[derive(Default)]
pub struct ObjectFactoryRegistry {
    entries: Vec<FactoryEntry>,
    next_id: u64,
}

impl ObjectFactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, taking ownership. Returns an ascending unique id
    /// usable with [`unregister`](Self::unregister).
    pub fn register(&mut self, factory: Box<dyn ObjectFactory>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(0, FactoryEntry { id, factory });
        tracing::debug!(factory_id = id, "object factory registered");
        id
    }

    /// Remove a factory by id. Unknown ids are a no-op; relative order of the
    /// remaining entries is preserved.
    pub fn unregister(&mut self, factory_id: u64) {
        if let Some(position) = self.entries.iter().position(|entry| entry.id == factory_id) {
            self.entries.remove(position);
            tracing::debug!(factory_id, "object factory unregistered");
        }
    }

    /// Construct an object for `object_type`, consulting factories
    /// newest-first and falling back to [`GenericObject`]. Never fails.
    pub fn create_for_type(&self, object_type: &str, id: Option<&str>) -> Box<dyn RemoteObject> {
        for entry in &self.entries {
            if let Some(object) = entry.factory.create_for_type(object_type, id) {
                return object;
            }
        }
        Box::new(GenericObject::with_type(object_type, id))
    }

    /// Construct an object from a backend JSON value and populate its fields.
    pub fn object_from_value(&self, value: &Value) -> Box<dyn RemoteObject> {
        let object_type = value.get(OBJECT_TYPE_FIELD).and_then(Value::as_str).unwrap_or_default();
        let id = value.get(OBJECT_ID_FIELD).and_then(Value::as_str);
        let mut object = self.create_for_type(object_type, id);
        object.apply_json(value);
        object
    }

    /// Deserialize a response value into shared object handles: each element
    /// of a `results` array, or the value itself when it is a single object.
    pub fn objects_from_response(&self, data: &Value) -> Vec<ObjectHandle> {
        match data.get("results").and_then(Value::as_array) {
            Some(results) => {
                results.iter().map(|value| object_handle(self.object_from_value(value))).collect()
            }
            None if data.is_object() => vec![object_handle(self.object_from_value(data))],
            None => Vec::new(),
        }
    }
}
