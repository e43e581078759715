//! Backend object model.
//!
//! Every value stored in a Stratos backend is a JSON object tagged with an
//! `objectType` (user-defined types carry an `objects.` prefix, e.g.
//! `objects.Book`) and, once persisted, a backend-assigned `id`.
//! [`RemoteObject`] is the trait rows and results are exposed through;
//! [`GenericObject`] is the untyped implementation used whenever no custom
//! factory claims a type.

use serde_json::{Map, Value};
use std::fmt;

/// JSON field carrying the object's type tag.
pub const OBJECT_TYPE_FIELD: &str = "objectType";

/// JSON field carrying the backend-assigned object id.
pub const OBJECT_ID_FIELD: &str = "id";

/// A typed view over one backend-stored object.
///
/// Implementations own their field storage; the SDK only talks to them
/// through this trait, so custom object classes are first-class citizens in
/// query results and list-model rows.
pub trait RemoteObject: fmt::Debug + Send + Sync {
    /// The object's type tag, e.g. `objects.Book`.
    fn object_type(&self) -> String;

    /// The backend-assigned id, if the object has been persisted.
    fn id(&self) -> Option<String>;

    /// Read one field by name.
    fn field(&self, name: &str) -> Option<Value>;

    /// Write one field by name.
    fn set_field(&mut self, name: &str, value: Value);

    /// Merge fields from a backend JSON object into this one.
    ///
    /// Used both when deserializing results and when reconciling an
    /// optimistic local row with server-assigned fields (id, timestamps).
    fn apply_json(&mut self, value: &Value);

    /// Serialize the full object back to JSON.
    fn to_json(&self) -> Value;
}

/// Untyped JSON-backed object; the guaranteed factory fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenericObject {
    fields: Map<String, Value>,
}

impl GenericObject {
    /// Create an empty object carrying only a type tag (and id, if given).
    pub fn with_type(object_type: &str, id: Option<&str>) -> Self {
        let mut fields = Map::new();
        if !object_type.is_empty() {
            fields.insert(OBJECT_TYPE_FIELD.to_string(), Value::String(object_type.to_string()));
        }
        if let Some(id) = id {
            fields.insert(OBJECT_ID_FIELD.to_string(), Value::String(id.to_string()));
        }
        Self { fields }
    }

    /// Build an object from an arbitrary JSON value. Non-object values
    /// produce an empty object.
    pub fn from_value(value: &Value) -> Self {
        match value.as_object() {
            Some(map) => Self { fields: map.clone() },
            None => Self::default(),
        }
    }
}

impl RemoteObject for GenericObject {
    fn object_type(&self) -> String {
        self.fields
            .get(OBJECT_TYPE_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    fn id(&self) -> Option<String> {
        self.fields.get(OBJECT_ID_FIELD).and_then(Value::as_str).map(str::to_string)
    }

    fn field(&self, name: &str) -> Option<Value> {
        self.fields.get(name).cloned()
    }

    fn set_field(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }

    fn apply_json(&mut self, value: &Value) {
        if let Some(map) = value.as_object() {
            for (key, value) in map {
                self.fields.insert(key.clone(), value.clone());
            }
        }
    }

    fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

/// Pluggable constructor for custom object classes.
///
/// A factory either claims a type by returning a constructed object or
/// declines with `None`, in which case the next registered factory (and
/// ultimately [`GenericObject`]) is consulted.
pub trait ObjectFactory: Send + Sync {
    /// Attempt to construct an object for `object_type`, optionally carrying
    /// a backend id.
    fn create_for_type(&self, object_type: &str, id: Option<&str>) -> Option<Box<dyn RemoteObject>>;
}
