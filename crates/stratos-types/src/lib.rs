//! # Stratos Types
//!
//! Shared data model for the Stratos SDK: the [`RemoteObject`] abstraction
//! over backend-stored objects, the generic JSON-backed implementation used
//! as the terminal factory fallback, the [`ObjectFactory`] plugin trait, and
//! the wire schema of backend error bodies.
//!
//! This crate is deliberately transport-free; everything network-shaped lives
//! in `stratos-client`.

pub mod error;
pub mod objects;

// Re-export commonly used types
pub use error::{ErrorDetail, ErrorResponse};
pub use objects::{GenericObject, ObjectFactory, RemoteObject, OBJECT_ID_FIELD, OBJECT_TYPE_FIELD};
