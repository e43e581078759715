#![doc = include_str!("../README.md")]

mod client;
mod dispatcher;
mod error;
mod identity;
mod model;
mod registry;
mod reply;
mod request;
mod session;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{Client, ClientConfig};
pub use dispatcher::Dispatcher;
pub use error::{ClientError, ValidationError};
pub use identity::{IdentityProvider, PasswordIdentity};
pub use model::{ListModel, QueryMode, DEFAULT_PAGE_SIZE};
pub use registry::ObjectFactoryRegistry;
pub use reply::{object_handle, ObjectHandle, Reply, ReplyOutcome, ReplyPayload};
pub use request::{
    JsonSerializer, Method, OperationKind, RequestBody, RequestBuilder, RequestDescriptor,
    Serializer, SerializerError,
};
pub use session::{
    Session, SessionEvent, SessionSnapshot, DEFAULT_API_URL, HEADER_BACKEND_ID,
    HEADER_BACKEND_SECRET, HEADER_SESSION_TOKEN,
};
pub use transport::{
    HttpTransport, Transport, TransportBinding, TransportConfig, TransportFailure,
    TransportResponse,
};

// Re-export the object model so downstream crates need only this one.
pub use stratos_types::{GenericObject, ObjectFactory, RemoteObject};
