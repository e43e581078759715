//! Identity-provider plugin seam.
//!
//! An [`IdentityProvider`] supplies the session token on demand; the client
//! invokes it from [`Client::login`](crate::Client::login). Providers
//! bootstrap through [`Client::auth_request`](crate::Client::auth_request),
//! which builds the exchange without the (not yet existing) session token.

use crate::client::Client;
use crate::error::ClientError;
use async_trait::async_trait;
use serde_json::{json, Value};

/// Supplies and refreshes the auth token used by the session.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Obtain a fresh session token.
    async fn acquire_token(&self, client: &Client) -> Result<String, ClientError>;
}

/// Username/password identity: exchanges credentials for a session token at
/// the backend's identity endpoint.
pub struct PasswordIdentity {
    username: String,
    password: String,
}

impl PasswordIdentity {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }
}

#[async_trait]
impl IdentityProvider for PasswordIdentity {
    async fn acquire_token(&self, client: &Client) -> Result<String, ClientError> {
        let payload = json!({
            "username": self.username,
            "password": self.password,
        });
        let Some(reply) = client.auth_request(payload) else {
            return Err(ClientError::Config("could not build the identity request".to_string()));
        };
        let payload = reply.wait().await?;
        payload
            .data
            .get("sessionToken")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                ClientError::InvalidResponse("identity response carries no sessionToken".to_string())
            })
    }
}
