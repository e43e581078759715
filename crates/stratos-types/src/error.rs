//! Wire schema for backend error bodies.
//!
//! Non-success responses carry a JSON body of the shape
//! `{"errors": [{"message": "...", "reason": "..."}]}`. Parsing is
//! best-effort; callers fall back to the raw body text when the shape does
//! not match.

use serde::{Deserialize, Serialize};

/// One error entry reported by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorDetail {
    /// Human-readable error message.
    pub message: String,
    /// Machine-readable error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Body of a non-success backend response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Reported errors, most significant first.
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

impl ErrorResponse {
    /// The most significant reported error, if any.
    pub fn first(&self) -> Option<&ErrorDetail> {
        self.errors.first()
    }
}
