//! Server session identifiers
//!
//! Endpoints that declare a `session` parameter keep server-side state keyed
//! by an opaque identifier chosen by the client. The identifier travels as
//! the `SessionID` cookie.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier for a server-side session cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionState(String);

impl SessionState {
    /// Cookie name the identifier is sent under.
    pub const COOKIE_NAME: &'static str = "SessionID";

    /// Create a session with a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Wrap an identifier issued elsewhere (e.g. shared with another client).
    pub fn from_id(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The session identifier.
    pub fn id(&self) -> &str {
        &self.0
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
