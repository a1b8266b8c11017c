//! Call context
//!
//! The mutable per-stream state of an endpoint: the endpoint state threaded
//! from one call to the next, the session, and the endpoint constants. Bulk
//! callers pin one context to each worker; a context is never shared between
//! concurrent calls.

use dataservices_core::SessionState;

/// Per-stream state carried across the calls of one unit of work.
///
/// Endpoint state and constants are opaque encoded documents in the format
/// the endpoint declares for them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    endpoint_state: Option<Vec<u8>>,
    session: Option<SessionState>,
    endpoint_constants: Option<Vec<u8>>,
}

impl CallContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial endpoint state.
    pub fn with_endpoint_state(mut self, state: impl Into<Vec<u8>>) -> Self {
        self.endpoint_state = Some(state.into());
        self
    }

    /// Set the session.
    pub fn with_session(mut self, session: SessionState) -> Self {
        self.session = Some(session);
        self
    }

    /// Set the endpoint constants.
    pub fn with_endpoint_constants(mut self, constants: impl Into<Vec<u8>>) -> Self {
        self.endpoint_constants = Some(constants.into());
        self
    }

    /// Current endpoint state
    pub fn endpoint_state(&self) -> Option<&[u8]> {
        self.endpoint_state.as_deref()
    }

    /// Current endpoint state as UTF-8 text
    pub fn endpoint_state_str(&self) -> Option<&str> {
        self.endpoint_state
            .as_deref()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    /// Session, if any
    pub fn session(&self) -> Option<&SessionState> {
        self.session.as_ref()
    }

    /// Endpoint constants, if any
    pub fn endpoint_constants(&self) -> Option<&[u8]> {
        self.endpoint_constants.as_deref()
    }

    /// Replace the endpoint state.
    pub fn set_endpoint_state(&mut self, state: Option<Vec<u8>>) {
        self.endpoint_state = state;
    }

    /// Replace the session.
    pub fn set_session(&mut self, session: Option<SessionState>) {
        self.session = session;
    }

    /// Replace the endpoint constants.
    pub fn set_endpoint_constants(&mut self, constants: Option<Vec<u8>>) {
        self.endpoint_constants = constants;
    }
}
