//! Transport layer for data service calls
//!
//! The callers build a [`CallRequest`] and hand it to a [`Transport`] together
//! with the [`ResponseShape`] they expect back. The transport sends the call
//! and returns a [`CallResponse`] of that shape.
//!
//! [`HttpTransport`] (feature `http`, on by default) calls a server over
//! HTTP. Tests and embedders can implement [`Transport`] directly; any
//! `Fn(&CallRequest, ResponseShape) -> Result<CallResponse>` closure already
//! does.

#![warn(missing_docs)]

#[cfg(feature = "http")]
pub mod http;
pub mod multipart;
pub mod request;
pub mod response;

pub use request::{CallField, CallRequest, Document, FieldValue, SessionBinding};
pub use response::{CallResponse, ResponseShape};

#[cfg(feature = "http")]
pub use http::HttpTransport;

use dataservices_core::Result;

/// Sends endpoint calls to the server.
///
/// One call is one synchronous round trip. Implementations are shared by
/// every worker of a bulk caller and must be safe to call concurrently.
/// Timeouts, if any, are the implementation's concern.
pub trait Transport: Send + Sync {
    /// Make one call and return a response matching `shape`.
    fn call(&self, request: &CallRequest, shape: ResponseShape) -> Result<CallResponse>;
}

impl<F> Transport for F
where
    F: Fn(&CallRequest, ResponseShape) -> Result<CallResponse> + Send + Sync,
{
    fn call(&self, request: &CallRequest, shape: ResponseShape) -> Result<CallResponse> {
        self(request, shape)
    }
}
