//! Blocking HTTP transport
//!
//! Speaks the narrow slice of the server's REST interface that endpoint calls
//! need: one POST per call, document fields as `multipart/form-data`, the
//! session as a cookie, multiple return values as `multipart/mixed`.
//! Authentication is not handled here.

use std::time::Duration;

use dataservices_core::{Error, Format, Result, SessionState};
use tracing::debug;

use crate::multipart::{boundary_of, decode_parts, encode_form_data, new_boundary};
use crate::request::{CallRequest, Document};
use crate::response::{CallResponse, ResponseShape};
use crate::Transport;

/// [`Transport`] that calls a server over HTTP with `ureq`.
pub struct HttpTransport {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpTransport {
    /// Create a transport for a server base URL (e.g. `http://localhost:8012`).
    ///
    /// `timeout` bounds each call end to end.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent: ureq::Agent::new_with_config(config),
        }
    }

    /// Server base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }
}

impl Transport for HttpTransport {
    fn call(&self, request: &CallRequest, shape: ResponseShape) -> Result<CallResponse> {
        let url = self.url_for(request.endpoint());
        let accept = match shape {
            ResponseShape::None => "*/*".to_string(),
            ResponseShape::Single { format, .. } => format.mime_type().to_string(),
            ResponseShape::Multiple { .. } => "multipart/mixed".to_string(),
        };

        let mut builder = self.agent.post(url.as_str()).header("Accept", accept.as_str());
        if let Some(session) = request.session().and_then(|binding| binding.session.as_ref()) {
            builder = builder.header("Cookie", session_cookie(session).as_str());
        }

        let has_documents = request.fields().iter().any(|field| !field.value.is_empty());
        let sent = if has_documents {
            let boundary = new_boundary();
            let body = encode_form_data(request.fields(), &boundary);
            let content_type = format!("multipart/form-data; boundary={}", boundary);
            builder
                .header("Content-Type", content_type.as_str())
                .send(&body[..])
        } else {
            builder
                .header("Content-Type", "application/x-www-form-urlencoded")
                .send_empty()
        };
        let mut response = sent.map_err(|e| Error::transport(format!("{}: {}", url, e)))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .body_mut()
            .read_to_vec()
            .map_err(|e| Error::transport(format!("failed to read response: {}", e)))?;

        debug!(
            target: "dataservices::http",
            endpoint = %request.endpoint(),
            status,
            bytes = body.len(),
            "Endpoint call completed"
        );

        if status >= 400 {
            return Err(Error::Server {
                status,
                reason: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        decode_response(shape, status, content_type.as_deref(), body)?.conform(shape)
    }
}

fn session_cookie(session: &SessionState) -> String {
    format!("{}={}", SessionState::COOKIE_NAME, session.id())
}

fn decode_response(
    shape: ResponseShape,
    status: u16,
    content_type: Option<&str>,
    body: Vec<u8>,
) -> Result<CallResponse> {
    if status == 204 || body.is_empty() {
        return Ok(CallResponse::None);
    }
    let expected = match shape {
        ResponseShape::None => return Ok(CallResponse::None),
        ResponseShape::Single { format, .. } | ResponseShape::Multiple { format, .. } => format,
    };
    let format_of = |content_type: Option<&str>| {
        content_type
            .map(Format::from_mime_type)
            .filter(|format| *format != Format::Unknown)
            .unwrap_or(expected)
    };

    match (shape, content_type.and_then(boundary_of)) {
        (ResponseShape::Multiple { .. }, Some(boundary)) => {
            Ok(CallResponse::Multiple(decode_parts(&body, boundary, expected)?))
        }
        (ResponseShape::Multiple { .. }, None) => Ok(CallResponse::Multiple(vec![Document::new(
            format_of(content_type),
            body,
        )])),
        _ => Ok(CallResponse::Single(Some(Document::new(
            format_of(content_type),
            body,
        )))),
    }
}
