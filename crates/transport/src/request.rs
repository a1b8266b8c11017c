//! Endpoint call requests
//!
//! A [`CallRequest`] is everything the transport needs to make one call:
//! the endpoint path, the optional session, and the named document fields in
//! the order they are sent.

use dataservices_core::{Format, ParameterValuesKind, SessionState};

/// One encoded value, tagged with its wire format.
///
/// Documents own their bytes, so a request can be sent again unchanged when a
/// call is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Wire format
    pub format: Format,
    /// Encoded content
    pub bytes: Vec<u8>,
}

impl Document {
    /// Create a document.
    pub fn new(format: Format, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            format,
            bytes: bytes.into(),
        }
    }

    /// Content as UTF-8 text, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }
}

/// Value of one request field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Zero or one document
    Single(Option<Document>),
    /// Any number of documents
    Multiple(Vec<Document>),
}

impl FieldValue {
    /// Documents carried by the field, in order.
    pub fn documents(&self) -> &[Document] {
        match self {
            FieldValue::Single(Some(doc)) => std::slice::from_ref(doc),
            FieldValue::Single(None) => &[],
            FieldValue::Multiple(docs) => docs,
        }
    }

    /// Returns true when the field carries no document.
    pub fn is_empty(&self) -> bool {
        self.documents().is_empty()
    }
}

/// A named document parameter of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallField {
    /// Declared parameter name
    pub name: &'static str,
    /// Whether the endpoint accepts the field being empty
    pub nullable: bool,
    /// Field content
    pub value: FieldValue,
}

impl CallField {
    /// Field with at most one document.
    pub fn single(name: &'static str, nullable: bool, doc: Option<Document>) -> Self {
        Self {
            name,
            nullable,
            value: FieldValue::Single(doc),
        }
    }

    /// Field with a sequence of documents.
    pub fn multiple(name: &'static str, nullable: bool, docs: Vec<Document>) -> Self {
        Self {
            name,
            nullable,
            value: FieldValue::Multiple(docs),
        }
    }
}

/// Session attached to the request envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBinding {
    /// Declared parameter name
    pub name: &'static str,
    /// Whether the endpoint accepts calls without a session
    pub nullable: bool,
    /// Session sent with the call, if any
    pub session: Option<SessionState>,
}

/// One fully built endpoint call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    endpoint: String,
    values_kind: ParameterValuesKind,
    session: Option<SessionBinding>,
    fields: Vec<CallField>,
}

impl CallRequest {
    /// Start a request for an endpoint.
    pub fn new(endpoint: impl Into<String>, values_kind: ParameterValuesKind) -> Self {
        Self {
            endpoint: endpoint.into(),
            values_kind,
            session: None,
            fields: Vec::new(),
        }
    }

    /// Attach the session binding.
    pub fn with_session(
        mut self,
        name: &'static str,
        session: Option<SessionState>,
        nullable: bool,
    ) -> Self {
        self.session = Some(SessionBinding {
            name,
            nullable,
            session,
        });
        self
    }

    /// Set the document fields, replacing any already present.
    pub fn with_params(mut self, fields: Vec<CallField>) -> Self {
        self.fields = fields;
        self
    }

    /// Endpoint path
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Declared parameter shape
    pub fn values_kind(&self) -> ParameterValuesKind {
        self.values_kind
    }

    /// Session binding, when the endpoint declares a session
    pub fn session(&self) -> Option<&SessionBinding> {
        self.session.as_ref()
    }

    /// Document fields in wire order
    pub fn fields(&self) -> &[CallField] {
        &self.fields
    }

    /// Look up a field by parameter name.
    pub fn field(&self, name: &str) -> Option<&CallField> {
        self.fields.iter().find(|f| f.name == name)
    }
}
