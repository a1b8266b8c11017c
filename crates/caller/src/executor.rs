//! Single-call executor
//!
//! [`IoCaller`] owns a validated declaration, the transport and the content
//! handles of one endpoint. It builds a [`CallRequest`] from a call context
//! and an input batch, sends it, and decodes the response in one of the
//! shapes below. Every caller facade and every bulk worker goes through it.
//!
//! | Accessor | Declared return | State write-back |
//! |----------|-----------------|------------------|
//! | `response_none` | none | no |
//! | `response_with_state` | single | the value itself |
//! | `response_single` | single | no |
//! | `response_multiple` | multiple | first document, after decoding |
//! | `response_multiple_stream` | multiple | first document, before decoding |

use std::sync::Arc;

use dataservices_core::{EndpointDeclaration, Error, Format, Result};
use dataservices_transport::{
    CallField, CallRequest, CallResponse, Document, ResponseShape, Transport,
};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::context::CallContext;
use crate::handle::ContentHandle;

/// Makes calls to one endpoint.
pub struct IoCaller<I, O> {
    declaration: Arc<EndpointDeclaration>,
    transport: Arc<dyn Transport>,
    input_handle: Option<Arc<dyn ContentHandle<I>>>,
    output_handle: Option<Arc<dyn ContentHandle<O>>>,
}

impl<I, O> IoCaller<I, O> {
    /// Validate a declaration against the supplied handles.
    ///
    /// Fails with a configuration error when the declaration is invalid or a
    /// handle cannot represent the declared format.
    pub fn new(
        transport: Arc<dyn Transport>,
        api_declaration: &JsonValue,
        input_handle: Option<Arc<dyn ContentHandle<I>>>,
        output_handle: Option<Arc<dyn ContentHandle<O>>>,
    ) -> Result<Self> {
        let declaration = EndpointDeclaration::parse(
            api_declaration,
            input_handle.is_some(),
            output_handle.is_some(),
        )?;

        if let (Some(handle), Some(format)) = (&input_handle, declaration.input_format()) {
            if !handle.supports(format) {
                return Err(Error::configuration(format!(
                    "input handle cannot represent {} content for endpoint: {}",
                    format,
                    declaration.endpoint_path()
                )));
            }
        }
        if let (Some(handle), Some(format)) = (&output_handle, declaration.output_format()) {
            if !handle.supports(format) {
                return Err(Error::configuration(format!(
                    "output handle cannot represent {} content for endpoint: {}",
                    format,
                    declaration.endpoint_path()
                )));
            }
        }

        Ok(Self {
            declaration: Arc::new(declaration),
            transport,
            input_handle,
            output_handle,
        })
    }

    /// Validated declaration
    pub fn declaration(&self) -> &EndpointDeclaration {
        &self.declaration
    }

    /// Server path of the endpoint
    pub fn endpoint_path(&self) -> &str {
        self.declaration.endpoint_path()
    }

    /// Build the request for one call.
    ///
    /// Fields are ordered endpointState, constants, input. Values the
    /// endpoint does not declare are rejected rather than dropped.
    pub fn make_request(&self, ctx: &CallContext, input: Option<&[I]>) -> Result<CallRequest> {
        let decl = &self.declaration;
        let mut fields = Vec::with_capacity(3);

        match (decl.endpoint_state(), ctx.endpoint_state()) {
            (Some(param), Some(state)) => fields.push(CallField::single(
                param.name(),
                param.is_nullable(),
                Some(Document::new(param.format(), state)),
            )),
            (None, Some(_)) => {
                return Err(Error::configuration(format!(
                    "endpointState parameter not supported by endpoint: {}",
                    decl.endpoint_path()
                )))
            }
            _ => {}
        }

        match (decl.constants(), ctx.endpoint_constants()) {
            (Some(param), Some(constants)) => fields.push(CallField::single(
                param.name(),
                param.is_nullable(),
                Some(Document::new(param.format(), constants)),
            )),
            (Some(param), None) if !param.is_nullable() => {
                return Err(Error::configuration(format!(
                    "{} parameter is required by endpoint: {}",
                    param.name(),
                    decl.endpoint_path()
                )))
            }
            (None, Some(_)) => {
                return Err(Error::configuration(format!(
                    "endpointConstants parameter not supported by endpoint: {}",
                    decl.endpoint_path()
                )))
            }
            _ => {}
        }

        match (decl.input(), input) {
            (Some(param), Some(values)) => {
                let handle = self.input_handle.as_ref().ok_or_else(|| {
                    Error::configuration("no input handle provided for input parameter")
                })?;
                let format = param.format();
                let docs = values
                    .iter()
                    .map(|value| Ok(Document::new(format, handle.encode(value, format)?)))
                    .collect::<Result<Vec<_>>>()?;
                fields.push(CallField::multiple(param.name(), param.is_nullable(), docs));
            }
            (None, Some(values)) if !values.is_empty() => {
                return Err(Error::configuration(format!(
                    "input parameter not supported by endpoint: {}",
                    decl.endpoint_path()
                )))
            }
            _ => {}
        }

        let mut request = CallRequest::new(decl.endpoint_path(), decl.values_kind());
        match (decl.session(), ctx.session()) {
            (Some(param), session) => {
                if session.is_none() && !param.is_nullable() {
                    return Err(Error::configuration(format!(
                        "session parameter is required by endpoint: {}",
                        decl.endpoint_path()
                    )));
                }
                request = request.with_session(param.name(), session.cloned(), param.is_nullable());
            }
            (None, Some(_)) => {
                return Err(Error::configuration(format!(
                    "session parameter not supported by endpoint: {}",
                    decl.endpoint_path()
                )))
            }
            (None, None) => {}
        }

        Ok(request.with_params(fields))
    }

    /// Call an endpoint that declares no return.
    pub fn response_none(&self, request: &CallRequest) -> Result<()> {
        if self.declaration.returns().is_some() {
            return Err(Error::unsupported(format!(
                "return from endpoint ignored: {}",
                self.declaration.endpoint_path()
            )));
        }
        self.send(request, ResponseShape::None)?;
        Ok(())
    }

    /// Call an endpoint whose single return value is its next endpoint state.
    ///
    /// Returns true when the endpoint returned a non-null state.
    pub fn response_with_state(&self, request: &CallRequest, ctx: &mut CallContext) -> Result<bool> {
        let shape = self.single_shape()?;
        let state = match self.send(request, shape)? {
            CallResponse::Single(doc) => doc.map(|doc| doc.bytes).filter(|b| !b.is_empty()),
            _ => None,
        };
        let has_state = state.is_some();
        if self.declaration.endpoint_state().is_some() {
            ctx.set_endpoint_state(state);
        }
        Ok(has_state)
    }

    /// Call an endpoint with a single return value.
    pub fn response_single(&self, request: &CallRequest) -> Result<Option<O>> {
        let shape = self.single_shape()?;
        let handle = self.output_handle()?;
        match self.send(request, shape)? {
            CallResponse::Single(Some(doc)) => Ok(Some(handle.decode(doc.bytes, shape_format(shape))?)),
            _ => Ok(None),
        }
    }

    /// Call an endpoint with multiple return values and decode all of them.
    ///
    /// The context's endpoint state is only updated once every output has
    /// decoded; a decode failure leaves the context as it was.
    pub fn response_multiple(&self, request: &CallRequest, ctx: &mut CallContext) -> Result<Vec<O>> {
        let shape = self.multiple_shape()?;
        let handle = self.output_handle()?;
        let format = shape_format(shape);
        let (state, docs) = self.split_state(self.send(request, shape)?);

        let outputs = docs
            .into_iter()
            .map(|doc| handle.decode(doc.bytes, format))
            .collect::<Result<Vec<_>>>()?;

        if self.declaration.endpoint_state().is_some() {
            ctx.set_endpoint_state(state);
        }
        Ok(outputs)
    }

    /// Call an endpoint with multiple return values, decoding them lazily.
    ///
    /// The endpoint state is written back as soon as the call succeeds.
    pub fn response_multiple_stream(
        &self,
        request: &CallRequest,
        ctx: &mut CallContext,
    ) -> Result<OutputStream<O>> {
        let shape = self.multiple_shape()?;
        let handle = Arc::clone(self.output_handle()?);
        let (state, docs) = self.split_state(self.send(request, shape)?);

        if self.declaration.endpoint_state().is_some() {
            ctx.set_endpoint_state(state);
        }
        Ok(OutputStream {
            documents: docs.into_iter(),
            handle,
            format: shape_format(shape),
        })
    }

    fn send(&self, request: &CallRequest, shape: ResponseShape) -> Result<CallResponse> {
        debug!(
            target: "dataservices::executor",
            endpoint = %request.endpoint(),
            fields = request.fields().len(),
            "Calling endpoint"
        );
        self.transport.call(request, shape)?.conform(shape)
    }

    fn split_state(&self, response: CallResponse) -> (Option<Vec<u8>>, Vec<Document>) {
        let mut docs = match response {
            CallResponse::Multiple(docs) => docs,
            CallResponse::Single(doc) => doc.into_iter().collect(),
            CallResponse::None => Vec::new(),
        };
        if self.declaration.endpoint_state().is_none() || docs.is_empty() {
            return (None, docs);
        }
        let state = docs.remove(0).bytes;
        ((!state.is_empty()).then_some(state), docs)
    }

    fn output_handle(&self) -> Result<&Arc<dyn ContentHandle<O>>> {
        self.output_handle.as_ref().ok_or_else(|| {
            Error::unsupported(format!(
                "no output handle for return values of endpoint: {}",
                self.declaration.endpoint_path()
            ))
        })
    }

    fn single_shape(&self) -> Result<ResponseShape> {
        match self.declaration.returns() {
            Some(returns) if !returns.is_multiple() => Ok(ResponseShape::Single {
                nullable: returns.is_nullable(),
                format: returns.format(),
            }),
            Some(_) => Err(Error::unsupported(format!(
                "multiple return from endpoint: {}",
                self.declaration.endpoint_path()
            ))),
            None => Err(Error::unsupported(format!(
                "no return from endpoint: {}",
                self.declaration.endpoint_path()
            ))),
        }
    }

    fn multiple_shape(&self) -> Result<ResponseShape> {
        match self.declaration.returns() {
            Some(returns) if returns.is_multiple() => Ok(ResponseShape::Multiple {
                nullable: returns.is_nullable(),
                format: returns.format(),
            }),
            Some(_) => Err(Error::unsupported(format!(
                "single return from endpoint: {}",
                self.declaration.endpoint_path()
            ))),
            None => Err(Error::unsupported(format!(
                "no return from endpoint: {}",
                self.declaration.endpoint_path()
            ))),
        }
    }
}

fn shape_format(shape: ResponseShape) -> Format {
    match shape {
        ResponseShape::None => Format::Unknown,
        ResponseShape::Single { format, .. } | ResponseShape::Multiple { format, .. } => format,
    }
}

/// Outputs of one call, decoded as they are consumed.
pub struct OutputStream<O> {
    documents: std::vec::IntoIter<Document>,
    handle: Arc<dyn ContentHandle<O>>,
    format: Format,
}

impl<O> Iterator for OutputStream<O> {
    type Item = Result<O>;

    fn next(&mut self) -> Option<Self::Item> {
        let doc = self.documents.next()?;
        Some(self.handle.decode(doc.bytes, self.format))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.documents.size_hint()
    }
}

impl<O> ExactSizeIterator for OutputStream<O> {}
