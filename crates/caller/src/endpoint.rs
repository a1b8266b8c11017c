//! Caller facades
//!
//! One type per endpoint shape:
//!
//! | Facade | Input | Output | Bulk calls |
//! |--------|-------|--------|------------|
//! | [`InputOutputCaller`] | yes | yes | one per input batch |
//! | [`InputCaller`] | yes | no | one per input batch |
//! | [`OutputCaller`] | no | yes | per context, until no output |
//! | [`ExecCaller`] | no | no | per context, while state is returned |
//!
//! Each facade validates its declaration on construction and can make single
//! calls or hand out [`BulkCaller`]s for a whole unit of work.

use std::sync::Arc;

use dataservices_core::{EndpointDeclaration, Error, Result, SessionState};
use serde_json::Value as JsonValue;

use crate::bulk::{pool_contexts, BulkCaller, CallStyle, WorkerContexts};
use crate::client::DataServicesClient;
use crate::config::BulkConfig;
use crate::context::CallContext;
use crate::executor::{IoCaller, OutputStream};
use crate::handle::ContentHandle;

/// What every caller facade knows about its endpoint.
pub trait IoEndpoint {
    /// Validated declaration
    fn declaration(&self) -> &EndpointDeclaration;

    /// Server path of the endpoint
    fn endpoint_path(&self) -> &str {
        self.declaration().endpoint_path()
    }

    /// Whether the endpoint declares an endpointState parameter
    fn allows_endpoint_state(&self) -> bool {
        self.declaration().endpoint_state().is_some()
    }

    /// Whether the endpoint declares a session parameter
    fn allows_session(&self) -> bool {
        self.declaration().session().is_some()
    }

    /// Whether the endpoint declares an endpointConstants (or workUnit) parameter
    fn allows_endpoint_constants(&self) -> bool {
        self.declaration().constants().is_some()
    }

    /// Whether the endpoint declares an input parameter
    fn allows_input(&self) -> bool {
        self.declaration().input().is_some()
    }

    /// Create an empty call context for this endpoint.
    fn new_call_context(&self) -> CallContext {
        CallContext::new()
    }

    /// Generate a new session identifier.
    fn new_session_state(&self) -> SessionState {
        SessionState::new()
    }
}

/// Shared state of every facade.
struct Endpoint<I, O> {
    caller: Arc<IoCaller<I, O>>,
    bulk_config: BulkConfig,
    style: CallStyle,
}

impl<I, O> Endpoint<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn new(
        client: &DataServicesClient,
        api_declaration: &JsonValue,
        input_handle: Option<Arc<dyn ContentHandle<I>>>,
        output_handle: Option<Arc<dyn ContentHandle<O>>>,
        style: CallStyle,
    ) -> Result<Self> {
        let caller = IoCaller::new(client.transport(), api_declaration, input_handle, output_handle)?;
        Ok(Self {
            caller: Arc::new(caller),
            bulk_config: client.config().bulk.clone(),
            style,
        })
    }

    fn bulk(&self, contexts: WorkerContexts) -> Result<BulkCaller<I, O>> {
        BulkCaller::new(Arc::clone(&self.caller), self.style, &self.bulk_config, contexts)
    }

    fn bulk_with_contexts(&self, contexts: Vec<CallContext>) -> Result<BulkCaller<I, O>> {
        if contexts.is_empty() {
            return Err(Error::configuration(
                "bulk caller needs at least one call context",
            ));
        }
        self.bulk(WorkerContexts::Pool(contexts))
    }

    fn bulk_with_threads(
        &self,
        contexts: Vec<CallContext>,
        thread_count: usize,
    ) -> Result<BulkCaller<I, O>> {
        self.bulk(WorkerContexts::Pool(pool_contexts(contexts, thread_count, self.style)?))
    }
}

// ============================================================================
// InputOutputCaller
// ============================================================================

/// Calls an endpoint that takes input and returns multiple outputs.
pub struct InputOutputCaller<I, O> {
    endpoint: Endpoint<I, O>,
}

impl<I, O> InputOutputCaller<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Validate the declaration and build the caller.
    pub fn on(
        client: &DataServicesClient,
        api_declaration: &JsonValue,
        input_handle: impl ContentHandle<I> + 'static,
        output_handle: impl ContentHandle<O> + 'static,
    ) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new(
                client,
                api_declaration,
                Some(Arc::new(input_handle)),
                Some(Arc::new(output_handle)),
                CallStyle::InputOutput,
            )?,
        })
    }

    /// Make one call with a fresh context.
    pub fn call(&self, input: &[I]) -> Result<Vec<O>> {
        self.call_with(&mut self.new_call_context(), input)
    }

    /// Make one call, updating the context's endpoint state.
    pub fn call_with(&self, ctx: &mut CallContext, input: &[I]) -> Result<Vec<O>> {
        let caller = &self.endpoint.caller;
        let request = caller.make_request(ctx, Some(input))?;
        caller.response_multiple(&request, ctx)
    }

    /// Make one call and decode its outputs as they are consumed.
    pub fn call_stream(&self, ctx: &mut CallContext, input: &[I]) -> Result<OutputStream<O>> {
        let caller = &self.endpoint.caller;
        let request = caller.make_request(ctx, Some(input))?;
        caller.response_multiple_stream(&request, ctx)
    }

    /// Single-threaded bulk caller with a fresh context.
    pub fn bulk_caller(&self) -> Result<BulkCaller<I, O>> {
        self.bulk_caller_with(self.new_call_context())
    }

    /// Single-threaded bulk caller.
    pub fn bulk_caller_with(&self, ctx: CallContext) -> Result<BulkCaller<I, O>> {
        self.endpoint.bulk(WorkerContexts::Inline(ctx))
    }

    /// Bulk caller with one worker thread per context.
    pub fn bulk_caller_with_contexts(&self, contexts: Vec<CallContext>) -> Result<BulkCaller<I, O>> {
        self.endpoint.bulk_with_contexts(contexts)
    }

    /// Bulk caller with `thread_count` workers, given one context per
    /// worker or a single context to copy for each.
    pub fn bulk_caller_with_threads(
        &self,
        contexts: Vec<CallContext>,
        thread_count: usize,
    ) -> Result<BulkCaller<I, O>> {
        self.endpoint.bulk_with_threads(contexts, thread_count)
    }
}

impl<I, O> IoEndpoint for InputOutputCaller<I, O> {
    fn declaration(&self) -> &EndpointDeclaration {
        self.endpoint.caller.declaration()
    }
}

// ============================================================================
// InputCaller
// ============================================================================

/// Calls an endpoint that takes input and returns nothing (or only its state).
pub struct InputCaller<I> {
    endpoint: Endpoint<I, ()>,
}

impl<I> InputCaller<I>
where
    I: Send + 'static,
{
    /// Validate the declaration and build the caller.
    pub fn on(
        client: &DataServicesClient,
        api_declaration: &JsonValue,
        input_handle: impl ContentHandle<I> + 'static,
    ) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new(
                client,
                api_declaration,
                Some(Arc::new(input_handle)),
                None,
                CallStyle::Input,
            )?,
        })
    }

    /// Make one call with a fresh context.
    pub fn call(&self, input: &[I]) -> Result<()> {
        self.call_with(&mut self.new_call_context(), input)
    }

    /// Make one call, updating the context's endpoint state.
    pub fn call_with(&self, ctx: &mut CallContext, input: &[I]) -> Result<()> {
        let caller = &self.endpoint.caller;
        let request = caller.make_request(ctx, Some(input))?;
        if caller.declaration().returns().is_some() {
            caller.response_with_state(&request, ctx)?;
        } else {
            caller.response_none(&request)?;
        }
        Ok(())
    }

    /// Single-threaded bulk caller with a fresh context.
    pub fn bulk_caller(&self) -> Result<BulkCaller<I, ()>> {
        self.bulk_caller_with(self.new_call_context())
    }

    /// Single-threaded bulk caller.
    pub fn bulk_caller_with(&self, ctx: CallContext) -> Result<BulkCaller<I, ()>> {
        self.endpoint.bulk(WorkerContexts::Inline(ctx))
    }

    /// Bulk caller with one worker thread per context.
    pub fn bulk_caller_with_contexts(&self, contexts: Vec<CallContext>) -> Result<BulkCaller<I, ()>> {
        self.endpoint.bulk_with_contexts(contexts)
    }

    /// Bulk caller with `thread_count` workers.
    pub fn bulk_caller_with_threads(
        &self,
        contexts: Vec<CallContext>,
        thread_count: usize,
    ) -> Result<BulkCaller<I, ()>> {
        self.endpoint.bulk_with_threads(contexts, thread_count)
    }
}

impl<I> IoEndpoint for InputCaller<I> {
    fn declaration(&self) -> &EndpointDeclaration {
        self.endpoint.caller.declaration()
    }
}

// ============================================================================
// OutputCaller
// ============================================================================

/// Calls an endpoint that takes no input and returns multiple outputs.
pub struct OutputCaller<O> {
    endpoint: Endpoint<(), O>,
}

impl<O> OutputCaller<O>
where
    O: Send + 'static,
{
    /// Validate the declaration and build the caller.
    pub fn on(
        client: &DataServicesClient,
        api_declaration: &JsonValue,
        output_handle: impl ContentHandle<O> + 'static,
    ) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new(
                client,
                api_declaration,
                None,
                Some(Arc::new(output_handle)),
                CallStyle::Output,
            )?,
        })
    }

    /// Make one call with a fresh context.
    pub fn call(&self) -> Result<Vec<O>> {
        self.call_with(&mut self.new_call_context())
    }

    /// Make one call, updating the context's endpoint state.
    pub fn call_with(&self, ctx: &mut CallContext) -> Result<Vec<O>> {
        let caller = &self.endpoint.caller;
        let request = caller.make_request(ctx, None)?;
        caller.response_multiple(&request, ctx)
    }

    /// Make one call and decode its outputs as they are consumed.
    pub fn call_stream(&self, ctx: &mut CallContext) -> Result<OutputStream<O>> {
        let caller = &self.endpoint.caller;
        let request = caller.make_request(ctx, None)?;
        caller.response_multiple_stream(&request, ctx)
    }

    /// Single-threaded bulk caller with a fresh context.
    pub fn bulk_caller(&self) -> Result<BulkCaller<(), O>> {
        self.bulk_caller_with(self.new_call_context())
    }

    /// Single-threaded bulk caller.
    pub fn bulk_caller_with(&self, ctx: CallContext) -> Result<BulkCaller<(), O>> {
        self.endpoint.bulk(WorkerContexts::Inline(ctx))
    }

    /// Bulk caller with one worker thread per context.
    pub fn bulk_caller_with_contexts(&self, contexts: Vec<CallContext>) -> Result<BulkCaller<(), O>> {
        self.endpoint.bulk_with_contexts(contexts)
    }

    /// Bulk caller with `thread_count` workers.
    pub fn bulk_caller_with_threads(
        &self,
        contexts: Vec<CallContext>,
        thread_count: usize,
    ) -> Result<BulkCaller<(), O>> {
        self.endpoint.bulk_with_threads(contexts, thread_count)
    }
}

impl<O> IoEndpoint for OutputCaller<O> {
    fn declaration(&self) -> &EndpointDeclaration {
        self.endpoint.caller.declaration()
    }
}

// ============================================================================
// ExecCaller
// ============================================================================

/// Calls an endpoint that takes no input and returns nothing but its state.
pub struct ExecCaller {
    endpoint: Endpoint<(), ()>,
}

impl ExecCaller {
    /// Validate the declaration and build the caller.
    pub fn on(client: &DataServicesClient, api_declaration: &JsonValue) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new(client, api_declaration, None, None, CallStyle::Exec)?,
        })
    }

    /// Make one call with a fresh context.
    pub fn call(&self) -> Result<bool> {
        self.call_with(&mut self.new_call_context())
    }

    /// Make one call; returns true when the endpoint returned a non-null
    /// state, which is stored in the context for the next call.
    pub fn call_with(&self, ctx: &mut CallContext) -> Result<bool> {
        let caller = &self.endpoint.caller;
        let request = caller.make_request(ctx, None)?;
        if caller.declaration().returns().is_some() {
            caller.response_with_state(&request, ctx)
        } else {
            caller.response_none(&request)?;
            Ok(false)
        }
    }

    /// Single-threaded bulk caller with a fresh context.
    pub fn bulk_caller(&self) -> Result<BulkCaller<(), ()>> {
        self.bulk_caller_with(self.new_call_context())
    }

    /// Single-threaded bulk caller.
    pub fn bulk_caller_with(&self, ctx: CallContext) -> Result<BulkCaller<(), ()>> {
        self.endpoint.bulk(WorkerContexts::Inline(ctx))
    }

    /// Bulk caller with one worker thread per context.
    pub fn bulk_caller_with_contexts(
        &self,
        contexts: Vec<CallContext>,
    ) -> Result<BulkCaller<(), ()>> {
        self.endpoint.bulk_with_contexts(contexts)
    }

    /// Bulk caller with `thread_count` workers.
    pub fn bulk_caller_with_threads(
        &self,
        contexts: Vec<CallContext>,
        thread_count: usize,
    ) -> Result<BulkCaller<(), ()>> {
        self.endpoint.bulk_with_threads(contexts, thread_count)
    }
}

impl IoEndpoint for ExecCaller {
    fn declaration(&self) -> &EndpointDeclaration {
        self.endpoint.caller.declaration()
    }
}
