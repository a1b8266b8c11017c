//! Bulk caller listeners
//!
//! The output listener receives every decoded output of a bulk call. The
//! error listener decides what happens after a failed call. Both run on the
//! worker thread that made the call, concurrently across workers.

use dataservices_core::Error;

use crate::context::CallContext;

/// What a bulk caller does after a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorDisposition {
    /// Send the same batch again with the same context
    Retry,
    /// Drop the batch and continue with the next one
    SkipCall,
    /// Stop the worker that made the call; other workers continue
    StopCaller,
    /// Abort the whole unit of work
    StopAllCallers,
}

/// Receives decoded outputs.
pub trait OutputListener<O>: Send + Sync {
    /// Called once per output, in the order the server returned them.
    fn on_output(&self, output: O);
}

impl<O, F> OutputListener<O> for F
where
    F: Fn(O) + Send + Sync,
{
    fn on_output(&self, output: O) {
        self(output)
    }
}

/// Decides the disposition of a failed call.
pub trait ErrorListener<I>: Send + Sync {
    /// `retry_count` is how many times this batch has already been retried.
    fn process_error(
        &self,
        retry_count: u32,
        error: &Error,
        context: &CallContext,
        input: &[I],
    ) -> ErrorDisposition;
}

impl<I, F> ErrorListener<I> for F
where
    F: Fn(u32, &Error, &CallContext, &[I]) -> ErrorDisposition + Send + Sync,
{
    fn process_error(
        &self,
        retry_count: u32,
        error: &Error,
        context: &CallContext,
        input: &[I],
    ) -> ErrorDisposition {
        self(retry_count, error, context, input)
    }
}
