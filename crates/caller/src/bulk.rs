//! Bulk caller
//!
//! Runs one unit of work against an endpoint: many calls, each with a batch
//! of queued inputs (input endpoints) or looping until the endpoint reports it
//! is done (output and exec endpoints).
//!
//! ## Threading
//!
//! - Single-threaded: calls run on the thread that calls [`BulkCaller::accept`]
//!   once a full batch is queued, and on the thread that calls
//!   [`BulkCaller::await_completion`] for the rest.
//! - Pool: a fixed set of worker threads, one per call context. A context is
//!   pinned to its worker for the whole unit of work.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle -> Accepting -> Draining -> Completed
//!           \______________\_____-> Aborted
//! ```
//!
//! Failures are handed to the error listener, whose [`ErrorDisposition`]
//! decides what happens next. Without an error listener the first failure
//! aborts the unit of work.

use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

use dataservices_core::{Error, Result};

use crate::config::BulkConfig;
use crate::context::CallContext;
use crate::executor::IoCaller;
use crate::listener::{ErrorDisposition, ErrorListener, OutputListener};

/// Lifecycle state of a bulk caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkState {
    /// Created, no call made yet
    Idle,
    /// Taking input
    Accepting,
    /// Input closed, remaining work in flight
    Draining,
    /// Every worker finished
    Completed,
    /// Stopped by a failure or by `StopAllCallers`
    Aborted,
}

/// Summary of a finished unit of work.
#[derive(Debug, Clone)]
pub struct BulkReport {
    /// Successful calls
    pub calls: u64,
    /// Calls sent again after a `Retry` disposition
    pub retries: u64,
    /// Calls dropped after a `SkipCall` disposition
    pub skipped: u64,
    /// Accepted inputs never sent because every worker stopped
    pub items_unprocessed: usize,
    /// Final call context of each worker, in worker order
    pub contexts: Vec<CallContext>,
}

/// How each call of a unit of work is made and when a worker is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallStyle {
    /// Input batches in, outputs out
    InputOutput,
    /// Input batches in, nothing out
    Input,
    /// Loop while the endpoint returns output
    Output,
    /// Loop while the endpoint returns a state
    Exec,
}

impl CallStyle {
    fn takes_input(self) -> bool {
        matches!(self, CallStyle::InputOutput | CallStyle::Input)
    }

    fn check<I, O>(self, caller: &IoCaller<I, O>) -> Result<()> {
        let multiple = matches!(caller.declaration().returns(), Some(r) if r.is_multiple());
        let ok = match self {
            CallStyle::InputOutput | CallStyle::Output => multiple,
            CallStyle::Input | CallStyle::Exec => !multiple,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::unsupported(format!(
                "return shape does not match {:?} bulk calls for endpoint: {}",
                self,
                caller.endpoint_path()
            )))
        }
    }

    /// Make one call; returns the outputs and whether the worker should
    /// keep calling.
    fn call<I, O>(
        self,
        caller: &IoCaller<I, O>,
        ctx: &mut CallContext,
        batch: &[I],
    ) -> Result<(Vec<O>, bool)> {
        let has_return = caller.declaration().returns().is_some();
        match self {
            CallStyle::InputOutput => {
                let request = caller.make_request(ctx, Some(batch))?;
                Ok((caller.response_multiple(&request, ctx)?, true))
            }
            CallStyle::Input => {
                let request = caller.make_request(ctx, Some(batch))?;
                if has_return {
                    caller.response_with_state(&request, ctx)?;
                } else {
                    caller.response_none(&request)?;
                }
                Ok((Vec::new(), true))
            }
            CallStyle::Output => {
                let request = caller.make_request(ctx, None)?;
                let outputs = caller.response_multiple(&request, ctx)?;
                let more = !outputs.is_empty()
                    && (caller.declaration().endpoint_state().is_none()
                        || ctx.endpoint_state().is_some());
                Ok((outputs, more))
            }
            CallStyle::Exec => {
                let request = caller.make_request(ctx, None)?;
                let more = if has_return {
                    caller.response_with_state(&request, ctx)?
                } else {
                    caller.response_none(&request)?;
                    false
                };
                Ok((Vec::new(), more))
            }
        }
    }
}

/// Call contexts a bulk caller starts with.
pub(crate) enum WorkerContexts {
    /// Calls run on the invoking thread
    Inline(CallContext),
    /// One worker thread per context
    Pool(Vec<CallContext>),
}

/// Expand a thread count into one context per worker.
///
/// Either one context per thread, or a single template cloned per thread.
/// A template is only cloned for input endpoints, where workers split the
/// queue, and only when it carries no session or endpoint state: those belong
/// to exactly one worker.
pub(crate) fn pool_contexts(
    contexts: Vec<CallContext>,
    thread_count: usize,
    style: CallStyle,
) -> Result<Vec<CallContext>> {
    if thread_count == 0 {
        return Err(Error::configuration("thread count must be at least 1"));
    }
    match contexts.len() {
        n if n == thread_count => Ok(contexts),
        1 => {
            let template = &contexts[0];
            if !style.takes_input() {
                return Err(Error::configuration(format!(
                    "endpoint takes no input; pass one call context per thread instead of a template for {} threads",
                    thread_count
                )));
            }
            if template.session().is_some() || template.endpoint_state().is_some() {
                return Err(Error::configuration(
                    "a template context with a session or endpoint state cannot be shared by several threads",
                ));
            }
            Ok(vec![template.clone(); thread_count])
        }
        n => Err(Error::configuration(format!(
            "{} call contexts cannot be spread over {} threads",
            n, thread_count
        ))),
    }
}

struct InputQueue<I> {
    items: VecDeque<I>,
    closed: bool,
    live_workers: usize,
}

struct Listeners<I, O> {
    output: Option<Arc<dyn OutputListener<O>>>,
    error: Option<Arc<dyn ErrorListener<I>>>,
}

struct BulkInner<I, O> {
    caller: Arc<IoCaller<I, O>>,
    style: CallStyle,
    batch_size: usize,
    capacity: usize,
    queue: Mutex<InputQueue<I>>,
    not_empty: Condvar,
    not_full: Condvar,
    listeners: RwLock<Listeners<I, O>>,
    state: Mutex<BulkState>,
    aborted: AtomicBool,
    failure: Mutex<Option<Error>>,
    calls: AtomicU64,
    retries: AtomicU64,
    skipped: AtomicU64,
}

impl<I, O> BulkInner<I, O> {
    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    fn abort(&self, cause: Error) {
        error!(
            target: "dataservices::bulk",
            endpoint = %self.caller.endpoint_path(),
            error = %cause,
            "Aborting bulk call"
        );
        *self.failure.lock() = Some(cause);
        self.aborted.store(true, Ordering::Release);
        *self.state.lock() = BulkState::Aborted;

        // Lock the queue before notifying: a worker or producer between its
        // aborted check and its wait holds this lock, so it either sees the
        // flag or is already waiting when we notify.
        let _queue = self.queue.lock();
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    fn aborted_error(&self) -> Error {
        let cause = self
            .failure
            .lock()
            .clone()
            .unwrap_or_else(|| Error::invalid_state("bulk caller aborted"));
        Error::BulkAborted {
            cause: Box::new(cause),
        }
    }

    /// Block until a batch is ready. Returns None once the queue is closed
    /// and empty, or the unit of work aborted.
    fn next_batch(&self) -> Option<Vec<I>> {
        let mut queue = self.queue.lock();
        loop {
            if self.is_aborted() {
                return None;
            }
            let len = queue.items.len();
            if len >= self.batch_size || (queue.closed && len > 0) {
                let batch: Vec<I> = queue.items.drain(..len.min(self.batch_size)).collect();
                if queue.items.len() >= self.batch_size {
                    self.not_empty.notify_one();
                }
                self.not_full.notify_all();
                return Some(batch);
            }
            if queue.closed {
                return None;
            }
            self.not_empty.wait(&mut queue);
        }
    }

    fn dispatch(&self, outputs: Vec<O>) {
        if outputs.is_empty() {
            return;
        }
        let listener = self.listeners.read().output.clone();
        match listener {
            Some(listener) => outputs.into_iter().for_each(|output| listener.on_output(output)),
            None => debug!(
                target: "dataservices::bulk",
                count = outputs.len(),
                "No output listener, outputs dropped"
            ),
        }
    }
}

/// Decrements the live worker count when a pool worker exits, and wakes
/// producers so they notice when no worker is left.
struct LiveWorkerGuard<I, O> {
    inner: Arc<BulkInner<I, O>>,
}

impl<I, O> Drop for LiveWorkerGuard<I, O> {
    fn drop(&mut self) {
        let mut queue = self.inner.queue.lock();
        queue.live_workers = queue.live_workers.saturating_sub(1);
        self.inner.not_full.notify_all();
        self.inner.not_empty.notify_all();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Done,
    Stop,
}

struct Worker<I, O> {
    inner: Arc<BulkInner<I, O>>,
    context: CallContext,
    id: usize,
}

impl<I, O> Worker<I, O> {
    fn run(&mut self) {
        if self.inner.style.takes_input() {
            while let Some(batch) = self.inner.next_batch() {
                if self.process(&batch) != Flow::Continue {
                    break;
                }
            }
        } else {
            while self.process(&[]) == Flow::Continue {}
        }
    }

    /// Make one call, retrying as long as the error listener asks to.
    fn process(&mut self, batch: &[I]) -> Flow {
        let inner = Arc::clone(&self.inner);
        let mut retry_count = 0u32;
        loop {
            if inner.is_aborted() {
                return Flow::Stop;
            }
            let error = match inner.style.call(&inner.caller, &mut self.context, batch) {
                Ok((outputs, more)) => {
                    inner.calls.fetch_add(1, Ordering::Relaxed);
                    inner.dispatch(outputs);
                    return if more { Flow::Continue } else { Flow::Done };
                }
                Err(error) => error,
            };

            let listener = if error.is_configuration() {
                None
            } else {
                inner.listeners.read().error.clone()
            };
            let Some(listener) = listener else {
                inner.abort(error);
                return Flow::Stop;
            };

            match listener.process_error(retry_count, &error, &self.context, batch) {
                ErrorDisposition::Retry => {
                    warn!(
                        target: "dataservices::bulk",
                        worker = self.id,
                        retry_count,
                        error = %error,
                        "Retrying call"
                    );
                    inner.retries.fetch_add(1, Ordering::Relaxed);
                    retry_count = retry_count.saturating_add(1);
                }
                ErrorDisposition::SkipCall => {
                    warn!(
                        target: "dataservices::bulk",
                        worker = self.id,
                        items = batch.len(),
                        error = %error,
                        "Skipping failed call"
                    );
                    inner.skipped.fetch_add(1, Ordering::Relaxed);
                    return if inner.style.takes_input() {
                        Flow::Continue
                    } else {
                        Flow::Done
                    };
                }
                ErrorDisposition::StopCaller => {
                    warn!(
                        target: "dataservices::bulk",
                        worker = self.id,
                        error = %error,
                        "Stopping worker after failed call"
                    );
                    return Flow::Stop;
                }
                ErrorDisposition::StopAllCallers => {
                    inner.abort(error);
                    return Flow::Stop;
                }
            }
        }
    }
}

/// Runs a bulk unit of work against one endpoint.
///
/// Created by the `bulk_caller*` methods of the caller facades. Set the
/// listeners, feed input with [`accept`](Self::accept) (input endpoints),
/// then call [`await_completion`](Self::await_completion). Dropping an
/// unfinished bulk caller aborts it and joins its workers.
pub struct BulkCaller<I, O> {
    inner: Arc<BulkInner<I, O>>,
    inline: Mutex<Option<Worker<I, O>>>,
    pending: Mutex<Vec<CallContext>>,
    workers: Mutex<Vec<JoinHandle<CallContext>>>,
    thread_name_prefix: String,
    finished: bool,
}

impl<I, O> BulkCaller<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    pub(crate) fn new(
        caller: Arc<IoCaller<I, O>>,
        style: CallStyle,
        config: &BulkConfig,
        contexts: WorkerContexts,
    ) -> Result<Self> {
        style.check(&caller)?;
        let batch_size = caller.declaration().bulk().input_batch_size.max(1);
        let (inline_context, pending) = match contexts {
            WorkerContexts::Inline(ctx) => (Some(ctx), Vec::new()),
            WorkerContexts::Pool(contexts) if contexts.is_empty() => {
                return Err(Error::configuration("bulk caller needs at least one call context"))
            }
            WorkerContexts::Pool(contexts) => (None, contexts),
        };

        let inner = Arc::new(BulkInner {
            caller,
            style,
            batch_size,
            capacity: config.queue_capacity.max(batch_size),
            queue: Mutex::new(InputQueue {
                items: VecDeque::new(),
                closed: false,
                live_workers: usize::from(inline_context.is_some()),
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            listeners: RwLock::new(Listeners {
                output: None,
                error: None,
            }),
            state: Mutex::new(BulkState::Idle),
            aborted: AtomicBool::new(false),
            failure: Mutex::new(None),
            calls: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        });

        let inline = inline_context.map(|context| Worker {
            inner: Arc::clone(&inner),
            context,
            id: 0,
        });

        Ok(Self {
            inner,
            inline: Mutex::new(inline),
            pending: Mutex::new(pending),
            workers: Mutex::new(Vec::new()),
            thread_name_prefix: config.thread_name_prefix.clone(),
            finished: false,
        })
    }

    /// Receive every decoded output.
    ///
    /// Pool workers invoke the listener concurrently.
    pub fn set_output_listener<F>(&self, listener: F)
    where
        F: Fn(O) + Send + Sync + 'static,
    {
        self.inner.listeners.write().output = Some(Arc::new(listener));
    }

    /// Decide what happens after a failed call.
    ///
    /// Called with the retry count of the batch, the error, the worker's
    /// context and the batch itself.
    pub fn set_error_listener<F>(&self, listener: F)
    where
        F: Fn(u32, &Error, &CallContext, &[I]) -> ErrorDisposition + Send + Sync + 'static,
    {
        self.inner.listeners.write().error = Some(Arc::new(listener));
    }

    /// Current lifecycle state
    pub fn state(&self) -> BulkState {
        *self.inner.state.lock()
    }

    /// Queue one input. Blocks while the queue is full.
    ///
    /// In single-threaded mode a full batch is sent before this returns.
    pub fn accept(&self, item: I) -> Result<()> {
        if !self.inner.style.takes_input() {
            return Err(Error::unsupported(format!(
                "endpoint takes no input: {}",
                self.inner.caller.endpoint_path()
            )));
        }
        self.start()?;

        let inline = self.is_inline();
        let batch = {
            let mut queue = self.inner.queue.lock();
            loop {
                if self.inner.is_aborted() {
                    return Err(self.inner.aborted_error());
                }
                if queue.closed {
                    return Err(Error::invalid_state("bulk caller no longer accepts input"));
                }
                if queue.live_workers == 0 {
                    return Err(Error::invalid_state("every bulk worker has stopped"));
                }
                if queue.items.len() < self.inner.capacity {
                    break;
                }
                self.inner.not_full.wait(&mut queue);
            }

            queue.items.push_back(item);
            if queue.items.len() < self.inner.batch_size {
                return Ok(());
            }
            if !inline {
                self.inner.not_empty.notify_one();
                return Ok(());
            }
            queue.items.drain(..).collect::<Vec<I>>()
        };
        self.run_inline(&batch)
    }

    /// Queue every input in order.
    pub fn accept_all(&self, items: impl IntoIterator<Item = I>) -> Result<()> {
        for item in items {
            self.accept(item)?;
        }
        Ok(())
    }

    /// Close input and wait for every call to finish.
    ///
    /// For output and exec endpoints this is what starts the calls.
    pub fn await_completion(mut self) -> Result<BulkReport> {
        self.start()?;
        {
            let mut state = self.inner.state.lock();
            if *state != BulkState::Aborted {
                *state = BulkState::Draining;
            }
        }
        {
            let mut queue = self.inner.queue.lock();
            queue.closed = true;
            self.inner.not_empty.notify_all();
        }

        let mut contexts = Vec::new();
        let inline = self.inline.lock().take();
        if let Some(mut worker) = inline {
            // A worker stopped by its error listener during accept stays stopped
            if self.inner.queue.lock().live_workers > 0 {
                worker.run();
            }
            contexts.push(worker.context);
        }

        let handles = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            match handle.join() {
                Ok(context) => contexts.push(context),
                Err(_) => self
                    .inner
                    .abort(Error::invalid_state("bulk worker thread panicked")),
            }
        }

        self.finished = true;
        self.finish(contexts)
    }

    fn is_inline(&self) -> bool {
        self.inline.lock().is_some()
    }

    fn run_inline(&self, batch: &[I]) -> Result<()> {
        let mut inline = self.inline.lock();
        let Some(worker) = inline.as_mut() else {
            return Ok(());
        };
        if worker.process(batch) == Flow::Stop {
            if self.inner.is_aborted() {
                return Err(self.inner.aborted_error());
            }
            self.inner.queue.lock().live_workers = 0;
        }
        Ok(())
    }

    /// Leave `Idle` and spawn pool workers on first use.
    fn start(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if *state == BulkState::Idle {
                *state = BulkState::Accepting;
            }
        }

        let contexts = std::mem::take(&mut *self.pending.lock());
        if contexts.is_empty() {
            return Ok(());
        }

        info!(
            target: "dataservices::bulk",
            endpoint = %self.inner.caller.endpoint_path(),
            workers = contexts.len(),
            batch_size = self.inner.batch_size,
            "Starting bulk caller"
        );

        let mut workers = self.workers.lock();
        for (id, context) in contexts.into_iter().enumerate() {
            let inner = Arc::clone(&self.inner);
            self.inner.queue.lock().live_workers += 1;
            let spawned = std::thread::Builder::new()
                .name(format!("{}-{}", self.thread_name_prefix, id))
                .spawn(move || {
                    let _guard = LiveWorkerGuard {
                        inner: Arc::clone(&inner),
                    };
                    let mut worker = Worker { inner, context, id };

                    // A panicking listener must not take the context with it;
                    // the unit of work aborts and the guard does the bookkeeping.
                    if let Err(e) =
                        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| worker.run()))
                    {
                        worker.inner.abort(Error::invalid_state(format!(
                            "bulk worker panicked: {}",
                            panic_reason(e.as_ref())
                        )));
                    }
                    worker.context
                });

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    self.inner.queue.lock().live_workers -= 1;
                    let err = Error::invalid_state(format!("failed to spawn bulk worker: {}", e));
                    self.inner.abort(err.clone());
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn finish(&self, contexts: Vec<CallContext>) -> Result<BulkReport> {
        if self.inner.is_aborted() {
            *self.inner.state.lock() = BulkState::Aborted;
            return Err(self.inner.aborted_error());
        }
        *self.inner.state.lock() = BulkState::Completed;

        let items_unprocessed = self.inner.queue.lock().items.len();
        let report = BulkReport {
            calls: self.inner.calls.load(Ordering::Relaxed),
            retries: self.inner.retries.load(Ordering::Relaxed),
            skipped: self.inner.skipped.load(Ordering::Relaxed),
            items_unprocessed,
            contexts,
        };
        if items_unprocessed > 0 {
            warn!(
                target: "dataservices::bulk",
                endpoint = %self.inner.caller.endpoint_path(),
                items_unprocessed,
                "Every worker stopped before the input was consumed"
            );
        }
        info!(
            target: "dataservices::bulk",
            endpoint = %self.inner.caller.endpoint_path(),
            calls = report.calls,
            retries = report.retries,
            skipped = report.skipped,
            "Bulk caller completed"
        );
        Ok(report)
    }
}

fn panic_reason<'a>(payload: &'a (dyn std::any::Any + Send + 'static)) -> &'a str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("(non-string panic)")
}

impl<I, O> Drop for BulkCaller<I, O> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let handles = std::mem::take(&mut *self.workers.lock());
        if handles.is_empty() {
            return;
        }
        if !self.inner.is_aborted() {
            self.inner
                .abort(Error::invalid_state("bulk caller dropped before completion"));
        }
        for handle in handles {
            let _ = handle.join();
        }
    }
}
