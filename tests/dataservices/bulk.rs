//! Bulk callers: batching, worker pools, error dispositions, loops.

use crate::common::*;
use dataservices::{BulkConfig, BulkState};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn echo_caller(transport: &Arc<MockTransport>, batch_size: usize) -> InputOutputCaller<String, String> {
    InputOutputCaller::on(
        &transport.client(),
        &io_declaration("jsonDocument", batch_size),
        StringHandle,
        StringHandle,
    )
    .unwrap()
}

fn items(range: std::ops::Range<usize>) -> Vec<String> {
    range.map(|i| i.to_string()).collect()
}

fn sorted(values: &[String]) -> Vec<String> {
    let mut values = values.to_vec();
    values.sort_by_key(|v| v.parse::<usize>().unwrap_or(usize::MAX));
    values
}

/// Echo, except that the given item always fails.
fn failing_on(poison: &'static str) -> Arc<MockTransport> {
    MockTransport::new(move |request, _| {
        let inputs = input_texts(request);
        if inputs.iter().any(|item| item == poison) {
            return Err(Error::Server {
                status: 500,
                reason: format!("cannot process {}", poison),
            });
        }
        Ok(CallResponse::Multiple(input_documents(request)))
    })
}

// ============================================================================
// Dispositions
// ============================================================================

#[test]
fn failure_without_error_listener_tears_down_pool() {
    let transport = failing_on("40");
    let caller = echo_caller(&transport, 1);
    let bulk = caller.bulk_caller_with_threads(vec![CallContext::new()], 4).unwrap();
    let (seen, listener) = collector();
    bulk.set_output_listener(listener);

    let mut accepted = 0;
    for item in items(0..10_000) {
        if bulk.accept(item).is_err() {
            break;
        }
        accepted += 1;
    }
    assert!(accepted < 10_000, "accept kept succeeding after the abort");

    match bulk.await_completion() {
        Err(Error::BulkAborted { cause }) => assert!(matches!(*cause, Error::Server { status: 500, .. })),
        other => panic!("expected abort, got {:?}", other.map(|r| r.calls)),
    }

    let outputs = seen.lock().clone();
    assert!(outputs.len() < accepted);
    assert!(!outputs.contains(&"40".to_string()));
    let unique: HashSet<_> = outputs.iter().collect();
    assert_eq!(unique.len(), outputs.len(), "an output was delivered twice");
    assert!(outputs.iter().all(|o| o.parse::<usize>().unwrap() < accepted));
}

#[test]
fn failure_without_error_listener_single_worker_loses_nothing() {
    let transport = failing_on("7");
    let caller = echo_caller(&transport, 1);
    let bulk = caller.bulk_caller_with_threads(vec![CallContext::new()], 1).unwrap();
    let (seen, listener) = collector();
    bulk.set_output_listener(listener);

    for item in items(0..8) {
        bulk.accept(item).unwrap();
    }
    assert!(bulk.await_completion().is_err());
    // The 8th item failed; exactly the seven before it were delivered
    assert_eq!(*seen.lock(), items(0..7));
}

#[test]
fn retry_until_success_delivers_output_once() {
    let failures: Arc<Mutex<HashMap<String, usize>>> = Arc::new(Mutex::new(HashMap::new()));
    let counts = Arc::clone(&failures);
    let transport = MockTransport::new(move |request, _| {
        let inputs = input_texts(request);
        if inputs.iter().any(|item| item == "13") {
            let mut counts = counts.lock();
            let failed = counts.entry("13".to_string()).or_insert(0);
            if *failed < 2 {
                *failed += 1;
                return Err(Error::transport("connection reset"));
            }
        }
        Ok(CallResponse::Multiple(input_documents(request)))
    });
    let caller = echo_caller(&transport, 1);
    let bulk = caller.bulk_caller_with_threads(vec![CallContext::new()], 3).unwrap();
    let (seen, listener) = collector();
    bulk.set_output_listener(listener);

    let retries = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&retries);
    bulk.set_error_listener(move |retry_count: u32, _error: &Error, _ctx: &CallContext, batch: &[String]| {
        log.lock().push((retry_count, batch.to_vec()));
        ErrorDisposition::Retry
    });

    bulk.accept_all(items(0..30)).unwrap();
    let report = bulk.await_completion().unwrap();

    assert_eq!(
        *retries.lock(),
        vec![(0, vec!["13".to_string()]), (1, vec!["13".to_string()])]
    );
    assert_eq!(report.retries, 2);
    let outputs = seen.lock().clone();
    assert_eq!(outputs.iter().filter(|o| *o == "13").count(), 1);
    assert_eq!(sorted(&outputs), items(0..30));
}

#[test]
fn skip_call_drops_failing_batch_and_completes() {
    let transport = failing_on("poison");
    let caller = echo_caller(&transport, 1);
    let bulk = caller.bulk_caller_with_threads(vec![CallContext::new()], 2).unwrap();
    let (seen, listener) = collector();
    bulk.set_output_listener(listener);
    bulk.set_error_listener(|_: u32, _: &Error, _: &CallContext, _: &[String]| ErrorDisposition::SkipCall);

    let mut input = items(0..20);
    input.insert(10, "poison".to_string());
    bulk.accept_all(input).unwrap();
    let report = bulk.await_completion().unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.calls, 20);
    let outputs = seen.lock().clone();
    assert!(!outputs.contains(&"poison".to_string()));
    assert_eq!(sorted(&outputs), items(0..20));
}

#[test]
fn random_failures_with_retry_deliver_everything_once() {
    let rng = Arc::new(Mutex::new(StdRng::seed_from_u64(0x5eed)));
    let transport = MockTransport::new(move |request, _| {
        if rng.lock().gen_bool(0.3) {
            return Err(Error::transport("injected failure"));
        }
        Ok(CallResponse::Multiple(input_documents(request)))
    });
    let caller = echo_caller(&transport, 7);
    let bulk = caller.bulk_caller_with_threads(vec![CallContext::new()], 4).unwrap();
    let (seen, listener) = collector();
    bulk.set_output_listener(listener);
    bulk.set_error_listener(|retry: u32, _: &Error, _: &CallContext, _: &[String]| {
        if retry < 100 {
            ErrorDisposition::Retry
        } else {
            ErrorDisposition::StopAllCallers
        }
    });

    bulk.accept_all(items(0..500)).unwrap();
    let report = bulk.await_completion().unwrap();

    assert_eq!(sorted(&seen.lock()), items(0..500));
    assert_eq!(report.calls, 72);
    assert_eq!(transport.call_count() as u64, report.calls + report.retries);
}

#[test]
fn stop_caller_on_every_worker_leaves_input_unprocessed() {
    let transport = MockTransport::new(|_, _| Err(Error::transport("down")));
    let caller = echo_caller(&transport, 1);
    let bulk = caller.bulk_caller_with_threads(vec![CallContext::new()], 2).unwrap();
    bulk.set_error_listener(|_: u32, _: &Error, _: &CallContext, _: &[String]| ErrorDisposition::StopCaller);

    let mut accepted = 0;
    for item in items(0..10) {
        match bulk.accept(item) {
            Ok(()) => accepted += 1,
            Err(err) => {
                assert!(matches!(err, Error::InvalidState { .. }));
                break;
            }
        }
    }

    let report = bulk.await_completion().unwrap();
    assert_eq!(report.calls, 0);
    assert_eq!(transport.call_count(), 2);
    assert_eq!(report.items_unprocessed, accepted - 2);
    assert_eq!(report.contexts.len(), 2);
}

#[test]
fn stop_caller_leaves_other_workers_running() {
    let stopped = Arc::new(AtomicBool::new(false));
    let failures = Arc::new(AtomicUsize::new(0));
    let (flag, failed) = (Arc::clone(&stopped), Arc::clone(&failures));
    let transport = MockTransport::new(move |request, _| {
        let worker = field_text(request, "endpointConstants").unwrap_or_default();
        if worker.contains('0') {
            failed.fetch_add(1, Ordering::SeqCst);
            flag.store(true, Ordering::SeqCst);
            return Err(Error::transport("worker 0 is down"));
        }
        // Hold the healthy worker until the failing one has taken a batch
        for _ in 0..5_000 {
            if flag.load(Ordering::SeqCst) {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(CallResponse::Multiple(input_documents(request)))
    });
    let caller = InputOutputCaller::on(
        &transport.client(),
        &io_declaration_with_constants(1),
        StringHandle,
        StringHandle,
    )
    .unwrap();
    let contexts: Vec<_> = (0..2)
        .map(|i| CallContext::new().with_endpoint_constants(json!({ "worker": i }).to_string()))
        .collect();
    let bulk = caller.bulk_caller_with_contexts(contexts).unwrap();
    let (seen, listener) = collector();
    bulk.set_output_listener(listener);
    bulk.set_error_listener(|_: u32, _: &Error, _: &CallContext, _: &[String]| ErrorDisposition::StopCaller);

    bulk.accept_all(items(0..20)).unwrap();
    let report = bulk.await_completion().unwrap();

    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert_eq!(report.calls, 19);
    assert_eq!(report.items_unprocessed, 0);
    assert_eq!(report.contexts.len(), 2);
    let outputs = seen.lock().clone();
    let unique: HashSet<_> = outputs.iter().collect();
    assert_eq!(outputs.len(), 19);
    assert_eq!(unique.len(), 19);
}

#[test]
fn stop_all_callers_aborts() {
    let transport = failing_on("3");
    let caller = echo_caller(&transport, 1);
    let bulk = caller.bulk_caller().unwrap();
    bulk.set_error_listener(|_: u32, _: &Error, _: &CallContext, _: &[String]| ErrorDisposition::StopAllCallers);

    bulk.accept_all(items(0..3)).unwrap();
    let err = bulk.accept("3".to_string()).unwrap_err();
    assert!(matches!(err, Error::BulkAborted { .. }));
    assert_eq!(bulk.state(), BulkState::Aborted);
    assert!(bulk.await_completion().is_err());
}

#[test]
fn configuration_errors_bypass_error_listener() {
    let transport = MockTransport::echo();
    let caller = echo_caller(&transport, 1);
    // Endpoint declares no endpointState, so every call is rejected locally
    let ctx = CallContext::new().with_endpoint_state("{}");
    let bulk = caller.bulk_caller_with(ctx).unwrap();
    let offered = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&offered);
    bulk.set_error_listener(move |_: u32, _: &Error, _: &CallContext, _: &[String]| {
        flag.store(true, Ordering::SeqCst);
        ErrorDisposition::Retry
    });

    let err = bulk.accept("1".to_string()).unwrap_err();
    match err {
        Error::BulkAborted { cause } => assert!(cause.is_configuration()),
        other => panic!("unexpected {:?}", other),
    }
    assert!(!offered.load(Ordering::SeqCst));
    assert_eq!(transport.call_count(), 0);
}

// ============================================================================
// Contexts
// ============================================================================

#[test]
fn contexts_never_run_concurrently() {
    let in_flight: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
    let overlap = Arc::new(AtomicBool::new(false));
    let (busy, clash) = (Arc::clone(&in_flight), Arc::clone(&overlap));
    let transport = MockTransport::new(move |request, _| {
        let worker = field_text(request, "endpointConstants").unwrap_or_default();
        if !busy.lock().insert(worker.clone()) {
            clash.store(true, Ordering::SeqCst);
        }
        std::thread::sleep(Duration::from_millis(1));
        busy.lock().remove(&worker);
        Ok(CallResponse::Multiple(input_documents(request)))
    });
    let caller = InputOutputCaller::on(
        &transport.client(),
        &io_declaration_with_constants(2),
        StringHandle,
        StringHandle,
    )
    .unwrap();

    let contexts: Vec<_> = (0..3)
        .map(|i| CallContext::new().with_endpoint_constants(json!({ "worker": i }).to_string()))
        .collect();
    let bulk = caller.bulk_caller_with_contexts(contexts).unwrap();
    let (seen, listener) = collector();
    bulk.set_output_listener(listener);
    bulk.accept_all(items(0..60)).unwrap();
    let report = bulk.await_completion().unwrap();

    assert!(!overlap.load(Ordering::SeqCst));
    assert_eq!(seen.lock().len(), 60);
    let workers: Vec<_> = report
        .contexts
        .iter()
        .map(|ctx| ctx.endpoint_constants().map(|c| String::from_utf8_lossy(c).into_owned()))
        .collect();
    assert_eq!(workers.len(), 3);
    assert!(workers.iter().all(Option::is_some));
}

#[test]
fn template_with_session_or_state_is_not_shared_across_threads() {
    let transport = MockTransport::echo();
    let caller = echo_caller(&transport, 1);
    let session = CallContext::new().with_session(SessionState::from_id("S"));
    let err = caller.bulk_caller_with_threads(vec![session.clone()], 3).err();
    assert!(matches!(err, Some(Error::Configuration { .. })));
    assert!(caller.bulk_caller_with_threads(vec![session], 1).is_ok());

    let pages = OutputCaller::on(&transport.client(), &stateful_output_declaration(), StringHandle).unwrap();
    let cursor = CallContext::new().with_endpoint_state("0");
    assert!(pages.bulk_caller_with_threads(vec![cursor], 3).is_err());
    // Loops repeat the same calls on every clone, even without state
    assert!(pages.bulk_caller_with_threads(vec![CallContext::new()], 3).is_err());

    // One distinct context per thread is fine
    let cursors: Vec<_> = (0..3).map(|_| CallContext::new().with_endpoint_state("0")).collect();
    assert!(pages.bulk_caller_with_threads(cursors, 3).is_ok());
}

#[test]
fn cloned_template_contexts_stay_independent() {
    let transport = MockTransport::echo();
    let caller = InputOutputCaller::on(
        &transport.client(),
        &io_declaration_with_constants(1),
        StringHandle,
        StringHandle,
    )
    .unwrap();
    let template = CallContext::new().with_endpoint_constants(r#"{"job":1}"#);
    let bulk = caller.bulk_caller_with_threads(vec![template], 3).unwrap();
    let (seen, listener) = collector();
    bulk.set_output_listener(listener);
    bulk.accept_all(items(0..30)).unwrap();
    let report = bulk.await_completion().unwrap();

    assert_eq!(sorted(&seen.lock()), items(0..30));
    assert_eq!(report.contexts.len(), 3);
    assert!(report.contexts.iter().all(|ctx| ctx.session().is_none() && ctx.endpoint_state().is_none()));
}

#[test]
fn single_threaded_calls_run_on_accepting_thread() {
    let threads = Arc::new(Mutex::new(HashSet::new()));
    let names = Arc::clone(&threads);
    let transport = MockTransport::new(move |request, _| {
        names.lock().insert(std::thread::current().id());
        Ok(CallResponse::Multiple(input_documents(request)))
    });
    let caller = echo_caller(&transport, 4);
    let bulk = caller.bulk_caller().unwrap();
    bulk.accept_all(items(0..10)).unwrap();
    assert_eq!(transport.call_count(), 2);
    let report = bulk.await_completion().unwrap();
    assert_eq!(report.calls, 3);
    assert_eq!(*threads.lock(), HashSet::from([std::thread::current().id()]));
}

#[test]
fn pool_threads_are_named_from_config() {
    let names = Arc::new(Mutex::new(HashSet::new()));
    let seen = Arc::clone(&names);
    let transport = MockTransport::new(move |request, _| {
        if let Some(name) = std::thread::current().name() {
            seen.lock().insert(name.to_string());
        }
        Ok(CallResponse::Multiple(input_documents(request)))
    });
    let mut config = ClientConfig::default();
    config.bulk = BulkConfig {
        queue_capacity: 4,
        thread_name_prefix: "loader".to_string(),
    };
    let caller = InputOutputCaller::on(
        &transport.client_with(config),
        &io_declaration("jsonDocument", 1),
        StringHandle,
        StringHandle,
    )
    .unwrap();
    let bulk = caller.bulk_caller_with_threads(vec![CallContext::new()], 2).unwrap();
    bulk.accept_all(items(0..40)).unwrap();
    bulk.await_completion().unwrap();

    let names = names.lock();
    assert!(!names.is_empty());
    assert!(names.iter().all(|n| n == "loader-0" || n == "loader-1"), "{:?}", names);
}

// ============================================================================
// Loops
// ============================================================================

#[test]
fn output_caller_loops_until_empty_output() {
    let pages = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&pages);
    let decl = json!({
        "endpoint": "/pages.sjs",
        "return": {"datatype": "jsonDocument", "multiple": true, "nullable": true}
    });
    let transport = MockTransport::new(move |_, _| {
        let page = counter.fetch_add(1, Ordering::SeqCst);
        if page < 3 {
            Ok(CallResponse::Multiple(vec![json_doc(page.to_string())]))
        } else {
            Ok(CallResponse::None)
        }
    });
    let caller = OutputCaller::on(&transport.client(), &decl, StringHandle).unwrap();
    let bulk = caller.bulk_caller().unwrap();
    let (seen, listener) = collector();
    bulk.set_output_listener(listener);
    let report = bulk.await_completion().unwrap();

    assert_eq!(*seen.lock(), items(0..3));
    assert_eq!(report.calls, 4);
}

#[test]
fn output_caller_loops_until_null_state() {
    let transport = MockTransport::new(|request, _| {
        let page: u64 = field_text(request, "endpointState")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let state = if page < 2 { (page + 1).to_string() } else { String::new() };
        Ok(CallResponse::Multiple(vec![
            json_doc(state),
            json_doc(format!("\"row-{}\"", page)),
        ]))
    });
    let caller = OutputCaller::on(&transport.client(), &stateful_output_declaration(), StringHandle).unwrap();
    let bulk = caller.bulk_caller().unwrap();
    let (seen, listener) = collector();
    bulk.set_output_listener(listener);
    let report = bulk.await_completion().unwrap();

    assert_eq!(*seen.lock(), vec!["\"row-0\"", "\"row-1\"", "\"row-2\""]);
    assert!(report.contexts[0].endpoint_state().is_none());
}

#[test]
fn exec_caller_loops_per_context_while_state_returned() {
    let transport = MockTransport::new(|request, _| {
        let state: JsonValue = field_text(request, "endpointState")
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or(JsonValue::Null);
        let left = state["left"].as_u64().unwrap_or(0);
        if left == 0 {
            Ok(CallResponse::Single(None))
        } else {
            let next = json!({"id": state["id"], "left": left - 1});
            Ok(CallResponse::Single(Some(json_doc(next.to_string()))))
        }
    });
    let caller = ExecCaller::on(&transport.client(), &exec_declaration()).unwrap();
    let contexts: Vec<_> = (1..=3u64)
        .map(|id| CallContext::new().with_endpoint_state(json!({"id": id, "left": id}).to_string()))
        .collect();
    let bulk = caller.bulk_caller_with_contexts(contexts).unwrap();
    let report = bulk.await_completion().unwrap();

    // Context i needs i calls returning state plus one returning none
    assert_eq!(report.calls, (1 + 1) + (2 + 1) + (3 + 1));
    assert!(report.contexts.iter().all(|ctx| ctx.endpoint_state().is_none()));
}

#[test]
fn input_caller_threads_state_across_batches() {
    let decl = json!({
        "endpoint": "/ingest.sjs",
        "params": [
            {"name": "endpointState", "datatype": "jsonDocument", "multiple": false, "nullable": true},
            {"name": "input", "datatype": "jsonDocument", "multiple": true, "nullable": true}
        ],
        "return": {"datatype": "jsonDocument", "multiple": false, "nullable": true},
        "$bulk": {"inputBatchSize": 5}
    });
    let transport = MockTransport::new(|request, _| {
        let total: usize = field_text(request, "endpointState")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let total = total + input_documents(request).len();
        Ok(CallResponse::Single(Some(json_doc(total.to_string()))))
    });
    let caller = InputCaller::on(&transport.client(), &decl, StringHandle).unwrap();
    let bulk = caller.bulk_caller().unwrap();
    bulk.accept_all(items(0..23)).unwrap();
    let report = bulk.await_completion().unwrap();

    assert_eq!(report.calls, 5);
    assert_eq!(report.contexts[0].endpoint_state_str(), Some("23"));
}
