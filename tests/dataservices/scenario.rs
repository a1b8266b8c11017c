//! End to end: an echo endpoint called once and in bulk.

use crate::common::*;

fn echo_declaration() -> JsonValue {
    json!({
        "endpoint": "/echo",
        "params": [
            {"name": "input", "datatype": "string", "multiple": true, "nullable": true}
        ],
        "return": {"datatype": "string", "multiple": true, "nullable": true}
    })
}

#[test]
fn echo_single_call() {
    let transport = MockTransport::echo();
    let caller =
        InputOutputCaller::on(&transport.client(), &echo_declaration(), StringHandle, StringHandle)
            .unwrap();
    assert_eq!(caller.endpoint_path(), "/echo");
    assert!(caller.allows_input());
    assert!(!caller.allows_endpoint_state());

    let outputs = caller.call(&["a".to_string(), "b".to_string()]).unwrap();
    assert_eq!(outputs, vec!["a", "b"]);

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].endpoint(), "/echo");
    assert_eq!(input_texts(&requests[0]), vec!["a", "b"]);
    assert!(input_documents(&requests[0]).iter().all(|doc| doc.format == Format::Text));
}

#[test]
fn echo_bulk_call() {
    let transport = MockTransport::echo();
    let caller =
        InputOutputCaller::on(&transport.client(), &echo_declaration(), StringHandle, StringHandle)
            .unwrap();
    let bulk = caller.bulk_caller().unwrap();
    let (seen, listener) = collector();
    bulk.set_output_listener(listener);

    bulk.accept_all(["a".to_string(), "b".to_string()]).unwrap();
    // The default batch of 100 is not full yet
    assert_eq!(transport.call_count(), 0);

    let report = bulk.await_completion().unwrap();
    assert_eq!(*seen.lock(), vec!["a", "b"]);
    assert_eq!(report.calls, 1);
    assert_eq!(report.items_unprocessed, 0);
}
