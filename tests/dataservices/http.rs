//! HTTP transport against a local one-shot server.

use crate::common::*;

fn http_client(base_url: String) -> DataServicesClient {
    let config = ClientConfig {
        base_url,
        timeout_ms: 5_000,
        ..ClientConfig::default()
    };
    DataServicesClient::connect(config).unwrap()
}

#[test]
fn posts_form_data_and_decodes_multipart_mixed() {
    let body = b"--b1\r\nContent-Type: text/plain\r\n\r\nA\r\n--b1\r\nContent-Type: text/plain\r\n\r\nB\r\n--b1--\r\n".to_vec();
    let (base_url, server) = serve_once(
        "200 OK",
        &[("Content-Type", "multipart/mixed; boundary=b1")],
        body,
    );
    let caller = InputOutputCaller::on(
        &http_client(base_url),
        &io_declaration("textDocument", 10),
        StringHandle,
        StringHandle,
    )
    .unwrap();

    let outputs = caller.call(&["a".to_string(), "b".to_string()]).unwrap();
    assert_eq!(outputs, vec!["A", "B"]);

    let raw = String::from_utf8(server.join().unwrap()).unwrap();
    assert!(raw.starts_with("POST /test/io.sjs "), "{}", raw);
    assert!(raw.to_ascii_lowercase().contains("content-type: multipart/form-data; boundary="));
    assert_eq!(raw.matches("name=\"input\"").count(), 2);
    assert!(raw.contains("\r\n\r\na\r\n"));
}

#[test]
fn session_travels_as_cookie() {
    let (base_url, server) = serve_once("204 No Content", &[], Vec::new());
    let decl = json!({
        "endpoint": "/session.sjs",
        "params": [{"name": "session", "datatype": "session", "nullable": false}]
    });
    let caller = ExecCaller::on(&http_client(base_url), &decl).unwrap();
    let mut ctx = CallContext::new().with_session(SessionState::from_id("abc123"));
    assert!(!caller.call_with(&mut ctx).unwrap());

    let raw = String::from_utf8(server.join().unwrap()).unwrap();
    assert!(raw.contains("SessionID=abc123"), "{}", raw);
}

#[test]
fn error_status_is_server_error() {
    let (base_url, server) = serve_once(
        "500 Internal Server Error",
        &[("Content-Type", "text/plain")],
        b"XDMP-UNDFUNC".to_vec(),
    );
    let caller = OutputCaller::on(
        &http_client(base_url),
        &stateful_output_declaration(),
        StringHandle,
    )
    .unwrap();

    let mut ctx = CallContext::new().with_endpoint_state("{}");
    match caller.call_with(&mut ctx) {
        Err(Error::Server { status, reason }) => {
            assert_eq!(status, 500);
            assert!(reason.contains("XDMP-UNDFUNC"));
        }
        other => panic!("expected server error, got {:?}", other),
    }
    assert_eq!(ctx.endpoint_state_str(), Some("{}"));
    server.join().unwrap();
}
