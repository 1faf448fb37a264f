//! External calls: request shaping, result binding, failure policy

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::engine::{
    HttpSurface, OutboundRequest, OutboundResponse, ScopeStore, Surfaces, TransportError,
};
use crate::error::RuntimeErrorKind;

use super::helpers::{run_with, text_of};

/// Scripted transport: pops a canned outcome per call and journals every
/// request it receives.
struct ScriptedHttp {
    script: Mutex<VecDeque<Result<OutboundResponse, TransportError>>>,
    requests: Mutex<Vec<OutboundRequest>>,
}

impl ScriptedHttp {
    fn new(script: Vec<Result<OutboundResponse, TransportError>>) -> Arc<Self> {
        Arc::new(ScriptedHttp {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().expect("scripted http poisoned").clone()
    }
}

impl HttpSurface for ScriptedHttp {
    fn send(&self, request: &OutboundRequest) -> Result<OutboundResponse, TransportError> {
        self.requests
            .lock()
            .expect("scripted http poisoned")
            .push(request.clone());
        self.script
            .lock()
            .expect("scripted http poisoned")
            .pop_front()
            .unwrap_or(Err(TransportError::Transport("script exhausted".to_string())))
    }
}

fn ok_response(status: u16, body: &str) -> Result<OutboundResponse, TransportError> {
    Ok(OutboundResponse {
        status,
        headers: vec![("content-type".to_string(), "text/plain".to_string())],
        body: body.to_string(),
    })
}

#[test]
fn test_request_is_shaped_from_attributes() {
    let http = ScriptedHttp::new(vec![ok_response(200, "pong")]);
    let surfaces = Surfaces::new().with_http(http.clone());
    run_with(
        r#"<q:set name="host" value="'api.example.com'"/><q:http target="https://{host}/ping" method="post" headers="Authorization: Bearer tok; X-Trace: {host}" timeout="500"/>"#,
        &mut ScopeStore::new(),
        &surfaces,
    )
    .unwrap();

    let requests = http.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].url, "https://api.example.com/ping");
    assert_eq!(requests[0].timeout_ms, Some(500));
    assert_eq!(
        requests[0].headers,
        vec![
            ("Authorization".to_string(), "Bearer tok".to_string()),
            ("X-Trace".to_string(), "api.example.com".to_string()),
        ]
    );
}

#[test]
fn test_result_binds_status_body_and_headers() {
    let http = ScriptedHttp::new(vec![ok_response(201, "created")]);
    let surfaces = Surfaces::new().with_http(http);
    let output = run_with(
        r#"<q:http target="https://x/y" method="get" result="r"/>{r.status}:{r.body}:{r.headers['content-type']}"#,
        &mut ScopeStore::new(),
        &surfaces,
    )
    .unwrap();
    assert_eq!(text_of(&output), "201:created:text/plain");
}

#[test]
fn test_error_status_aborts_by_default() {
    let http = ScriptedHttp::new(vec![ok_response(503, "down")]);
    let surfaces = Surfaces::new().with_http(http);
    let err = run_with(
        r#"<q:http target="https://x/y" method="get"/>"#,
        &mut ScopeStore::new(),
        &surfaces,
    )
    .unwrap_err();
    assert!(
        matches!(err.kind, RuntimeErrorKind::ExternalCallStatus { status: 503, .. })
    );
}

#[test]
fn test_error_status_with_ignore_binds_the_response() {
    let http = ScriptedHttp::new(vec![ok_response(404, "missing")]);
    let surfaces = Surfaces::new().with_http(http);
    let output = run_with(
        r#"<q:http target="https://x/y" method="get" result="r" on-fail="ignore"/>{r.status}/{r.body}after"#,
        &mut ScopeStore::new(),
        &surfaces,
    )
    .unwrap();
    assert_eq!(text_of(&output), "404/missingafter");
}

#[test]
fn test_timeout_aborts_by_default() {
    let http = ScriptedHttp::new(vec![Err(TransportError::Timeout)]);
    let surfaces = Surfaces::new().with_http(http);
    let err = run_with(
        r#"<q:http target="https://x/y" method="get" timeout="10"/>"#,
        &mut ScopeStore::new(),
        &surfaces,
    )
    .unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::ExternalCallTimeout { .. }));
}

#[test]
fn test_timeout_with_ignore_binds_a_failure_record() {
    let http = ScriptedHttp::new(vec![Err(TransportError::Timeout)]);
    let surfaces = Surfaces::new().with_http(http);
    let output = run_with(
        r#"<q:http target="https://x/y" method="get" result="r" on-fail="ignore"/>{r.status}:{r.error}"#,
        &mut ScopeStore::new(),
        &surfaces,
    )
    .unwrap();
    assert_eq!(text_of(&output), "0:timeout");
}

#[test]
fn test_default_surface_rejects_every_call() {
    let err = run_with(
        r#"<q:http target="https://x/y" method="get"/>"#,
        &mut ScopeStore::new(),
        &Surfaces::new(),
    )
    .unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::ExternalCallFailed { .. }));
}

#[test]
fn test_transport_failure_with_ignore_continues_rendering() {
    let output = run_with(
        r#"<q:http target="https://x/y" method="get" on-fail="ignore"/>still here"#,
        &mut ScopeStore::new(),
        &Surfaces::new(),
    )
    .unwrap();
    assert_eq!(text_of(&output), "still here");
}
