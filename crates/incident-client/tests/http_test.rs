#![allow(clippy::expect_used, clippy::unwrap_used)]

//! HTTP client tests against a one-shot local responder.
//!
//! Covers:
//! - Request method, path and JSON body on the wire
//! - Envelope normalization of incident and execution bodies
//! - Non-2xx mapping to Api with the server's message
//! - Unparseable bodies mapping to InvalidResponse
//! - Unreachable backend mapping to a retryable Transport error

use std::time::Duration;

use reqwest::Client;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use incident_board::IncidentApi;
use incident_client::HttpIncidentApi;
use incident_core::types::{AnalysisKind, ExecutionStatus, IncidentPatch, IncidentStatus};
use incident_core::BoardError;

// ── Responder ──

/// Serve exactly one request with `status` and `body`; the handle yields the
/// raw request text.
async fn serve_once(status: &str, body: &str) -> (HttpIncidentApi, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        request
    });
    let api = HttpIncidentApi::with_client(&format!("http://{addr}"), client());
    (api, handle)
}

fn client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(end) = text.find("\r\n\r\n") {
            let wanted = end + 4 + content_length(&text[..end]);
            if buf.len() >= wanted {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn content_length(head: &str) -> usize {
    head.lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse().ok())
                .flatten()
        })
        .unwrap_or(0)
}

// ── Incidents ──

#[tokio::test]
async fn list_incidents_accepts_wrapped_body() {
    let (api, server) = serve_once(
        "200 OK",
        r#"{"incidents":[{"id":"inc-1","message":"db down","status":"triage"},{"id":"inc-2","status":"Fixing"}]}"#,
    )
    .await;

    let incidents = api.list_incidents().await.unwrap();

    assert_eq!(incidents.len(), 2);
    assert_eq!(incidents[1].status, IncidentStatus::Fixing);
    assert!(server.await.unwrap().starts_with("GET /incidents HTTP/1.1"));
}

#[tokio::test]
async fn patch_sends_only_the_changed_field() {
    let (api, server) = serve_once(
        "200 OK",
        r#"{"id":"inc-1","message":"db down","status":"fixing"}"#,
    )
    .await;

    let updated = api
        .patch_incident("inc-1", IncidentPatch::status(IncidentStatus::Fixing))
        .await
        .unwrap();

    assert_eq!(updated.status, IncidentStatus::Fixing);
    let request = server.await.unwrap();
    assert!(request.starts_with("PATCH /incidents/inc-1 HTTP/1.1"));
    assert!(request.ends_with(r#"{"status":"fixing"}"#));
}

#[tokio::test]
async fn diagnose_returns_error_shaped_text_for_classification() {
    let (api, server) = serve_once(
        "200 OK",
        r#"{"error":"Failed to reach diagnosis service"}"#,
    )
    .await;

    let response = api
        .request_analysis("inc-2", AnalysisKind::Diagnosis)
        .await
        .unwrap();

    assert_eq!(response.text, "Failed to reach diagnosis service");
    assert!(server
        .await
        .unwrap()
        .starts_with("POST /incidents/inc-2/diagnose HTTP/1.1"));
}

// ── Executions ──

#[tokio::test]
async fn reject_normalizes_enveloped_execution() {
    let (api, server) = serve_once(
        "200 OK",
        r#"{"execution":{"id":"ex-1","incident_id":"inc-1","status":"cancelled","error_message":"REJECTED_BY_USER"}}"#,
    )
    .await;

    let execution = api.reject_execution("ex-1").await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Cancelled);
    assert_eq!(execution.error_message.as_deref(), Some("REJECTED_BY_USER"));
    assert!(server
        .await
        .unwrap()
        .starts_with("POST /agent/executions/ex-1/reject HTTP/1.1"));
}

// ── Errors ──

#[tokio::test]
async fn conflict_carries_server_message() {
    let (api, _server) = serve_once(
        "409 Conflict",
        r#"{"error":"Agent already running for this incident"}"#,
    )
    .await;

    let err = api.start_remediation("inc-1").await.unwrap_err();

    assert_eq!(
        err,
        BoardError::Api {
            status: 409,
            message: "Agent already running for this incident".into()
        }
    );
    assert_eq!(err.banner_message(), "Agent already running for this incident");
}

#[tokio::test]
async fn unparseable_body_is_invalid_response() {
    let (api, _server) = serve_once("200 OK", "<html>oops</html>").await;

    let err = api.get_execution("ex-1").await.unwrap_err();

    assert!(matches!(err, BoardError::InvalidResponse { .. }));
}

#[tokio::test]
async fn unreachable_backend_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let api = HttpIncidentApi::with_client(&format!("http://{addr}"), client());

    let err = api.list_incidents().await.unwrap_err();

    assert!(matches!(err, BoardError::Transport { .. }), "{err:?}");
    assert!(err.is_retryable());
}
