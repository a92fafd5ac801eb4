// Integration tests for `PollingSession` against a wiremock server.

use std::time::Duration;

use wiremock::matchers::{body_string, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use helki_api::frame::{self, Message};
use helki_api::{Error, PollingSession, SessionHandle, TransportConfig};

const NAMESPACE: &str = "/api/v2/socket_io";

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, PollingSession) {
    let server = MockServer::start().await;
    let base = server.uri().parse().unwrap();
    let session =
        PollingSession::new(base, "/socket.io/", NAMESPACE, &TransportConfig::default()).unwrap();
    (server, session)
}

fn handshake_body(sid: &str) -> String {
    format!("0{{\"sid\":\"{sid}\",\"upgrades\":[],\"pingInterval\":25000,\"pingTimeout\":60000}}")
}

async fn mount_handshake(server: &MockServer, sid: &str) {
    Mock::given(method("GET"))
        .and(path("/socket.io/"))
        .and(query_param("EIO", "3"))
        .and(query_param("transport", "polling"))
        .and(query_param_is_missing("sid"))
        .respond_with(ResponseTemplate::new(200).set_body_string(handshake_body(sid)))
        .mount(server)
        .await;
}

async fn open(server: &MockServer, session: &PollingSession, sid: &str) -> SessionHandle {
    mount_handshake(server, sid).await;
    session.handshake("tok", "D1").await.unwrap()
}

// ── Handshake ───────────────────────────────────────────────────────

#[tokio::test]
async fn handshake_parses_sid() {
    let (server, session) = setup().await;

    Mock::given(method("GET"))
        .and(path("/socket.io/"))
        .and(query_param("token", "tok"))
        .and(query_param("dev_id", "D1"))
        .and(query_param_is_missing("sid"))
        .respond_with(ResponseTemplate::new(200).set_body_string(handshake_body("S1")))
        .mount(&server)
        .await;

    let handle = session.handshake("tok", "D1").await.unwrap();
    assert_eq!(handle.sid, "S1");
}

#[tokio::test]
async fn handshake_accepts_binary_framing() {
    let (server, session) = setup().await;

    let mut body = vec![0x00u8];
    let payload = handshake_body("S2");
    body.extend(payload.len().to_string().into_bytes());
    body.push(0xFF);
    body.extend(payload.as_bytes());

    Mock::given(method("GET"))
        .and(path("/socket.io/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/octet-stream"))
        .mount(&server)
        .await;

    let handle = session.handshake("tok", "D1").await.unwrap();
    assert_eq!(handle.sid, "S2");
}

#[tokio::test]
async fn handshake_rejects_http_error() {
    let (server, session) = setup().await;

    Mock::given(method("GET"))
        .and(path("/socket.io/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = session.handshake("tok", "D1").await.unwrap_err();
    assert!(matches!(err, Error::HttpStatus { status: 503, .. }));
}

#[tokio::test]
async fn handshake_rejects_unexpected_first_frame() {
    let (server, session) = setup().await;

    Mock::given(method("GET"))
        .and(path("/socket.io/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("3"))
        .mount(&server)
        .await;

    let err = session.handshake("tok", "D1").await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
}

// ── Namespace join / snapshot request / pong ────────────────────────

#[tokio::test]
async fn join_namespace_posts_length_prefixed_connect() {
    let (server, session) = setup().await;
    let handle = open(&server, &session, "S1").await;

    let connect = format!("40{NAMESPACE}?token=tok&dev_id=D1");
    Mock::given(method("POST"))
        .and(path("/socket.io/"))
        .and(query_param("sid", "S1"))
        .and(body_string(frame::encode(&connect)))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    session.join_namespace(&handle).await.unwrap();
}

#[tokio::test]
async fn join_namespace_tolerates_http_error() {
    let (server, session) = setup().await;
    let handle = open(&server, &session, "S1").await;

    Mock::given(method("POST"))
        .and(path("/socket.io/"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    assert!(session.join_namespace(&handle).await.is_ok());
}

#[tokio::test]
async fn request_snapshot_posts_dev_data_event() {
    let (server, session) = setup().await;
    let handle = open(&server, &session, "S1").await;

    let event = format!("42{NAMESPACE},[\"dev_data\"]");
    Mock::given(method("POST"))
        .and(path("/socket.io/"))
        .and(query_param("sid", "S1"))
        .and(body_string(frame::encode(&event)))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    session.request_snapshot(&handle).await.unwrap();
}

#[tokio::test]
async fn pong_posts_bare_payload() {
    let (server, session) = setup().await;
    let handle = open(&server, &session, "S1").await;

    Mock::given(method("POST"))
        .and(path("/socket.io/"))
        .and(query_param("sid", "S1"))
        .and(body_string("3"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    session.pong(&handle).await.unwrap();
}

// ── Poll ────────────────────────────────────────────────────────────

#[tokio::test]
async fn poll_classifies_messages() {
    let (server, session) = setup().await;
    let handle = open(&server, &session, "S1").await;

    let event = format!("42{NAMESPACE},[\"dev_data\",{{\"nodes\":[]}}]");
    let body = format!("2\x1e{event}\x1e6");
    Mock::given(method("GET"))
        .and(path("/socket.io/"))
        .and(query_param("sid", "S1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let messages = session
        .poll(&handle, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0], Message::Ping);
    assert!(matches!(messages[1], Message::Event(_)));
    assert_eq!(messages[2], Message::Noop);
}

#[tokio::test]
async fn poll_maps_http_error() {
    let (server, session) = setup().await;
    let handle = open(&server, &session, "S1").await;

    Mock::given(method("GET"))
        .and(path("/socket.io/"))
        .and(query_param("sid", "S1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = session
        .poll(&handle, Duration::from_secs(2))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::HttpStatus { status: 500, .. }));
}

#[tokio::test]
async fn poll_maps_timeout() {
    let (server, session) = setup().await;
    let handle = open(&server, &session, "S1").await;

    Mock::given(method("GET"))
        .and(path("/socket.io/"))
        .and(query_param("sid", "S1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("6")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let err = session
        .poll(&handle, Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(err.is_poll_timeout());
}
