// End-to-end tests for the Coordinator against a scripted wiremock cloud:
// device discovery over REST, then handshake → namespace join → snapshot
// request → poll, with events flowing into the published store.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_string, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use helki_api::StaticToken;
use helki_core::supervisor::ConnectionState;
use helki_core::{AttrValue, Coordinator, CoreError, SyncConfig};

const NAMESPACE: &str = "/api/v2/socket_io";

// ── Helpers ─────────────────────────────────────────────────────────

fn config(server: &MockServer) -> SyncConfig {
    SyncConfig {
        api_base: server.uri().parse().unwrap(),
        poll_timeout: Duration::from_secs(2),
        poll_pause: Duration::from_millis(10),
        ..SyncConfig::default()
    }
}

fn coordinator(server: &MockServer) -> Coordinator {
    Coordinator::new(config(server), Arc::new(StaticToken::new("tok")))
}

async fn mount_directory(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v2/grouped_devs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "g1",
                "name": "Home",
                "devs": [{ "dev_id": "D1", "name": "Heater" }]
            }
        ])))
        .mount(server)
        .await;
}

/// Handshake GET plus a catch-all for the join/snapshot/pong POSTs.
async fn mount_session(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/socket.io/"))
        .and(query_param("EIO", "3"))
        .and(query_param_is_missing("sid"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("0{\"sid\":\"S1\",\"upgrades\":[]}"),
        )
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/socket.io/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(server)
        .await;
}

/// Script the poll responses: each body is served once, in order, then
/// every later poll sees a no-op frame.
async fn mount_polls(server: &MockServer, bodies: &[String]) {
    for body in bodies {
        Mock::given(method("GET"))
            .and(path("/socket.io/"))
            .and(query_param("sid", "S1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.clone()))
            .up_to_n_times(1)
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/socket.io/"))
        .and(query_param("sid", "S1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("6"))
        .mount(server)
        .await;
}

fn dev_data_body() -> String {
    format!(
        "42{NAMESPACE},[\"dev_data\",{{\"nodes\":[\
         {{\"addr\":2,\"name\":\"Bath\",\"status\":{{\"mtemp\":\"21\"}}}},\
         {{\"addr\":3,\"name\":\"Bed\",\"status\":{{\"mtemp\":\"19\"}}}}]}}]"
    )
}

async fn next_publish(
    rx: &mut tokio::sync::watch::Receiver<Arc<helki_core::Snapshot>>,
) -> Arc<helki_core::Snapshot> {
    tokio::time::timeout(Duration::from_secs(5), rx.changed())
        .await
        .expect("timed out waiting for a publish")
        .expect("store dropped");
    rx.borrow_and_update().clone()
}

// ── Full sync path ──────────────────────────────────────────────────

#[tokio::test]
async fn listener_syncs_a_full_snapshot() {
    let server = MockServer::start().await;
    mount_directory(&server).await;
    mount_session(&server).await;
    mount_polls(&server, &[dev_data_body()]).await;

    let coordinator = coordinator(&server);
    let mut snapshots = coordinator.subscribe();
    coordinator.start().await.unwrap();

    let snap = next_publish(&mut snapshots).await;
    assert_eq!(snap.len(), 2);
    assert_eq!(snap["D1_zone2"].name, "Bath");
    assert_eq!(
        snap["D1_zone3"].status["mtemp"],
        AttrValue::Text("19".into())
    );
    assert_eq!(snap["D1_zone2"].device.group_name.as_deref(), Some("Home"));

    let ctx = coordinator.device_context().await.unwrap();
    assert_eq!(ctx.dev_id, "D1");

    coordinator.stop().await;
    assert_eq!(*coordinator.connection_state().borrow(), ConnectionState::Idle);
}

#[tokio::test]
async fn update_events_apply_after_the_snapshot() {
    let server = MockServer::start().await;
    mount_directory(&server).await;
    mount_session(&server).await;
    let update = format!(
        "42{NAMESPACE},[\"update\",{{\"path\":\"/acm/3/status\",\"body\":{{\"mtemp\":\"22\"}}}}]"
    );
    mount_polls(&server, &[dev_data_body(), update]).await;

    let coordinator = coordinator(&server);
    let mut snapshots = coordinator.subscribe();
    coordinator.start().await.unwrap();

    // Publishes may coalesce under the watch channel, so wait for the
    // final state rather than counting intermediate ones.
    let snap = tokio::time::timeout(
        Duration::from_secs(5),
        snapshots.wait_for(|snap| {
            snap.get("D1_zone3")
                .is_some_and(|zone| zone.status.get("mtemp") == Some(&AttrValue::Text("22".into())))
        }),
    )
    .await
    .expect("timed out waiting for the update to apply")
    .expect("store dropped")
    .clone();

    // The rest of the zone rode along untouched.
    assert_eq!(snap["D1_zone3"].name, "Bed");
    assert_eq!(snap["D1_zone2"].name, "Bath");

    coordinator.stop().await;
}

#[tokio::test]
async fn pings_are_answered_with_pongs() {
    let server = MockServer::start().await;
    mount_directory(&server).await;

    // Mounted ahead of the catch-all POST so the bare-payload pong lands
    // here; wiremock matches mocks in mount order.
    Mock::given(method("POST"))
        .and(path("/socket.io/"))
        .and(query_param("sid", "S1"))
        .and(body_string("3"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1..)
        .mount(&server)
        .await;

    mount_session(&server).await;
    mount_polls(&server, &[format!("2\x1e{}", dev_data_body())]).await;

    let coordinator = coordinator(&server);
    let mut snapshots = coordinator.subscribe();
    coordinator.start().await.unwrap();

    // The snapshot publish doubles as proof the ping frame was consumed.
    next_publish(&mut snapshots).await;
    coordinator.stop().await;
}

// ── Bootstrap failure semantics ─────────────────────────────────────

#[tokio::test]
async fn zero_devices_at_bootstrap_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/grouped_devs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let coordinator = coordinator(&server);
    let err = coordinator.start().await.unwrap_err();
    assert!(matches!(err, CoreError::NoData));
}

#[tokio::test]
async fn directory_failure_at_bootstrap_propagates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/grouped_devs"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let coordinator = coordinator(&server);
    let err = coordinator.start().await.unwrap_err();
    assert!(matches!(err, CoreError::Api { status: Some(500), .. }));
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn start_and_stop_are_idempotent() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    mount_polls(&server, &[dev_data_body()]).await;

    // A second start must not hit the directory again.
    Mock::given(method("GET"))
        .and(path("/api/v2/grouped_devs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "g1", "name": "Home", "devs": [{ "dev_id": "D1", "name": "Heater" }] }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator(&server);
    coordinator.start().await.unwrap();
    coordinator.start().await.unwrap();

    coordinator.stop().await;
    coordinator.stop().await;
    assert_eq!(*coordinator.connection_state().borrow(), ConnectionState::Idle);
}

#[tokio::test]
async fn refresh_before_start_reports_disconnected() {
    let server = MockServer::start().await;
    let coordinator = coordinator(&server);
    let err = coordinator.request_refresh().await.unwrap_err();
    assert!(matches!(err, CoreError::Disconnected));
}

// ── Degraded-mode refresh ───────────────────────────────────────────

#[tokio::test]
async fn refresh_falls_back_to_rest_while_disconnected() {
    let server = MockServer::start().await;
    mount_directory(&server).await;

    // No push endpoint mocks: the handshake keeps failing and the
    // coordinator stays disconnected.
    Mock::given(method("GET"))
        .and(path("/socket.io/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    // Bootstrap zones answer over REST.
    for (zone, temp) in [(2, "18"), (3, "19")] {
        Mock::given(method("GET"))
            .and(path(format!("/api/v2/devs/D1/acm/{zone}/status")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"mtemp": temp})))
            .mount(&server)
            .await;
    }

    let coordinator = coordinator(&server);
    coordinator.start().await.unwrap();
    coordinator.request_refresh().await.unwrap();

    let snap = coordinator.current_snapshot();
    assert_eq!(snap.len(), 2);
    assert_eq!(
        snap["D1_zone2"].status["mtemp"],
        AttrValue::Text("18".into())
    );
    assert_eq!(
        snap["D1_zone3"].status["mtemp"],
        AttrValue::Text("19".into())
    );

    coordinator.stop().await;
}
