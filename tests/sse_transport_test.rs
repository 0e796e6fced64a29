// tests/sse_transport_test.rs
//! SSE transport against a local HTTP server.

mod common;

use std::time::Duration;

use common::{order_json, EventLog};
use httpmock::prelude::*;
use kitchen_sync_lib::config::SyncConfig;
use kitchen_sync_lib::kitchen::OrderId;
use kitchen_sync_lib::realtime::sse::{LastEventId, SseTransport};
use kitchen_sync_lib::realtime::{EventTransport, Frame, TransportError, TransportKind};
use kitchen_sync_lib::SyncService;
use pretty_assertions::assert_eq;

fn event_stream_body() -> String {
    format!(
        "event: connected\ndata: Conexión SSE establecida\n\n\
         id: 7\nevent: nuevo-pedido\ndata: {}\n\n\
         : keep-alive\n\n\
         data: {}\n\n",
        order_json(1, 2),
        order_json(2, 1)
    )
}

#[tokio::test]
async fn order_events_become_data_frames() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/sse/pedidos")
                .header("accept", "text/event-stream");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(event_stream_body());
        })
        .await;

    let cursor = LastEventId::default();
    let mut transport = SseTransport::with_cursor(server.url("/api/sse/pedidos"), cursor.clone());
    assert_eq!(transport.kind(), TransportKind::Sse);
    let mut frames = transport.open().await.unwrap();

    let mut received = Vec::new();
    while let Some(frame) = tokio::time::timeout(Duration::from_secs(5), frames.recv())
        .await
        .expect("stream should end")
    {
        received.push(frame);
    }

    assert_eq!(
        received,
        vec![
            Frame::Data(order_json(1, 2)),
            Frame::Data(order_json(2, 1))
        ]
    );
    assert_eq!(cursor.get().as_deref(), Some("7"));
    transport.close().await;
}

#[tokio::test]
async fn reconnect_replays_from_last_event_id() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/sse/pedidos")
                .header("last-event-id", "41");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body("");
        })
        .await;

    let cursor = LastEventId::default();
    cursor.set("41".to_string());
    let mut transport = SseTransport::with_cursor(server.url("/api/sse/pedidos"), cursor);
    let mut frames = transport.open().await.unwrap();
    assert_eq!(frames.recv().await, None);
    mock.assert_async().await;
}

#[tokio::test]
async fn error_status_fails_the_handshake() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/sse/pedidos");
            then.status(503).body("mantenimiento");
        })
        .await;

    let mut transport = SseTransport::new(server.url("/api/sse/pedidos"));
    let err = transport.open().await.unwrap_err();
    assert_eq!(
        err,
        TransportError::Http {
            status: 503,
            message: "mantenimiento".to_string()
        }
    );
}

#[tokio::test]
async fn unreachable_endpoint_is_a_connection_error() {
    let mut transport = SseTransport::new("http://127.0.0.1:9/api/sse/pedidos");
    let err = transport.open().await.unwrap_err();
    assert!(matches!(err, TransportError::Connection(_)));
}

#[tokio::test]
async fn service_feeds_the_kitchen_view_over_sse() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/sse/pedidos");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(event_stream_body());
        })
        .await;

    let config = SyncConfig {
        base_url: server.base_url(),
        reconnect_base_ms: 50,
        ..SyncConfig::default()
    };
    let service = SyncService::from_config(config).unwrap();
    let log = EventLog::attach(service.registry());
    let view = service.kitchen_view();
    service.start().await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while view.snapshot().len() < 2 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    service.stop().await;

    let rows = view.snapshot();
    let ids: Vec<OrderId> = rows.iter().map(|row| row.order.id.clone()).collect();
    assert_eq!(ids, vec![OrderId::Number(1), OrderId::Number(2)]);
    assert!(log.errors().is_empty() || log.errors().iter().all(|e| e.triggers_backoff()));
}
