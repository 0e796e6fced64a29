// tests/stomp_transport_test.rs
//! STOMP transport against an in-process WebSocket broker.

mod common;

use std::time::Duration;

use common::order_json;
use futures::{SinkExt, StreamExt};
use kitchen_sync_lib::realtime::stomp::{StompFrame, StompSettings, StompTransport};
use kitchen_sync_lib::realtime::{EventTransport, Frame, TransportError};
use pretty_assertions::assert_eq;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;

/// How the fake broker answers `CONNECT`.
enum Broker {
    /// Accept, record the SUBSCRIBE frame and push `bodies` as MESSAGE frames.
    Publish(Vec<String>),
    /// Answer with an ERROR frame.
    Reject(&'static str),
}

async fn spawn_broker(behaviour: Broker) -> (String, oneshot::Receiver<Vec<StompFrame>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws-native", listener.local_addr().unwrap());
    let (seen_tx, seen_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut seen = Vec::new();

        let connect = next_frame(&mut socket).await;
        seen.push(connect);

        match behaviour {
            Broker::Reject(message) => {
                let error = StompFrame::new("ERROR").header("message", message);
                socket.send(Message::Text(error.encode())).await.unwrap();
            }
            Broker::Publish(bodies) => {
                let connected = StompFrame::new("CONNECTED")
                    .header("version", "1.2")
                    .header("heart-beat", "0,0");
                socket.send(Message::Text(connected.encode())).await.unwrap();

                let subscribe = next_frame(&mut socket).await;
                let destination = subscribe.get("destination").unwrap_or_default().to_string();
                let subscription = subscribe.get("id").unwrap_or_default().to_string();
                seen.push(subscribe);

                for (index, body) in bodies.into_iter().enumerate() {
                    let mut message = StompFrame::new("MESSAGE")
                        .header("destination", destination.clone())
                        .header("subscription", subscription.clone())
                        .header("message-id", index.to_string())
                        .header("content-type", "application/json");
                    message.body = body;
                    socket.send(Message::Text(message.encode())).await.unwrap();
                }
            }
        }

        let _ = seen_tx.send(seen);
        let _ = socket.close(None).await;
    });

    (url, seen_rx)
}

async fn next_frame<S>(socket: &mut S) -> StompFrame
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) if !text.trim().is_empty() => {
                return StompFrame::parse(text.trim_end_matches('\0')).unwrap();
            }
            Some(Ok(_)) => continue,
            other => panic!("broker lost the client: {other:?}"),
        }
    }
}

fn settings(url: String) -> StompSettings {
    StompSettings {
        url,
        destination: "/topic/pedidos".to_string(),
        heartbeat: Duration::from_secs(10),
    }
}

#[tokio::test]
async fn messages_on_the_topic_become_data_frames() {
    let (url, seen) = spawn_broker(Broker::Publish(vec![order_json(1, 2), order_json(2, 1)])).await;
    let mut transport = StompTransport::new(settings(url));
    let mut frames = transport.open().await.unwrap();

    let mut received = Vec::new();
    while let Some(frame) = tokio::time::timeout(Duration::from_secs(5), frames.recv())
        .await
        .expect("socket should close")
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

    let seen = seen.await.unwrap();
    assert_eq!(seen[0].command, "CONNECT");
    assert_eq!(seen[0].get("accept-version"), Some("1.2"));
    assert_eq!(seen[0].get("heart-beat"), Some("10000,10000"));
    assert_eq!(seen[1].command, "SUBSCRIBE");
    assert_eq!(seen[1].get("destination"), Some("/topic/pedidos"));
    assert!(seen[1].get("id").is_some_and(|id| id.starts_with("sub-")));
    transport.close().await;
}

#[tokio::test]
async fn error_frame_rejects_the_handshake() {
    let (url, _seen) = spawn_broker(Broker::Reject("destino no permitido")).await;
    let mut transport = StompTransport::new(settings(url));

    let err = transport.open().await.unwrap_err();
    assert_eq!(err, TransportError::Handshake("destino no permitido".to_string()));
}

#[tokio::test]
async fn refused_socket_is_a_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws-native", listener.local_addr().unwrap());
    drop(listener);

    let mut transport = StompTransport::new(settings(url));
    let err = transport.open().await.unwrap_err();
    assert!(matches!(err, TransportError::Connection(_)));
}
