//! End-to-end acceptance tests for the six literal scenarios in spec.md §8.
//!
//! Boots a real server on `127.0.0.1:0` and drives it over the wire with
//! `tokio-tungstenite` (WebSocket) and `reqwest` (HTTP sideband) — the
//! teacher's `tests/upload.rs` pattern of "start a real server, talk to it
//! like a client would" adapted to this crate's transport.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use dbpeer_router::config::ServerConfig;
use dbpeer_router::server::Server;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

const MAX_PAYLOAD: usize = 50;
const TOKEN: &str = "s";

async fn start_server() -> (SocketAddr, dbpeer_router::server::ServerHandle) {
    let config = ServerConfig::parse_from([
        "dbpeer-router",
        "--port",
        "0",
        "--host",
        "127.0.0.1",
        "--max-payload",
        &MAX_PAYLOAD.to_string(),
        "--token",
        TOKEN,
    ]);
    let server = Server::new(config);
    let handle = server.start().await.expect("server should bind");
    (handle.addr, handle)
}

async fn connect_peer(addr: SocketAddr, group: &str, id: &str) -> WebSocketStream<MaybeTlsStream<TcpStream>> {
    let url = format!("ws://{addr}/{group}/connect?id={id}&v=1.0.0&t={TOKEN}");
    let (ws, _response) = tokio_tungstenite::connect_async(url).await.expect("handshake should succeed");
    ws
}

async fn next_text(ws: &mut WebSocketStream<MaybeTlsStream<TcpStream>>) -> String {
    match timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("stream ended unexpectedly")
        .expect("websocket error")
    {
        Message::Text(t) => t.to_string(),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn handshake_ok_sends_welcome_with_max_payload() {
    let (addr, _handle) = start_server().await;
    let mut ws = connect_peer(addr, "mydb", "client1").await;
    let first = next_text(&mut ws).await;
    assert_eq!(first, format!("welcome:{{\"maxPayload\":{MAX_PAYLOAD}}}"));
}

#[tokio::test]
async fn handshake_rejected_on_unsupported_version() {
    let (addr, _handle) = start_server().await;
    let url = format!("ws://{addr}/mydb/connect?id=client1&v=2.0.0&t={TOKEN}");
    let err = tokio_tungstenite::connect_async(url).await.expect_err("should be rejected");
    let msg = err.to_string();
    assert!(
        msg.contains("409") || msg.contains("Unsupported client IPC version"),
        "unexpected rejection: {msg}"
    );
}

#[tokio::test]
async fn direct_delivery_reaches_only_the_named_recipient() {
    let (addr, _handle) = start_server().await;
    let mut c1 = connect_peer(addr, "mydb", "client1").await;
    let mut c2 = connect_peer(addr, "mydb", "client2").await;
    let _ = next_text(&mut c1).await; // welcome
    let _ = next_text(&mut c2).await; // welcome
    let _ = next_text(&mut c1).await; // connect:client2 (published to c1 when c2 joined)

    c1.send(Message::Text("to:client2;hello".into())).await.unwrap();

    let got = next_text(&mut c2).await;
    assert_eq!(got, "msg:hello");
}

#[tokio::test]
async fn broadcast_excludes_sender_and_has_no_prefix() {
    let (addr, _handle) = start_server().await;
    let mut c1 = connect_peer(addr, "mydb", "client1").await;
    let mut c2 = connect_peer(addr, "mydb", "client2").await;
    let mut c3 = connect_peer(addr, "mydb", "client3").await;
    let _ = next_text(&mut c1).await;
    let _ = next_text(&mut c2).await;
    let _ = next_text(&mut c3).await;
    let _ = next_text(&mut c1).await; // connect:client2
    let _ = next_text(&mut c1).await; // connect:client3
    let _ = next_text(&mut c2).await; // connect:client3

    c1.send(Message::Text("announce".into())).await.unwrap();

    assert_eq!(next_text(&mut c2).await, "announce");
    assert_eq!(next_text(&mut c3).await, "announce");
}

#[tokio::test]
async fn spill_and_receive_then_second_get_is_404() {
    let (addr, _handle) = start_server().await;
    let mut c1 = connect_peer(addr, "mydb", "client1").await;
    let mut c2 = connect_peer(addr, "mydb", "client2").await;
    let _ = next_text(&mut c1).await;
    let _ = next_text(&mut c2).await;
    let _ = next_text(&mut c1).await; // connect:client2

    let big_body = "x".repeat(200);
    c1.send(Message::Text(format!("to:client2;{big_body}").into()))
        .await
        .unwrap();

    let got = next_text(&mut c2).await;
    assert!(got.starts_with("msg:get:"), "expected a get: reference, saw {got}");
    let slot_id = got.strip_prefix("msg:get:").unwrap().to_string();
    assert_eq!(slot_id.len(), 24);

    let client = reqwest::Client::new();
    let receive_url = format!("http://{addr}/mydb/receive?id=client2&msg={slot_id}&t={TOKEN}");

    let resp = client.get(&receive_url).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), big_body);

    let resp2 = client.get(&receive_url).send().await.unwrap();
    assert_eq!(resp2.status(), 404);
}

#[tokio::test]
async fn duplicate_id_evicts_incumbent_and_broadcasts_disconnect() {
    let (addr, _handle) = start_server().await;
    let mut c1 = connect_peer(addr, "mydb", "client1").await;
    let mut c3 = connect_peer(addr, "mydb", "client3").await;
    let _ = next_text(&mut c1).await;
    let _ = next_text(&mut c3).await;
    let _ = next_text(&mut c1).await; // connect:client3

    // A new connection claims "client1" — the incumbent must be evicted.
    let mut c1_new = connect_peer(addr, "mydb", "client1").await;
    let welcome = next_text(&mut c1_new).await;
    assert_eq!(welcome, format!("welcome:{{\"maxPayload\":{MAX_PAYLOAD}}}"));

    // The third peer observes the disconnect of the evicted incumbent.
    let mut saw_disconnect = false;
    for _ in 0..4 {
        let frame = next_text(&mut c3).await;
        if frame == "disconnect:client1" {
            saw_disconnect = true;
            break;
        }
    }
    assert!(saw_disconnect, "third peer never saw disconnect:client1");
}

#[tokio::test]
async fn token_mismatch_on_handshake_is_forbidden() {
    let (addr, _handle) = start_server().await;
    let url = format!("ws://{addr}/mydb/connect?id=client1&v=1.0.0&t=wrong");
    let err = tokio_tungstenite::connect_async(url).await.expect_err("should be rejected");
    assert!(err.to_string().contains("403") || err.to_string().to_lowercase().contains("unauthorized"));
}

#[tokio::test]
async fn clients_endpoint_lists_connected_peers() {
    let (addr, _handle) = start_server().await;
    let mut c1 = connect_peer(addr, "mydb", "client1").await;
    let _ = next_text(&mut c1).await;

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("http://{addr}/mydb/clients"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    let arr = body.as_array().unwrap();
    assert_eq!(arr.len(), 1);
    assert_eq!(arr[0]["id"], "client1");
}
