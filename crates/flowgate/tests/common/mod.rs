//! Test utilities and common setup.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use futures::StreamExt;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use flowgate::api::{self, AppState};
use flowgate::backend::{AssistantBackend, SimulatedBackend, SimulationTiming};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// State backed by a simulation with no delays.
pub fn test_state() -> AppState {
    AppState::new(Arc::new(SimulatedBackend::new(SimulationTiming::instant())))
}

/// Create a test application with the instant simulation backend.
pub fn test_app() -> Router {
    api::create_router(test_state())
}

/// Serve `state` on an ephemeral local port.
pub async fn spawn_server(state: AppState) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = api::create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Serve a gateway in front of `backend`.
pub async fn spawn_gateway(backend: Arc<dyn AssistantBackend>) -> (SocketAddr, AppState) {
    let state = AppState::new(backend);
    let addr = spawn_server(state.clone()).await;
    (addr, state)
}

/// Open a client WebSocket for `client_id`.
pub async fn connect(addr: SocketAddr, client_id: &str) -> Client {
    let url = format!("ws://{addr}/ws/{client_id}");
    let (client, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    client
}

/// Next JSON frame from the gateway, skipping control frames.
pub async fn next_json(client: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

/// Collect frames until one of type `task_finish` arrives (inclusive).
pub async fn frames_until_finish(client: &mut Client) -> Vec<Value> {
    let mut frames = Vec::new();
    loop {
        let frame = next_json(client).await;
        let done = frame["type"] == "task_finish";
        frames.push(frame);
        if done {
            return frames;
        }
    }
}

/// Wait until `check` holds, polling for up to five seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached in time");
}
