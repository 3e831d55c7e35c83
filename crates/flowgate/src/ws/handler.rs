//! WebSocket handler for client connections.

use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval};

use flowgate_protocol::OutboundFrame;

use super::registry::Admission;
use crate::api::AppState;

/// WebSocket upgrade handler.
///
/// GET /ws/{client_id}
pub async fn ws_handler(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    info!("WebSocket upgrade request from client {}", client_id);
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, client_id))
}

/// Drive one client connection until it closes.
async fn handle_ws_connection(socket: WebSocket, state: AppState, client_id: String) {
    let (sink, mut receiver) = socket.split();
    let registry = state.registry.clone();
    let relay = state.relay.clone();

    let Admission { conn_id, frames } = registry.admit(&client_id);

    // Queued before the writer starts, so it is the first frame on the wire.
    relay.greet(&client_id).await;

    let mut send_task = tokio::spawn(write_frames(
        sink,
        frames,
        client_id.clone(),
        state.keepalive,
    ));
    let mut writer_done = false;

    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    relay.handle_text(&client_id, text.as_str()).await;
                }
                Some(Ok(Message::Binary(_))) => {
                    debug!("Received binary frame from client {}", client_id);
                    registry
                        .send_error(&client_id, "binary frames are not supported")
                        .await;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    debug!("Received ping/pong from client {}", client_id);
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("Client {} closed WebSocket connection", client_id);
                    break;
                }
                Some(Err(e)) => {
                    warn!("WebSocket error for client {}: {}", client_id, e);
                    break;
                }
            },

            result = &mut send_task => {
                writer_done = true;
                match result {
                    Ok(Ok(())) => debug!("Writer for client {} finished", client_id),
                    Ok(Err(e)) => warn!("Failed to write to client {}: {}", client_id, e),
                    Err(e) => warn!("Writer task for client {} aborted: {}", client_id, e),
                }
                break;
            }
        }
    }

    // Dropping the registry entry closes the outbound queue; the writer
    // flushes what is left and exits.
    registry.release(&client_id, conn_id);
    if !writer_done {
        match send_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to flush frames to client {}: {}", client_id, e),
            Err(e) => warn!("Writer task for client {} aborted: {}", client_id, e),
        }
    }
    info!("WebSocket connection closed for client {}", client_id);
}

/// Write queued frames to the socket, with optional keepalive pings.
async fn write_frames(
    mut sink: SplitSink<WebSocket, Message>,
    mut frames: mpsc::Receiver<OutboundFrame>,
    client_id: String,
    keepalive: Option<Duration>,
) -> Result<(), axum::Error> {
    let mut ping_interval =
        keepalive.map(|period| tokio::time::interval_at(Instant::now() + period, period));

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    break;
                };
                let json = match serde_json::to_string(&frame) {
                    Ok(j) => j,
                    Err(e) => {
                        warn!("Failed to serialize {} frame: {}", frame.tag(), e);
                        continue;
                    }
                };
                sink.send(Message::Text(json.into())).await?;
            }

            _ = tick(&mut ping_interval) => {
                sink.send(Message::Ping(Bytes::new())).await?;
            }
        }
    }

    debug!("Outbound queue for client {} closed", client_id);
    if let Err(e) = sink.close().await {
        debug!("Closing socket for client {}: {}", client_id, e);
    }
    Ok(())
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
